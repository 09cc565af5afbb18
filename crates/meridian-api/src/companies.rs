use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use meridian_core::{AccessResolver, Error, Principal};
use meridian_db::Database;
use meridian_db::models::CompanyRow;
use meridian_types::api::{CompanyResponse, CreateCompanyRequest, ReviewCompanyRequest};
use meridian_types::models::{Claims, Role};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// POST /companies
///
/// Company users register their own company. Staff and admins create one on
/// behalf of an existing owner and are recorded as its creator.
pub async fn create_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("company name is required"));
    }

    let (owner_id, created_by) = match (actor.role, req.owner_id) {
        (Role::Company, None) => (actor.user_id, None),
        (Role::Company, Some(owner)) if owner == actor.user_id => (actor.user_id, None),
        (Role::Staff | Role::Admin, Some(owner)) => (owner, Some(actor.user_id)),
        (Role::Staff | Role::Admin, None) => {
            return Err(ApiError::bad_request("owner_id is required"));
        }
        _ => return Err(Error::Forbidden.into()),
    };

    let company = run_blocking(&state, move |s| {
        if s.db.get_user(owner_id)?.is_none() {
            return Err(Error::not_found("user", owner_id));
        }
        let id = Uuid::new_v4();
        s.db.create_company(id, owner_id, created_by, &name)?;
        load_company(&s.db, id)
    })
    .await?;

    info!("Company {} created for owner {} by {}", company.id, owner_id, actor.user_id);
    Ok((StatusCode::CREATED, Json(to_response(company))))
}

/// PUT /companies/{id}/review
pub async fn review_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReviewCompanyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    actor.require_role(&[Role::Admin, Role::Staff])?;

    let company = run_blocking(&state, move |s| {
        if !s.db.review_company(company_id, req.status, req.visibility)? {
            return Err(Error::not_found("company", company_id));
        }
        load_company(&s.db, company_id)
    })
    .await?;

    info!(
        "Company {} reviewed by {}: {} / {}",
        company.id, actor.user_id, company.status, company.visibility
    );
    Ok(Json(to_response(company)))
}

/// GET /companies/{id}/access: the caller's own tier.
pub async fn my_access(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let access = run_blocking(&state, move |s| {
        AccessResolver::new(&s.db).resolve(user_id, company_id)
    })
    .await?;
    Ok(Json(access))
}

fn load_company(db: &Database, id: Uuid) -> meridian_core::Result<CompanyRow> {
    db.get_company(id)?
        .ok_or_else(|| Error::not_found("company", id))
}

fn to_response(company: CompanyRow) -> CompanyResponse {
    CompanyResponse {
        id: company.id,
        user_id: company.user_id,
        created_by: company.created_by,
        name: company.name,
        status: company.status,
        visibility: company.visibility,
        data_room_enabled: company.data_room_enabled,
    }
}
