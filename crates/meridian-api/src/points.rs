use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use meridian_core::{Error, Ledger, Principal};
use meridian_types::api::{AdjustPointsRequest, AwardResponse, BalanceResponse, BandwidthReport};
use meridian_types::models::{Claims, PointKind, Role};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

const MAX_HISTORY: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let points = run_blocking(&state, move |s| Ledger::new(&s.db).get_balance(user_id)).await?;
    Ok(Json(BalanceResponse { user_id, points }))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let limit = query.limit.clamp(1, MAX_HISTORY);
    let entries = run_blocking(&state, move |s| Ledger::new(&s.db).history(user_id, limit)).await?;
    Ok(Json(entries))
}

pub async fn audit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let audit = run_blocking(&state, move |s| Ledger::new(&s.db).audit_balance(user_id)).await?;
    Ok(Json(audit))
}

/// POST /points/update: credit from the bandwidth-sharing plugin, keyed by email.
pub async fn bandwidth_report(
    State(state): State<AppState>,
    Json(report): Json<BandwidthReport>,
) -> Result<impl IntoResponse, ApiError> {
    if report.points <= 0 {
        return Err(ApiError::bad_request("points must be positive"));
    }

    let metadata = json!({
        "ipv4": report.ipv4,
        "ipv6": report.ipv6,
        "report": report.metadata,
    });
    let email = report.email.trim().to_ascii_lowercase();

    let award = run_blocking(&state, move |s| {
        let user = s
            .db
            .get_user_by_email(&email)?
            .ok_or_else(|| Error::NotFound(format!("user with email {email}")))?;
        let award = Ledger::new(&s.db).award_with_metadata(
            user.id,
            report.points,
            PointKind::BandwidthSharing,
            "Bandwidth sharing reward",
            None,
            Some(&metadata),
        )?;
        Ok((user.id, award))
    })
    .await?;

    Ok(Json(AwardResponse {
        user_id: award.0,
        new_balance: award.1.new_balance,
    }))
}

/// POST /admin/users/{user_id}/points
pub async fn adjust(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AdjustPointsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    actor.require_role(&[Role::Admin])?;
    if req.description.trim().is_empty() {
        return Err(ApiError::bad_request("description is required"));
    }

    let award = run_blocking(&state, move |s| {
        Ledger::new(&s.db).award_points(
            user_id,
            req.delta,
            PointKind::Adjustment,
            req.description.trim(),
            Some(actor.user_id),
        )
    })
    .await?;

    Ok(Json(AwardResponse {
        user_id,
        new_balance: award.new_balance,
    }))
}
