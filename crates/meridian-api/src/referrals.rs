use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use meridian_core::{Principal, ReferralService};
use meridian_types::api::VerifyReferralRequest;
use meridian_types::models::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

pub async fn my_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let stats = run_blocking(&state, move |s| {
        ReferralService::new(&s.db, s.referral_policy).referral_stats(user_id)
    })
    .await?;
    Ok(Json(stats))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyReferralRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let valid = run_blocking(&state, move |s| {
        ReferralService::new(&s.db, s.referral_policy).verify_code(&req.referral_code)
    })
    .await?;
    Ok(Json(json!({ "valid": valid })))
}

/// DELETE /admin/referrals/{referral_id}
pub async fn void_referral(
    State(state): State<AppState>,
    Path(referral_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    run_blocking(&state, move |s| {
        ReferralService::new(&s.db, s.referral_policy).void_referral(&actor, referral_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
