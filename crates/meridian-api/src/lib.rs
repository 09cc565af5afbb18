pub mod auth;
pub mod companies;
pub mod dataroom;
pub mod error;
pub mod middleware;
pub mod points;
pub mod referrals;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tracing::error;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::middleware::{require_api_key, require_auth};

/// All HTTP routes. CORS and tracing layers are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let plugin_routes = Router::new()
        .route("/points/update", post(points::bandwidth_report))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_api_key));

    let protected_routes = Router::new()
        .route("/points/balance", get(points::balance))
        .route("/points/history", get(points::history))
        .route("/points/audit", get(points::audit))
        .route("/admin/users/{user_id}/points", post(points::adjust))
        .route("/admin/referrals/{referral_id}", delete(referrals::void_referral))
        .route("/referrals/me", get(referrals::my_stats))
        .route("/referrals/verify", post(referrals::verify))
        .route("/companies", post(companies::create_company))
        .route("/companies/{id}/review", put(companies::review_company))
        .route(
            "/companies/{id}/access",
            get(companies::my_access).post(dataroom::grant_access),
        )
        .route("/companies/{id}/access/{user_id}", delete(dataroom::revoke_access))
        .route("/companies/{id}/access/{user_id}/nda", put(dataroom::record_nda))
        .route("/companies/{id}/permissions", post(dataroom::grant_permission))
        .route("/companies/{id}/permissions/{user_id}", delete(dataroom::revoke_permission))
        .route("/companies/{id}/dataroom/init", post(dataroom::init))
        .route(
            "/companies/{id}/folders",
            get(dataroom::list_folders).post(dataroom::create_folder),
        )
        .route("/companies/{id}/folders/{folder_id}/access", get(dataroom::folder_access))
        .route("/companies/{id}/analytics", get(dataroom::analytics))
        .route("/folders/{folder_id}", put(dataroom::update_folder))
        .route("/folders/{folder_id}/files", post(dataroom::create_file))
        .route("/files/{file_id}", delete(dataroom::delete_file))
        .route("/files/{file_id}/download", get(dataroom::download))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(plugin_routes)
        .merge(protected_routes)
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> meridian_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests;
