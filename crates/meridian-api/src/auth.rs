use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use meridian_core::{Error, ReferralPolicy, ReferralService};
use meridian_db::Database;
use meridian_db::models::NewUser;
use meridian_db::queries::is_unique_violation;
use meridian_types::api::{
    LoginRequest, LoginResponse, ReferralOutcome, RegisterRequest, RegisterResponse,
};
use meridian_types::models::{Claims, ReferralStatus, Role};

use crate::error::ApiError;
use crate::run_blocking;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Shared secret for `/points/update`. `None` disables the route.
    pub api_key: Option<String>,
    pub referral_policy: ReferralPolicy,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    let username = req.username.trim().to_string();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }
    let email = req.email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(ApiError::bad_request("invalid email address"));
    }
    if !matches!(req.role, Role::Company | Role::Investor) {
        return Err(ApiError::from(Error::Forbidden));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiError::internal()
        })?
        .to_string();

    let role = req.role;
    let referral_code = req.referral_code;
    let (user, referral) = run_blocking(&state, move |s| {
        let user = s
            .db
            .create_user(&NewUser {
                id: Uuid::new_v4(),
                email: &email,
                username: &username,
                password_hash: &password_hash,
                role,
            })
            .map_err(|e| {
                if is_unique_violation(&e, "users.email") {
                    Error::Conflict("email is already registered".into())
                } else {
                    Error::Storage(e)
                }
            })?;

        // Registration stands even if the bonus cannot be settled.
        let referral = ReferralService::new(&s.db, s.referral_policy)
            .process_referral(user.id, referral_code.as_deref())
            .unwrap_or_else(|e| {
                error!("Referral settlement failed for new user {}: {}", user.id, e);
                ReferralOutcome {
                    status: ReferralStatus::NoReferral,
                    points_awarded: 0,
                    referrer_points: 0,
                }
            });
        Ok((user, referral))
    })
    .await?;

    let token = create_token(&state.jwt_secret, user.id, &user.username, user.role).map_err(|e| {
        error!("Token creation failed: {}", e);
        ApiError::internal()
    })?;

    info!("Registered {} ({}) with referral status {}", user.id, user.role, referral.status);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            token,
            referral_code: user.referral_code,
            referral,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_ascii_lowercase();
    let user = run_blocking(&state, move |s| Ok(s.db.get_user_by_email(&email)?))
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|_| ApiError::internal())?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::unauthorized())?;

    let user_id = user.id;
    if let Err(e) = run_blocking(&state, move |s| Ok(s.db.touch_last_login(user_id)?)).await {
        warn!("Could not record login time for {}: {:?}", user_id, e);
    }

    let token = create_token(&state.jwt_secret, user.id, &user.username, user.role)
        .map_err(|_| ApiError::internal())?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        role: user.role,
        token,
    }))
}

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    role: Role,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
