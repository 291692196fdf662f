use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{
    hash_password_blocking, removal_cookie, verify_password_blocking, AuthUser,
};
use crate::error::{AppError, Result};
use crate::handlers::AppState;
use crate::models::{NewUser, User, UserProfile};
use crate::users::UserRepository;

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email address.
    #[serde(default, alias = "email")]
    login: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct GoogleAuthRequest {
    #[serde(default)]
    token: String,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    user: UserProfile,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Issue a session for `user` and attach it to `jar`.
fn start_session(state: &AppState, jar: CookieJar, user: &User) -> Result<CookieJar> {
    let token = state.sessions.issue(user.id)?;
    Ok(jar.add(state.sessions.cookie(token, state.settings.secure_cookie)))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>)> {
    let name = req.name.trim();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    let repo = UserRepository::new(&state.db);
    if repo.find_by_email(&email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let password_hash = hash_password_blocking(req.password, state.settings.bcrypt_cost).await?;
    let user = repo
        .create(&NewUser {
            name,
            email: &email,
            password_hash: Some(&password_hash),
            google_id: None,
            profile_picture: None,
        })
        .await?;
    tracing::info!(user_id = %user.id, "user registered");

    let jar = start_session(&state, jar, &user)?;
    Ok((
        StatusCode::CREATED,
        jar,
        Json(UserResponse {
            user: user.profile(),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<UserResponse>)> {
    let email = normalize_email(&req.login);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let user = UserRepository::new(&state.db)
        .find_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials {
            needs_password: false,
        })?;

    let Some(hash) = user.password_hash.clone() else {
        tracing::debug!(user_id = %user.id, "password login for account without password");
        return Err(AppError::InvalidCredentials {
            needs_password: user.is_google_user,
        });
    };

    if !verify_password_blocking(req.password, hash).await {
        return Err(AppError::InvalidCredentials {
            needs_password: false,
        });
    }

    tracing::info!(user_id = %user.id, "user logged in");
    let jar = start_session(&state, jar, &user)?;
    Ok((
        jar,
        Json(UserResponse {
            user: user.profile(),
        }),
    ))
}

pub async fn check(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        user: user.profile(),
    })
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (
        jar.add(removal_cookie()),
        Json(json!({ "success": true, "message": "Logged out" })),
    )
}

/// Sign in with a Google ID token, creating or linking the account by email.
pub async fn google(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<(CookieJar, Json<UserResponse>)> {
    if req.token.trim().is_empty() {
        return Err(AppError::Validation("Google token is required".to_string()));
    }
    let verifier = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::Internal("Google sign-in is not configured".to_string()))?;

    let identity = verifier.verify(req.token.trim()).await?;
    let email = normalize_email(&identity.email);
    let repo = UserRepository::new(&state.db);

    let user = match repo.find_by_email(&email).await? {
        None => {
            let user = repo
                .create(&NewUser {
                    name: &identity.name,
                    email: &email,
                    password_hash: None,
                    google_id: Some(&identity.subject),
                    profile_picture: identity.picture.as_deref(),
                })
                .await?;
            tracing::info!(user_id = %user.id, "user created from Google sign-in");
            user
        }
        Some(user) => match user.google_id.clone().as_deref() {
            None => {
                let user = repo
                    .link_google(&user, &identity.subject, identity.picture.as_deref())
                    .await?;
                tracing::info!(user_id = %user.id, "Google identity linked to existing account");
                user
            }
            Some(existing) if existing == identity.subject => user,
            Some(_) => {
                tracing::warn!(user_id = %user.id, "Google subject does not match linked identity");
                return Err(AppError::InvalidToken(
                    "Google account does not match this user".to_string(),
                ));
            }
        },
    };

    let jar = start_session(&state, jar, &user)?;
    Ok((
        jar,
        Json(UserResponse {
            user: user.profile(),
        }),
    ))
}

/// Add a password to a Google-only account.
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetPasswordRequest>,
) -> Result<Json<Value>> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let repo = UserRepository::new(&state.db);
    let user = repo
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;
    if !user.can_bootstrap_password() {
        return Err(AppError::InvalidState(
            "Password can only be set for Google accounts without one".to_string(),
        ));
    }

    let password_hash = hash_password_blocking(req.password, state.settings.bcrypt_cost).await?;
    repo.set_password(&user, &password_hash).await?;
    tracing::info!(user_id = %user.id, "password set for Google account");

    Ok(Json(
        json!({ "success": true, "message": "Password set successfully" }),
    ))
}
