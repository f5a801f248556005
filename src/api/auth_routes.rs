//! `/api/auth`: signup, login, current user, logout

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::{
    hash_password, verify_password, CurrentUser, LoginRequest, SignupRequest, TokenResponse,
    UserResponse,
};
use crate::store::NewUser;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let Json(request) = payload?;
    request.validate()?;

    if let Some(conflict) = state
        .store
        .find_user_conflict(&request.email, &request.username)
        .await?
    {
        return Err(ApiError::BadRequest(conflict.message().to_string()));
    }

    let user = state
        .store
        .create_user(NewUser {
            email: request.email,
            username: request.username,
            hashed_password: hash_password(&request.password)?,
            full_name: request.full_name,
        })
        .await?;

    info!("New user registered: {}", user.username);

    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Json(request) = payload?;

    let user = state
        .store
        .find_user_by_username(&request.username)
        .await?
        .filter(|user| verify_password(&request.password, &user.hashed_password))
        .ok_or_else(|| ApiError::Unauthorized("Incorrect username or password".to_string()))?;

    if !user.is_active {
        return Err(ApiError::BadRequest("Inactive user account".to_string()));
    }

    let token = state.jwt.create_token(user.id)?;

    info!("User logged in: {}", user.username);

    Ok(Json(TokenResponse::bearer(token)))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

async fn logout(CurrentUser(user): CurrentUser) -> Json<Value> {
    info!("User logged out: {}", user.username);
    Json(json!({ "message": "Successfully logged out" }))
}
