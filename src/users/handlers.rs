// HTTP handlers for user endpoints

use axum::extract::{Extension, Path, Query};
use axum::Json;
use serde_json::{json, Value};

use super::models::{
    AuthService, ChangePasswordRequest, ConfirmVerificationRequest, CreateUserRequest,
    ForgotPasswordRequest, ListQuery, LocalLoginRequest, ResetPasswordRequest,
    SocialLoginRequest, VerificationQuery, VerificationRequest,
};
use super::validators::{
    ChangePasswordValidator, ConfirmVerificationValidator, CreateUserValidator,
    ForgotPasswordValidator, LocalLoginValidator, ResetPasswordValidator, SocialLoginValidator,
    VerificationRequestValidator,
};
use crate::auth::AuthedUser;
use crate::common::{send_success, ApiError, AppState, Validator};

fn check<T>(validator: &dyn Validator<T>, data: &T) -> Result<(), ApiError> {
    let result = validator.validate(data);
    if result.is_valid {
        Ok(())
    } else {
        Err(result.into())
    }
}

fn parse_service(service: &str) -> Result<AuthService, ApiError> {
    AuthService::from_social_param(service)
        .ok_or_else(|| ApiError::NotFound("that auth service".to_string()))
}

/// POST /api/v1/users
pub async fn create_user(
    Extension(state): Extension<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    check(&CreateUserValidator, &payload)?;
    let (user, token) = state
        .user_service
        .create_user(&payload.email, Some(&payload.password), AuthService::Local)
        .await?;
    Ok(send_success(
        json!({ "_id": user.id, "status": user.status, "token": token }),
        Some("Your account has been created!"),
    ))
}

/// POST /api/v1/users/auth/local
pub async fn login_local(
    Extension(state): Extension<AppState>,
    Json(payload): Json<LocalLoginRequest>,
) -> Result<Json<Value>, ApiError> {
    check(&LocalLoginValidator, &payload)?;
    let (user, token) = state
        .user_service
        .login_local(&payload.email, &payload.password)
        .await?;
    Ok(send_success(
        json!({ "user": user.own_view(), "token": token }),
        Some("You are logged in!"),
    ))
}

/// POST /api/v1/users/auth/social/:service
pub async fn login_social(
    Extension(state): Extension<AppState>,
    Path(service): Path<String>,
    Json(payload): Json<SocialLoginRequest>,
) -> Result<Json<Value>, ApiError> {
    check(&SocialLoginValidator, &payload)?;
    let service = parse_service(&service)?;
    let (user, token) = state
        .user_service
        .login_social(service, &payload.token)
        .await?;
    Ok(send_success(
        json!({ "user": user.own_view(), "token": token }),
        Some("You are logged in!"),
    ))
}

/// GET /api/v1/users/auth/social/:service/url
pub async fn social_auth_url(
    Extension(state): Extension<AppState>,
    Path(service): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let service = parse_service(&service)?;
    let url = state.user_service.get_social_auth_url(service)?;
    Ok(send_success(json!({ "url": url }), None))
}

/// GET /api/v1/users/auth/me
pub async fn current_user(
    Extension(state): Extension<AppState>,
    authed: Option<AuthedUser>,
) -> Result<Json<Value>, ApiError> {
    match authed {
        Some(authed) => {
            let user = state
                .user_service
                .get_single_user(&authed.id)
                .await
                .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;
            Ok(send_success(json!({ "user": user.own_view() }), None))
        }
        None => Ok(send_success(json!({ "user": Value::Null }), None)),
    }
}

/// POST /api/v1/users/auth/forgot-password
pub async fn forgot_password(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    check(&ForgotPasswordValidator, &payload)?;
    let (id, token) = state.user_service.forgot_password(&payload.email).await?;
    Ok(send_success(
        json!({ "_id": id, "token": token }),
        Some("An email has been sent to your supplied address"),
    ))
}

/// POST /api/v1/users/auth/reset-password
pub async fn reset_password(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    check(&ResetPasswordValidator, &payload)?;
    state
        .user_service
        .reset_password(&payload.token, &payload.new_password)
        .await?;
    Ok(send_success(
        Value::Null,
        Some("Your password has been reset. You can log in again."),
    ))
}

/// POST /api/v1/users/auth/change-password
pub async fn change_password(
    Extension(state): Extension<AppState>,
    _authed: AuthedUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    check(&ChangePasswordValidator, &payload)?;
    state
        .user_service
        .change_password(&payload.email, &payload.old_password, &payload.new_password)
        .await?;
    Ok(send_success(Value::Null, Some("Your password has been updated")))
}

/// POST /api/v1/users/verifications/request?type=email&resend=1
pub async fn request_verification(
    Extension(state): Extension<AppState>,
    Query(query): Query<VerificationQuery>,
    Json(payload): Json<VerificationRequest>,
) -> Result<Json<Value>, ApiError> {
    let query_result = VerificationRequestValidator.validate_query(&query);
    if !query_result.is_valid {
        return Err(query_result.into());
    }
    check(&VerificationRequestValidator, &payload)?;

    let resend = query.resend.as_deref() == Some("1");
    let (user, token) = state
        .user_service
        .request_email_verification(&payload.email, resend)
        .await?;
    Ok(send_success(
        json!({
            "_id": user.id,
            "requested_email_verification": true,
            "token": token,
        }),
        Some("A verification email has been sent to your address"),
    ))
}

/// POST /api/v1/users/verifications/confirm
pub async fn confirm_verification(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ConfirmVerificationRequest>,
) -> Result<Json<Value>, ApiError> {
    check(&ConfirmVerificationValidator, &payload)?;
    let (user, token) = state
        .user_service
        .verify_by_email_token(&payload.token)
        .await?;
    Ok(send_success(
        json!({ "user": user.own_view(), "token": token }),
        Some("Your account has been verified!"),
    ))
}

/// GET /api/v1/users
pub async fn list_users(
    Extension(state): Extension<AppState>,
    _authed: AuthedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let users = state
        .user_service
        .get_all_users(query.page.unwrap_or(1), query.q.as_deref())
        .await;
    let users: Vec<Value> = users.iter().map(|u| u.sanitized()).collect();
    Ok(send_success(json!({ "users": users }), None))
}

/// GET /api/v1/users/all/search
pub async fn search_users(
    Extension(state): Extension<AppState>,
    _authed: AuthedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let users = state
        .user_service
        .get_all_users(query.page.unwrap_or(1), query.q.as_deref())
        .await;
    let users: Vec<Value> = users.iter().map(|u| u.sanitized()).collect();
    Ok(send_success(json!({ "users": users }), None))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    Extension(state): Extension<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = if id == "me" { authed.id.clone() } else { id };
    let user = state
        .user_service
        .get_single_user(&id)
        .await
        .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;
    // callers only ever see the sanitized projection here; /auth/me serves
    // the account holder's own view
    Ok(send_success(json!({ "user": user.sanitized() }), None))
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    Extension(state): Extension<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !payload.is_object() {
        return Err(ApiError::InvalidParams("Expected a JSON object".to_string()));
    }
    let changes = bson::to_document(&payload)
        .map_err(|e| ApiError::InvalidParams(format!("Unprocessable payload: {}", e)))?;

    let id = if id == "me" { authed.id.clone() } else { id };
    let user = state.user_service.update_user(&id, changes).await?;
    Ok(send_success(
        json!({ "user": user.own_view() }),
        Some("Changes saved!"),
    ))
}

/// DELETE /api/v1/users/:id
pub async fn delete_user(
    Extension(state): Extension<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = if id == "me" { authed.id.clone() } else { id };
    state.user_service.delete_user(&id).await?;
    Ok(send_success(Value::Null, Some("User has been removed successfully!")))
}
