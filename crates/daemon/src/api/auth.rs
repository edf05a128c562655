//! Owner onboarding, login, password reset and institute logo handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use institute_core::api::{
    non_blank, CreateSystemUserRequest, LoginRequest, LoginResponse, LogoRequest, OtpRequest,
    ResetPasswordRequest, SystemUserStatus,
};
use institute_core::model::{OtpPurpose, PublicUser, SystemUser, SystemUserOtp};
use institute_core::{iso_millis, new_id, now_utc};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::{ok, ApiError, AppState};
use crate::auth::{
    check_password, generate_otp, hash_otp, hash_password, issue_token, validate_logo, PasswordCheck,
    OTP_EXPIRY_MINUTES,
};
use crate::mailer::{otp_mail, OtpMailKind};

const OWNER_EXISTS: &str = "System user already exists";
const NO_OWNER: &str = "No system user found. Please create a user first.";
const EMAIL_MISMATCH: &str = "Email does not match system user";
const BAD_CODE: &str = "Invalid or expired verification code";
const SEND_FAILED: &str = "Unable to send verification code";

async fn owner(state: &AppState) -> Result<SystemUser, ApiError> {
    state
        .db
        .get_owner()
        .await?
        .ok_or_else(|| ApiError::not_found(NO_OWNER))
}

/// Stores a fresh hashed code for `email` and mails the plain code.
async fn issue_otp(
    state: &AppState,
    email: &str,
    name: &str,
    purpose: OtpPurpose,
    kind: OtpMailKind,
) -> Result<(), ApiError> {
    let code = generate_otp();
    let now = now_utc();
    let record = SystemUserOtp {
        id: new_id(),
        email: email.to_lowercase(),
        otp_hash: hash_otp(&code),
        purpose,
        expires_at: now + Duration::minutes(OTP_EXPIRY_MINUTES),
        created_at: now,
    };
    state.db.insert_otp(&record).await.map_err(|e| {
        error!(err = %format!("{e:#}"), "storing verification code");
        ApiError::failed(SEND_FAILED)
    })?;
    let mail = otp_mail(email, name, &code, OTP_EXPIRY_MINUTES, kind);
    state.mailer.send(mail).await.map_err(|e| {
        error!(err = %format!("{e:#}"), purpose = purpose.as_str(), "sending verification code");
        ApiError::failed(SEND_FAILED)
    })?;
    info!(purpose = purpose.as_str(), "verification code sent");
    Ok(())
}

pub async fn status(State(state): State<AppState>) -> Result<Json<SystemUserStatus>, ApiError> {
    let user = state.db.get_owner().await?;
    Ok(Json(SystemUserStatus {
        success: true,
        exists: user.is_some(),
        user: user.as_ref().map(PublicUser::from),
    }))
}

pub async fn request_create_otp(
    State(state): State<AppState>,
    Json(req): Json<OtpRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = non_blank(&req.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;
    if state.db.get_owner().await?.is_some() {
        return Err(ApiError::conflict(OWNER_EXISTS));
    }
    let name = non_blank(&req.name).unwrap_or_default();
    issue_otp(&state, email, name, OtpPurpose::CreateSystemUser, OtpMailKind::Create).await?;
    Ok(ok(json!({ "message": "Verification code sent" })))
}

pub async fn create_owner(
    State(state): State<AppState>,
    Json(req): Json<CreateSystemUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (Some(name), Some(email), Some(institute_name), Some(password), Some(otp)) = (
        non_blank(&req.name),
        non_blank(&req.email),
        non_blank(&req.institute_name),
        non_blank(&req.password),
        non_blank(&req.otp),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };
    if state.db.get_owner().await?.is_some() {
        return Err(ApiError::conflict(OWNER_EXISTS));
    }

    let email = email.to_lowercase();
    let now = now_utc();
    state
        .db
        .find_valid_otp(&email, OtpPurpose::CreateSystemUser, &hash_otp(otp), now)
        .await?
        .ok_or_else(|| ApiError::bad_request(BAD_CODE))?;

    let user = SystemUser {
        id: new_id(),
        name: name.to_string(),
        email: email.clone(),
        institute_name: institute_name.to_string(),
        password: hash_password(password.to_string()).await?,
        institute_logo: String::new(),
        created_at: now,
        updated_at: now,
    };
    state.db.create_owner(&user).await?;
    state.db.clear_otps(&email, OtpPurpose::CreateSystemUser).await?;
    info!(id = %user.id, "system user created");

    Ok((
        StatusCode::CREATED,
        ok(json!({ "message": "System user created", "user": PublicUser::from(&user) })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let password = req.password.as_deref().filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (non_blank(&req.email), password) else {
        return Err(ApiError::bad_request("Email and password are required"));
    };
    let mut user = state
        .db
        .find_owner_by_email(email)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_OWNER))?;

    match check_password(password.to_string(), user.password.clone()).await? {
        PasswordCheck::Match => {}
        PasswordCheck::MatchNeedsUpgrade => {
            user.password = hash_password(password.to_string()).await?;
            user.updated_at = now_utc();
            state.db.save_owner(&user).await?;
            info!(id = %user.id, "legacy password upgraded");
        }
        PasswordCheck::Mismatch => {
            warn!("login rejected");
            return Err(ApiError::Unauthorized("Email or password is not matched".into()));
        }
    }

    let issued = issue_token(&state.config.auth, &user, now_utc())?;
    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".into(),
        token: issued.token,
        expires_at: iso_millis(&issued.expires_at),
        user: PublicUser::from(&user),
    }))
}

pub async fn request_reset_otp(
    State(state): State<AppState>,
    Json(req): Json<OtpRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = non_blank(&req.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;
    let user = owner(&state).await?;
    if !user.email.eq_ignore_ascii_case(email) {
        return Err(ApiError::bad_request(EMAIL_MISMATCH));
    }
    issue_otp(&state, &user.email, &user.name, OtpPurpose::ResetPassword, OtpMailKind::Reset).await?;
    Ok(ok(json!({ "message": "Verification code sent" })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(email), Some(otp), Some(new_password)) = (
        non_blank(&req.email),
        non_blank(&req.otp),
        non_blank(&req.new_password),
    ) else {
        return Err(ApiError::bad_request("Email, OTP, and new password are required"));
    };
    let mut user = owner(&state).await?;
    if !user.email.eq_ignore_ascii_case(email) {
        return Err(ApiError::bad_request(EMAIL_MISMATCH));
    }
    let now = now_utc();
    state
        .db
        .find_valid_otp(&user.email, OtpPurpose::ResetPassword, &hash_otp(otp), now)
        .await?
        .ok_or_else(|| ApiError::bad_request(BAD_CODE))?;

    user.password = hash_password(new_password.to_string()).await?;
    user.updated_at = now;
    state.db.save_owner(&user).await?;
    state.db.clear_otps(&user.email, OtpPurpose::ResetPassword).await?;
    info!(id = %user.id, "password reset");

    Ok(ok(json!({ "message": "Password reset successful", "user": PublicUser::from(&user) })))
}

pub async fn set_logo(
    State(state): State<AppState>,
    Json(req): Json<LogoRequest>,
) -> Result<Json<Value>, ApiError> {
    let logo = validate_logo(req.logo.as_deref()).map_err(ApiError::bad_request)?;
    let mut user = owner(&state).await?;
    user.institute_logo = logo;
    user.updated_at = now_utc();
    state.db.save_owner(&user).await?;
    Ok(ok(json!({ "message": "Institute logo updated", "user": PublicUser::from(&user) })))
}

pub async fn clear_logo(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut user = owner(&state).await?;
    user.institute_logo.clear();
    user.updated_at = now_utc();
    state.db.save_owner(&user).await?;
    Ok(ok(json!({ "message": "Institute logo removed", "user": PublicUser::from(&user) })))
}
