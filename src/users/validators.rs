// Request validation for user endpoints

use super::models::{
    ChangePasswordRequest, ConfirmVerificationRequest, CreateUserRequest, ForgotPasswordRequest,
    LocalLoginRequest, ResetPasswordRequest, SocialLoginRequest, VerificationQuery,
    VerificationRequest,
};
use crate::common::{is_valid_email, ValidationResult, Validator, VERIFICATION_CODE_LENGTH};

const MIN_PASSWORD_LENGTH: usize = 6;

fn check_email(result: &mut ValidationResult, email: &str) {
    if !is_valid_email(email) {
        result.add_error("email", "A valid email address is required");
    }
}

fn check_password(result: &mut ValidationResult, field: &str, password: &str) {
    if password.len() < MIN_PASSWORD_LENGTH {
        result.add_error(field, "Password must be at least 6 characters long");
    }
}

fn check_code(result: &mut ValidationResult, code: &str) {
    if code.len() != VERIFICATION_CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        result.add_error("token", "A valid verification code is required");
    }
}

pub struct CreateUserValidator;

impl Validator<CreateUserRequest> for CreateUserValidator {
    fn validate(&self, data: &CreateUserRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);
        check_password(&mut result, "password", &data.password);
        result
    }
}

pub struct LocalLoginValidator;

impl Validator<LocalLoginRequest> for LocalLoginValidator {
    fn validate(&self, data: &LocalLoginRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);
        check_password(&mut result, "password", &data.password);
        result
    }
}

pub struct SocialLoginValidator;

impl Validator<SocialLoginRequest> for SocialLoginValidator {
    fn validate(&self, data: &SocialLoginRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        if data.token.trim().is_empty() {
            result.add_error("token", "An access token is required");
        }
        result
    }
}

pub struct ForgotPasswordValidator;

impl Validator<ForgotPasswordRequest> for ForgotPasswordValidator {
    fn validate(&self, data: &ForgotPasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);
        result
    }
}

pub struct ResetPasswordValidator;

impl Validator<ResetPasswordRequest> for ResetPasswordValidator {
    fn validate(&self, data: &ResetPasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_code(&mut result, &data.token);
        check_password(&mut result, "newPassword", &data.new_password);
        result
    }
}

pub struct ChangePasswordValidator;

impl Validator<ChangePasswordRequest> for ChangePasswordValidator {
    fn validate(&self, data: &ChangePasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);
        if data.old_password.is_empty() {
            result.add_error("oldPassword", "Your current password is required");
        }
        check_password(&mut result, "newPassword", &data.new_password);
        result
    }
}

pub struct VerificationRequestValidator;

impl VerificationRequestValidator {
    /// The query string selects the verification channel; only `email` is
    /// supported.
    pub fn validate_query(&self, query: &VerificationQuery) -> ValidationResult {
        let mut result = ValidationResult::new();
        match query.kind.as_deref() {
            Some("email") => {}
            _ => result.add_error("type", "Verification type must be 'email'"),
        }
        if let Some(resend) = query.resend.as_deref() {
            if resend != "1" {
                result.add_error("resend", "Resend must be '1' when present");
            }
        }
        result
    }
}

impl Validator<VerificationRequest> for VerificationRequestValidator {
    fn validate(&self, data: &VerificationRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);
        result
    }
}

pub struct ConfirmVerificationValidator;

impl Validator<ConfirmVerificationRequest> for ConfirmVerificationValidator {
    fn validate(&self, data: &ConfirmVerificationRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_code(&mut result, &data.token);
        result
    }
}
