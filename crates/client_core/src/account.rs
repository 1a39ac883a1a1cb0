//! Client-side checks for the account forms, run before anything is sent.

use shared::protocol::{
    ChangePasswordRequest, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest,
};

use crate::error::ClientError;

#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegistrationForm {
    pub fn validate(self) -> Result<RegisterRequest, ClientError> {
        let name = self.name.trim();
        let email = self.email.trim();
        if name.is_empty() || email.is_empty() || self.password.is_empty() {
            return Err(ClientError::validation("all fields are required"));
        }
        check_email(email)?;
        Ok(RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: self.password,
            points: 0,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordResetForm {
    pub token: Option<String>,
    pub password: String,
    pub confirmation: String,
}

impl PasswordResetForm {
    pub fn validate(self) -> Result<ResetPasswordRequest, ClientError> {
        let token = self
            .token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ClientError::validation("reset token not found; request a new recovery link")
            })?;
        if self.password != self.confirmation {
            return Err(ClientError::validation("passwords do not match"));
        }
        if self.password.is_empty() {
            return Err(ClientError::validation("new password is required"));
        }
        Ok(ResetPasswordRequest {
            token,
            new_password: self.password,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub name: String,
    pub email: String,
}

impl ProfileForm {
    pub fn validate(self) -> Result<UpdateProfileRequest, ClientError> {
        let name = self.name.trim();
        let email = self.email.trim();
        if name.is_empty() || email.is_empty() {
            return Err(ClientError::validation("name and email are required"));
        }
        check_email(email)?;
        Ok(UpdateProfileRequest {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordChangeForm {
    pub current: String,
    pub new: String,
    pub confirmation: String,
}

impl PasswordChangeForm {
    pub fn validate(self) -> Result<ChangePasswordRequest, ClientError> {
        if self.new != self.confirmation {
            return Err(ClientError::validation("new passwords do not match"));
        }
        if self.current.is_empty() || self.new.is_empty() {
            return Err(ClientError::validation(
                "current and new password are required",
            ));
        }
        Ok(ChangePasswordRequest {
            current_password: self.current,
            new_password: self.new,
            confirmation_password: self.confirmation,
        })
    }
}

fn check_email(email: &str) -> Result<(), ClientError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ClientError::validation(format!(
            "'{email}' is not a valid email address"
        ))),
    }
}
