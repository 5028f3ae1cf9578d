use serde::{Deserialize, Serialize};

use algoshield_auth::Principal;

use super::errors::ApiError;

const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_email(&self.email)?;
        validate_new_password("password", &self.password)?;

        let name_len = self.name.trim().chars().count();
        if name_len == 0 {
            return Err(ApiError::validation("name is required"));
        }
        if name_len > MAX_NAME_LEN {
            return Err(ApiError::validation(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.email.trim().is_empty() {
            return Err(ApiError::validation("email is required"));
        }
        if self.password.is_empty() {
            return Err(ApiError::validation("password is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.current_password.is_empty() {
            return Err(ApiError::validation("current_password is required"));
        }
        validate_new_password("new_password", &self.new_password)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Principal,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::validation("email is required"));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(ApiError::validation(format!(
            "email must be at most {MAX_EMAIL_LEN} characters"
        )));
    }
    if !looks_like_email(email) {
        return Err(ApiError::validation("email must be a valid email address"));
    }
    Ok(())
}

/// `local@domain.tld`: one `@`, no whitespace, and a dot inside the domain.
fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty() && !host.ends_with('.'),
        None => false,
    }
}

fn validate_new_password(field: &str, password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "{field} must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "{field} must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::errors::ErrorCode;

    fn register(email: &str, password: &str, name: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn email_shape() {
        for ok in ["a@b.co", "first.last+tag@sub.example.org"] {
            assert!(looks_like_email(ok), "{ok}");
        }
        for bad in ["", "plain", "@b.co", "a@", "a@b", "a@.co", "a@b.", "a b@c.io", "a@b@c.io", "a@b..io"] {
            assert!(!looks_like_email(bad), "{bad}");
        }
    }

    #[test]
    fn register_rules_name_the_field() {
        assert!(register("a@b.co", "longenough", "Ann").validate().is_ok());

        let err = register("", "longenough", "Ann").validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.message().contains("email"));

        let err = register("a@b.co", "short", "Ann").validate().unwrap_err();
        assert!(err.message().starts_with("password"));

        let err = register("a@b.co", &"x".repeat(129), "Ann").validate().unwrap_err();
        assert!(err.message().contains("at most 128"));

        let err = register("a@b.co", "longenough", "   ").validate().unwrap_err();
        assert_eq!(err.message(), "name is required");

        let err = register("a@b.co", "longenough", &"n".repeat(256)).validate().unwrap_err();
        assert!(err.message().starts_with("name"));

        let long_email = format!("{}@example.com", "l".repeat(250));
        let err = register(&long_email, "longenough", "Ann").validate().unwrap_err();
        assert!(err.message().contains("at most 254"));
    }

    #[test]
    fn missing_fields_deserialize_as_empty() {
        let req: LoginRequest = serde_json::from_str(r#"{"email":"a@b.co"}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.message(), "password is required");
    }

    #[test]
    fn change_password_rules() {
        let req = ChangePasswordRequest {
            current_password: String::new(),
            new_password: "longenough".to_string(),
        };
        assert_eq!(req.validate().unwrap_err().message(), "current_password is required");

        let req = ChangePasswordRequest {
            current_password: "whatever".to_string(),
            new_password: "short".to_string(),
        };
        assert!(req.validate().unwrap_err().message().starts_with("new_password"));
    }
}
