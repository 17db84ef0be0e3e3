use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::{AppError, AppResult};

static SHARE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{8}$").unwrap());

fn is_printable_ascii(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}

pub fn validate_username(username: &str) -> AppResult<()> {
    if username.is_empty() {
        return Err(AppError::Validation("Username cannot be empty".to_string()));
    }

    if username.len() > 64 {
        return Err(AppError::Validation(
            "Username must be at most 64 characters long".to_string(),
        ));
    }

    if !is_printable_ascii(username) {
        return Err(AppError::Validation(
            "Username must contain only printable ASCII characters".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::Validation("Password cannot be empty".to_string()));
    }

    if password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters long".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_file_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Validation(
            "File name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(AppError::Validation(
            "File name must be at most 255 characters long".to_string(),
        ));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(AppError::Validation(
            "File name must not contain path separators".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_team_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Validation("Team name cannot be empty".to_string()));
    }

    if name.len() > 64 {
        return Err(AppError::Validation(
            "Team name must be at most 64 characters long".to_string(),
        ));
    }

    if !is_printable_ascii(name) {
        return Err(AppError::Validation(
            "Team name must contain only printable ASCII characters".to_string(),
        ));
    }

    Ok(())
}

/// Normalizes a human-typed share code and checks its shape. Codes are stored
/// uppercase; lookups accept any case.
pub fn normalize_share_code(code: &str) -> AppResult<String> {
    let normalized = code.trim().to_uppercase();

    if !SHARE_CODE_RE.is_match(&normalized) {
        return Err(AppError::Validation(
            "Share code must be 8 letters or digits".to_string(),
        ));
    }

    Ok(normalized)
}
