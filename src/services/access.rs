use chrono::{DateTime, Utc};

use crate::models::file::File;
use crate::models::shared_link::SharedLink;
use crate::utils::crypto::verify_password;
use crate::utils::error::AppResult;

/// Policy outcome for a resolved share. Denials are data, not errors; the
/// handler layer turns them into user-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Expired,
    LimitReached,
    PasswordRequired,
    InvalidPassword,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::Expired => "This share link has expired",
            DenyReason::LimitReached => "This share link has reached its download limit",
            DenyReason::PasswordRequired => "This file requires a password",
            DenyReason::InvalidPassword => "Incorrect password",
        }
    }
}

/// Expiry boundary is inclusive: a link expiring exactly now is already gone.
fn is_expired(expires_at: &str, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(ts) => ts.with_timezone(&Utc) <= now,
        Err(e) => {
            tracing::warn!("Unparseable expiry timestamp {:?}: {}", expires_at, e);
            true
        }
    }
}

fn check_password(
    password_hash: Option<&str>,
    supplied: Option<&str>,
) -> AppResult<AccessDecision> {
    let Some(hash) = password_hash else {
        // Lock flag set but no protected link to validate against; nothing can
        // satisfy the check, so deny rather than wave the request through.
        return Ok(AccessDecision::Denied(DenyReason::PasswordRequired));
    };

    let Some(supplied) = supplied else {
        return Ok(AccessDecision::Denied(DenyReason::PasswordRequired));
    };

    if verify_password(supplied, hash)? {
        Ok(AccessDecision::Allowed)
    } else {
        Ok(AccessDecision::Denied(DenyReason::InvalidPassword))
    }
}

/// Token path. Check order is fixed on every access path: expiry, then
/// download limit, then password. The active flag is the resolver's filter.
pub fn validate_link_access(
    link: &SharedLink,
    file: &File,
    password: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<AccessDecision> {
    if let Some(expires_at) = &link.expires_at
        && is_expired(expires_at, now)
    {
        return Ok(AccessDecision::Denied(DenyReason::Expired));
    }

    if let Some(limit) = link.download_limit
        && link.download_count >= limit
    {
        return Ok(AccessDecision::Denied(DenyReason::LimitReached));
    }

    if file.is_locked == 1 || link.password_hash.is_some() {
        return check_password(link.password_hash.as_deref(), password);
    }

    Ok(AccessDecision::Allowed)
}

/// Code path. Codes skip link-level policy entirely; only the file's lock flag
/// gates access, validated against the newest password-protected link.
pub fn validate_code_access(
    file: &File,
    password_hash: Option<&str>,
    password: Option<&str>,
) -> AppResult<AccessDecision> {
    if file.is_locked == 1 {
        return check_password(password_hash, password);
    }

    Ok(AccessDecision::Allowed)
}
