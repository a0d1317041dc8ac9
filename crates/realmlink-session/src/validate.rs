//! Client-side input checks, run before anything goes over the wire.
//!
//! Rules mirror what the backend enforces, so an obviously bad form never
//! costs a round trip. Password strength is left to the server.

use realmlink_protocol::{ErrorCategory, ErrorRecord, codes};

use crate::{Credentials, Registration};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;

fn invalid(message: &str) -> ErrorRecord {
    ErrorRecord::new(codes::INVALID_INPUT, message, ErrorCategory::Auth)
}

pub(crate) fn validate_credentials(credentials: &Credentials) -> Result<(), ErrorRecord> {
    if credentials.email.trim().is_empty() {
        return Err(invalid("Email is required"));
    }
    if credentials.password.is_empty() {
        return Err(invalid("Password is required"));
    }
    Ok(())
}

pub(crate) fn validate_registration(registration: &Registration) -> Result<(), ErrorRecord> {
    if registration.email.trim().is_empty()
        || registration.username.is_empty()
        || registration.password.is_empty()
    {
        return Err(invalid("Email, username and password are required"));
    }
    if !is_valid_username(&registration.username) {
        return Err(invalid(
            "Username must be 3-30 characters of letters, digits, '_' or '-'",
        ));
    }
    if !is_valid_email(&registration.email) {
        return Err(invalid("Email address is not valid"));
    }
    Ok(())
}

/// `[A-Za-z0-9_-]{3,30}`
pub fn is_valid_username(username: &str) -> bool {
    (USERNAME_MIN..=USERNAME_MAX).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// `local@domain.tld`: a non-empty local part of `[A-Za-z0-9._%+-]`, a
/// domain of `[A-Za-z0-9.-]`, and an alphabetic TLD of two or more letters.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"._%+-".contains(&b));
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    let host_ok = !host.is_empty()
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
    let tld_ok = tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic());
    local_ok && host_ok && tld_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usernames() {
        assert!(is_valid_username("abc"));
        assert!(is_valid_username("Test_User-01"));
        assert!(is_valid_username(&"a".repeat(30)));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username(&"a".repeat(31)));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("émile"));
    }

    #[test]
    fn test_emails() {
        assert!(is_valid_email("test@test.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@test.com"));
        assert!(!is_valid_email("test@localhost"));
        assert!(!is_valid_email("test@test.c"));
        assert!(!is_valid_email("test@.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_validate_credentials_requires_both_fields() {
        let err = validate_credentials(&Credentials::new("test@test.com", "")).unwrap_err();
        assert_eq!(err.code, codes::INVALID_INPUT);
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(validate_credentials(&Credentials::new("  ", "pw")).is_err());
        assert!(validate_credentials(&Credentials::new("a@b.io", "pw")).is_ok());
    }

    #[test]
    fn test_validate_registration() {
        assert!(validate_registration(&Registration::new("new@test.com", "NewUser", "pw")).is_ok());
        assert!(validate_registration(&Registration::new("new@test.com", "x", "pw")).is_err());
        assert!(validate_registration(&Registration::new("bad", "NewUser", "pw")).is_err());
        assert!(validate_registration(&Registration::new("", "NewUser", "pw")).is_err());
    }
}
