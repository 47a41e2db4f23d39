//! Route handlers for the auth API.

pub mod auth;
pub mod health;

use regex::Regex;

/// Lightweight email sanity check used by auth handlers before persisting data.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_accepts_simple() {
        assert!(valid_email("officer@parkwise.app"));
    }

    #[test]
    fn valid_email_rejects_missing_at() {
        assert!(!valid_email("officer.parkwise.app"));
    }

    #[test]
    fn valid_email_rejects_missing_tld() {
        assert!(!valid_email("officer@parkwise"));
    }
}
