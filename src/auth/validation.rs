//! Pure input validation predicates. No I/O, no state; every gate the
//! handlers apply before touching the store or the token service lives here.

use lazy_static::lazy_static;
use regex::Regex;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9_]+$").unwrap();
    }
    (3..=30).contains(&username.len()) && USERNAME_RE.is_match(username)
}

/// Every password rule the candidate fails to meet, in a form the rejection
/// message can enumerate. Empty means the password is acceptable.
pub fn password_issues(password: &str) -> Vec<&'static str> {
    let mut issues = Vec::new();
    if password.len() < 8 {
        issues.push("at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        issues.push("an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        issues.push("a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push("a digit");
    }
    issues
}
