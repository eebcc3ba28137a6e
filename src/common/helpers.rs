// Helper functions for email normalization, response envelopes, and safe logging

use axum::Json;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Providers that treat `local+tag@domain` as an alias of `local@domain`.
const PLUS_ALIAS_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "hotmail.com",
    "outlook.com",
    "live.com",
];

/// Providers that ignore dots in the local part.
const DOT_ALIAS_DOMAINS: &[&str] = &["gmail.com", "googlemail.com"];

/// Canonicalizes an email address for uniqueness and lookup: lowercases the
/// whole address, folds provider-specific aliasing (plus-tags, gmail dots)
/// and maps googlemail.com onto gmail.com. Two raw addresses that normalize
/// to the same value are considered the same account.
pub fn normalize_email(email: &str) -> String {
    let lower = email.trim().to_lowercase();
    let Some((local, domain)) = lower.split_once('@') else {
        return lower;
    };

    let mut local = local.to_string();
    if PLUS_ALIAS_DOMAINS.contains(&domain) {
        if let Some((bare, _tag)) = local.split_once('+') {
            local = bare.to_string();
        }
    }
    if DOT_ALIAS_DOMAINS.contains(&domain) {
        local = local.replace('.', "");
    }

    let domain = if domain == "googlemail.com" {
        "gmail.com"
    } else {
        domain
    };

    format!("{}@{}", local, domain)
}

/// Returns true when the value looks like an email address.
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@([A-Za-z0-9-]+\.)+[A-Za-z]{2,}$").expect("email regex")
    });
    re.is_match(email)
}

/// Success response envelope: `{status, data, message?}`
pub fn send_success(data: Value, message: Option<&str>) -> Json<Value> {
    let mut body = json!({
        "status": "success",
        "data": data,
    });
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    Json(body)
}

/// Masks email addresses for safe logging
/// Prevents sensitive data exposure while preserving debugging utility
///
/// # Example
/// ```
/// let masked = safe_email_log("user@example.com");
/// // Returns: "u***@example.com"
/// ```
pub fn safe_email_log(email: &str) -> String {
    if email.len() > 3 {
        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() == 2 {
            format!("{}***@{}", &parts[0][..1.min(parts[0].len())], parts[1])
        } else {
            "***@***.***".to_string()
        }
    } else {
        "***@***.***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn normalize_folds_gmail_dots_and_plus_tags() {
        assert_eq!(normalize_email("john.doe+spam@gmail.com"), "johndoe@gmail.com");
        assert_eq!(normalize_email("JohnDoe@googlemail.com"), "johndoe@gmail.com");
        assert_eq!(normalize_email("j.o.h.n@gmail.com"), "john@gmail.com");
    }

    #[test]
    fn normalize_strips_plus_tag_for_outlook_family_only() {
        assert_eq!(normalize_email("jane+x@outlook.com"), "jane@outlook.com");
        // dots are significant outside the gmail family
        assert_eq!(normalize_email("jane.doe@outlook.com"), "jane.doe@outlook.com");
        // unknown providers keep plus tags
        assert_eq!(normalize_email("jane+x@example.com"), "jane+x@example.com");
    }

    #[test]
    fn email_regex_accepts_and_rejects() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("a.b+c@sub.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn masks_email_for_logs() {
        assert_eq!(safe_email_log("user@example.com"), "u***@example.com");
        assert_eq!(safe_email_log("ab"), "***@***.***");
    }
}
