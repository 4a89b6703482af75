//! Subject validation and pattern matching
//!
//! Subjects are dot-separated tokens. Subscription patterns may use `*` for
//! exactly one token and a trailing `>` for one or more remaining tokens:
//!
//! ```text
//! kv.provision.*     matches kv.provision.n1
//! kv.>               matches kv.provision.n1, kv.discover
//! kv.*               matches kv.discover, not kv.provision.n1
//! ```

use crate::error::{BusError, Result};

/// Validate a concrete subject used for publishing
pub fn validate_subject(subject: &str) -> Result<()> {
    validate_tokens(subject)?;
    if subject.split('.').any(|t| t == "*" || t == ">") {
        return Err(BusError::invalid_subject(subject, "wildcards are not allowed when publishing"));
    }
    Ok(())
}

/// Validate a subscription pattern
pub fn validate_pattern(pattern: &str) -> Result<()> {
    validate_tokens(pattern)?;
    let tokens: Vec<&str> = pattern.split('.').collect();
    if let Some(pos) = tokens.iter().position(|t| *t == ">") {
        if pos != tokens.len() - 1 {
            return Err(BusError::invalid_subject(pattern, "'>' must be the last token"));
        }
    }
    Ok(())
}

fn validate_tokens(subject: &str) -> Result<()> {
    if subject.is_empty() {
        return Err(BusError::invalid_subject(subject, "empty subject"));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(BusError::invalid_subject(subject, "whitespace is not allowed"));
    }
    if subject.split('.').any(str::is_empty) {
        return Err(BusError::invalid_subject(subject, "empty token"));
    }
    Ok(())
}

/// Whether `subject` matches `pattern`
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_wildcards() {
        assert!(matches("kv.discover", "kv.discover"));
        assert!(!matches("kv.discover", "kv.discover.x"));
        assert!(matches("kv.provision.*", "kv.provision.n1"));
        assert!(!matches("kv.provision.*", "kv.provision"));
        assert!(!matches("kv.*", "kv.provision.n1"));
        assert!(matches("kv.>", "kv.provision.n1"));
        assert!(!matches("kv.>", "kv"));
        assert!(matches(">", "anything.at.all"));
    }

    #[test]
    fn test_validation() {
        assert!(validate_subject("kv.provision.n1").is_ok());
        assert!(validate_subject("kv.*").is_err());
        assert!(validate_subject("kv..x").is_err());
        assert!(validate_subject("").is_err());
        assert!(validate_pattern("kv.*.n1").is_ok());
        assert!(validate_pattern("kv.>.x").is_err());
        assert!(validate_pattern("has space").is_err());
    }
}
