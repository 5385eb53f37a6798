//! `|`-delimited claim serialization shared by both token kinds.

use crate::TokenError;

const DELIMITER: char = '|';

pub(crate) fn check_id(field: &'static str, value: &str) -> Result<(), TokenError> {
    if value.trim().is_empty() {
        return Err(TokenError::InvalidClaim {
            field,
            reason: "must not be blank",
        });
    }
    check_optional(field, Some(value))
}

pub(crate) fn check_optional(field: &'static str, value: Option<&str>) -> Result<(), TokenError> {
    if value.is_some_and(|v| v.contains(DELIMITER)) {
        return Err(TokenError::InvalidClaim {
            field,
            reason: "must not contain '|'",
        });
    }
    Ok(())
}

pub(crate) fn check_times(issued_at: i64, expires_at: i64) -> Result<(), TokenError> {
    if issued_at < 0 {
        return Err(TokenError::InvalidClaim {
            field: "issued_at",
            reason: "must not be negative",
        });
    }
    if expires_at < issued_at {
        return Err(TokenError::InvalidClaim {
            field: "expires_at",
            reason: "must not precede issued_at",
        });
    }
    Ok(())
}

pub(crate) fn join(parts: &[&str]) -> Vec<u8> {
    let mut joined = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            joined.push(DELIMITER);
        }
        joined.push_str(part);
    }
    joined.into_bytes()
}

/// Splits a payload into exactly `count` fields.
pub(crate) fn split(payload: &[u8], count: usize) -> Option<Vec<&str>> {
    let text = std::str::from_utf8(payload).ok()?;
    let parts: Vec<&str> = text.split(DELIMITER).collect();
    (parts.len() == count).then_some(parts)
}

/// Empty string means "absent".
pub(crate) fn optional(part: &str) -> Option<String> {
    (!part.is_empty()).then(|| part.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_inverts_join() {
        let payload = join(&["1", "abc", "", "9"]);
        assert_eq!(split(&payload, 4), Some(vec!["1", "abc", "", "9"]));
        assert_eq!(split(&payload, 5), None);
    }

    #[test]
    fn test_check_id_rejects_blank_and_delimiter() {
        assert!(check_id("target", " ").is_err());
        assert!(check_id("target", "a|b").is_err());
        assert!(check_id("target", "lobby-1").is_ok());
    }

    #[test]
    fn test_check_times_rejects_inverted_window() {
        assert!(check_times(10, 9).is_err());
        assert!(check_times(-1, 9).is_err());
        assert!(check_times(10, 10).is_ok());
    }
}
