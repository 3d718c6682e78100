//! Input validation and normalization for account data.
//!
//! Identifiers are normalized before they are stored or looked up so that
//! visually identical names cannot register twice.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required field is empty.
    #[error("{0} is required")]
    Empty(&'static str),

    /// Input is shorter than allowed.
    #[error("{field} must be at least {min} characters")]
    TooShort {
        /// Field name.
        field: &'static str,
        /// Minimum length.
        min: usize,
    },

    /// Input exceeds maximum allowed length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum length.
        max: usize,
    },

    /// Disallowed characters in input.
    #[error("{0} contains disallowed characters")]
    DisallowedChars(&'static str),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum identifier length.
    pub const MAX_IDENTIFIER_LENGTH: usize = 64;

    /// Maximum display name length.
    pub const MAX_DISPLAY_NAME_LENGTH: usize = 128;

    /// Maximum email length.
    pub const MAX_EMAIL_LENGTH: usize = 254;
}

/// Password acceptance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    /// Maximum length in characters.
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
        }
    }
}

/// Normalize a user identifier: trim, NFKC, ASCII lowercase.
#[must_use]
pub fn normalize_identifier(input: &str) -> String {
    input.trim().nfkc().collect::<String>().to_ascii_lowercase()
}

/// Validate and normalize a user identifier.
///
/// Accepts ASCII letters, digits and `_ . - @` after normalization.
///
/// # Errors
///
/// Returns an error if the identifier is empty, too long, or contains
/// characters outside the allowed set.
pub fn validate_identifier(input: &str) -> Result<String, ValidationError> {
    let id = normalize_identifier(input);

    if id.is_empty() {
        return Err(ValidationError::Empty("Identifier"));
    }
    if id.chars().count() > limits::MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field: "Identifier",
            max: limits::MAX_IDENTIFIER_LENGTH,
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '@'))
    {
        return Err(ValidationError::DisallowedChars("Identifier"));
    }

    Ok(id)
}

/// Validate a password against a policy.
///
/// The password is never normalized or trimmed.
///
/// # Errors
///
/// Returns an error if the password violates the policy or contains
/// control characters.
pub fn validate_password(password: &str, policy: PasswordPolicy) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Empty("Password"));
    }

    let len = password.chars().count();
    if len < policy.min_length {
        return Err(ValidationError::TooShort {
            field: "Password",
            min: policy.min_length,
        });
    }
    if len > policy.max_length {
        return Err(ValidationError::TooLong {
            field: "Password",
            max: policy.max_length,
        });
    }
    if password.chars().any(char::is_control) {
        return Err(ValidationError::DisallowedChars("Password"));
    }

    Ok(())
}

/// Sanitize an optional display attribute.
///
/// Strips control characters, NFKC-normalizes and trims. Blank input
/// becomes `None`.
///
/// # Errors
///
/// Returns `ValidationError::TooLong` if the cleaned value exceeds `max_len`.
pub fn sanitize_display_attribute(
    input: Option<&str>,
    field: &'static str,
    max_len: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(raw) = input else {
        return Ok(None);
    };

    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .nfkc()
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Ok(None);
    }
    if cleaned.chars().count() > max_len {
        return Err(ValidationError::TooLong {
            field,
            max: max_len,
        });
    }

    Ok(Some(cleaned.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  Alice "), "alice");
        // Fullwidth letters fold to ASCII under NFKC
        assert_eq!(normalize_identifier("ａｌｉｃｅ"), "alice");
    }

    #[test]
    fn test_validate_identifier() {
        assert_eq!(validate_identifier("alice").unwrap(), "alice");
        assert_eq!(
            validate_identifier("Bob.Smith@example.org").unwrap(),
            "bob.smith@example.org"
        );
        assert_eq!(
            validate_identifier("   "),
            Err(ValidationError::Empty("Identifier"))
        );
        assert_eq!(
            validate_identifier("al ice"),
            Err(ValidationError::DisallowedChars("Identifier"))
        );
        assert!(matches!(
            validate_identifier(&"a".repeat(65)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_password() {
        let policy = PasswordPolicy::default();
        assert!(validate_password("correct horse", policy).is_ok());
        assert_eq!(
            validate_password("short", policy),
            Err(ValidationError::TooShort {
                field: "Password",
                min: 8
            })
        );
        assert_eq!(
            validate_password("", policy),
            Err(ValidationError::Empty("Password"))
        );
        assert!(validate_password("bad\u{0}password", policy).is_err());

        let lenient = PasswordPolicy {
            min_length: 3,
            max_length: 8,
        };
        assert!(validate_password("pw1", lenient).is_ok());
        assert!(validate_password("123456789", lenient).is_err());
    }

    #[test]
    fn test_sanitize_display_attribute() {
        assert_eq!(
            sanitize_display_attribute(Some("  Alice\u{7} Liddell "), "Name", 32).unwrap(),
            Some("Alice Liddell".to_string())
        );
        assert_eq!(sanitize_display_attribute(Some("   "), "Name", 32).unwrap(), None);
        assert_eq!(sanitize_display_attribute(None, "Name", 32).unwrap(), None);
        assert!(sanitize_display_attribute(Some("abcdef"), "Name", 3).is_err());
    }
}
