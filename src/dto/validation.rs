//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a slug is non-empty lowercase ASCII alphanumerics and inner dashes.
///
/// # Examples
///
/// ```ignore
/// validate_slug("doom-2016")  // Ok
/// validate_slug("Doom-2016")  // Err - uppercase
/// validate_slug("-doom")      // Err - leading dash
/// ```
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.is_empty() {
        let mut err = ValidationError::new("slug_empty");
        err.message = Some("Slug must not be empty".into());
        return Err(err);
    }

    let well_formed = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if !well_formed {
        let mut err = ValidationError::new("slug_format");
        err.message = Some(
            "Slug must contain only lowercase letters, digits and inner dashes".into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Rejects strings that are empty once trimmed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slug_valid() {
        assert!(validate_slug("doom-2016").is_ok());
        assert!(validate_slug("minecraft").is_ok());
        assert!(validate_slug("7-days-to-die").is_ok());
        assert!(validate_slug("doom--2").is_ok());
    }

    #[test]
    fn test_validate_slug_invalid() {
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Doom").is_err()); // uppercase
        assert!(validate_slug("doom 2016").is_err()); // space
        assert!(validate_slug("-doom").is_err());
        assert!(validate_slug("doom-").is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("FPS").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }
}
