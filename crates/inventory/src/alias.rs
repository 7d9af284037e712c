//! Alias and role identifier validation.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").unwrap());

static ROLE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

/// Validate a host alias.
///
/// Aliases are the primary key of a host: lowercase ASCII letters, digits,
/// `_` and `-`, at least one character.
pub fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() {
        return Err(Error::InvalidAlias {
            alias: alias.to_string(),
            reason: "alias is required".to_string(),
        });
    }
    if !ALIAS_RE.is_match(alias) {
        return Err(Error::InvalidAlias {
            alias: alias.to_string(),
            reason: "only a-z, 0-9, '_' and '-' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Check an alias without building an error.
pub fn is_valid_alias(alias: &str) -> bool {
    ALIAS_RE.is_match(alias)
}

/// Validate and trim a role identifier.
pub fn normalize_role_id(raw: &str) -> Result<String> {
    let role_id = raw.trim();
    if role_id.is_empty() || !ROLE_ID_RE.is_match(role_id) {
        return Err(Error::InvalidRoleId(raw.to_string()));
    }
    Ok(role_id.to_string())
}

/// Turn an alias into a safe file name stem.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`; an empty result falls
/// back to `host`. Valid aliases pass through unchanged, so the mapping is
/// injective over the alias domain.
pub fn sanitize_filename(alias: &str) -> String {
    let cleaned: String = alias
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "host".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_alias() {
        assert!(validate_alias("web-01").is_ok());
        assert!(validate_alias("db_main").is_ok());
        assert!(validate_alias("").is_err());
        assert!(validate_alias("Web").is_err());
        assert!(validate_alias("web.example").is_err());
        assert!(validate_alias("web 1").is_err());
    }

    #[test]
    fn test_normalize_role_id() {
        assert_eq!(normalize_role_id(" web-app-nginx ").unwrap(), "web-app-nginx");
        assert_eq!(normalize_role_id("svc.db_v2").unwrap(), "svc.db_v2");
        assert!(normalize_role_id("").is_err());
        assert!(normalize_role_id("a/b").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("web-01"), "web-01");
        assert_eq!(sanitize_filename("my host/1"), "my_host_1");
        assert_eq!(sanitize_filename("   "), "host");
    }

    #[test]
    fn test_sanitize_is_identity_for_valid_aliases() {
        for alias in ["a", "edge", "db_1", "x-y-z"] {
            assert!(is_valid_alias(alias));
            assert_eq!(sanitize_filename(alias), alias);
        }
    }
}
