use crate::server::response::ApiError;
use crate::types::is_reserved_branch_name;

const MAX_NAME_LEN: usize = 100;
const MAX_BRANCH_NAME_LEN: usize = 100;
const MAX_KEY_LEN: usize = 255;

fn is_valid_branch_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

/// Display names of spaces, projects and languages.
pub fn validate_name(name: &str, entity: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{entity} name cannot be empty")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "{entity} name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_branch_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Branch name cannot be empty"));
    }
    if name.len() > MAX_BRANCH_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Branch name cannot exceed {MAX_BRANCH_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(is_valid_branch_char) {
        return Err(ApiError::bad_request(
            "Branch name can only contain alphanumeric characters, hyphens, underscores, periods, and slashes",
        ));
    }
    if is_reserved_branch_name(name) {
        return Err(ApiError::conflict(format!("Branch name '{name}' is reserved")));
    }
    Ok(())
}

/// Keys are dot-delimited paths such as `common.actions.save`.
pub fn validate_mutation_key(key: &str) -> Result<(), ApiError> {
    if key.is_empty() {
        return Err(ApiError::bad_request("Key cannot be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ApiError::bad_request(format!(
            "Key cannot exceed {MAX_KEY_LEN} characters"
        )));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request("Key cannot contain whitespace"));
    }
    if key.split('.').any(str::is_empty) {
        return Err(ApiError::bad_request(
            "Key cannot start or end with a period or contain empty segments",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    #[test]
    fn test_branch_names() {
        for ok in ["release-1", "feature/login", "v1.2_fix"] {
            assert!(validate_branch_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "has space", "emoji✨", "x".repeat(101).as_str()] {
            assert_eq!(validate_branch_name(bad).unwrap_err().status, StatusCode::BAD_REQUEST);
        }
        for reserved in ["main", "latest"] {
            assert_eq!(validate_branch_name(reserved).unwrap_err().status, StatusCode::CONFLICT);
        }
    }

    #[test]
    fn test_mutation_keys() {
        for ok in ["greeting", "common.actions.save", "a-b_c.d"] {
            assert!(validate_mutation_key(ok).is_ok(), "{ok}");
        }
        for bad in ["", ".lead", "trail.", "a..b", "a b", "k".repeat(256).as_str()] {
            assert!(validate_mutation_key(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_names() {
        assert!(validate_name("Marketing site", "Project").is_ok());
        assert!(validate_name("   ", "Project").is_err());
    }
}
