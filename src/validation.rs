use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for the `author` search parameter, in characters.
///
/// Catalog author names are far shorter; anything longer is abuse.
pub const MAX_AUTHOR_LENGTH: usize = 256;

/// Maximum length for login usernames, in characters.
pub const MAX_USERNAME_LENGTH: usize = 128;

/// Message returned when the search endpoints get no usable author.
pub const MISSING_AUTHOR_MESSAGE: &str = "Missing 'author' query parameter";

/// Message returned when `/login` is missing either credential.
pub const MISSING_CREDENTIALS_MESSAGE: &str = "Missing credentials";

/// Validate the `author` query parameter and return it.
///
/// Rules:
/// - Must be present and non-empty
/// - Must not exceed 256 characters
/// - Must not contain control characters
pub fn validate_author(author: Option<&str>) -> AppResult<&str> {
    let author = match author {
        Some(a) if !a.is_empty() => a,
        _ => return Err(AppError::BadRequest(MISSING_AUTHOR_MESSAGE.to_string())),
    };

    let len = author.chars().count();
    if len > MAX_AUTHOR_LENGTH {
        return Err(AppError::BadRequest(format!(
            "'author' cannot exceed {MAX_AUTHOR_LENGTH} characters (got {len})"
        )));
    }

    if let Some(pos) = author.chars().position(|c| c.is_control()) {
        return Err(AppError::BadRequest(format!(
            "'author' contains invalid control character at position {pos}"
        )));
    }

    Ok(author)
}

/// Validate login credentials and return `(username, password)`.
///
/// Presence is all that is checked for the password; the username is also
/// bounded because it is written into every token.
pub fn validate_credentials<'a>(
    username: Option<&'a str>,
    password: Option<&'a str>,
) -> AppResult<(&'a str, &'a str)> {
    let (Some(username), Some(password)) = (username, password) else {
        return Err(AppError::BadRequest(MISSING_CREDENTIALS_MESSAGE.to_string()));
    };
    if username.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(MISSING_CREDENTIALS_MESSAGE.to_string()));
    }

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Username cannot exceed {MAX_USERNAME_LENGTH} characters"
        )));
    }

    Ok((username, password))
}
