//! Result type alias for Tidewater

use super::errors::TidewaterError;

/// Result type alias for Tidewater operations
///
/// # Examples
///
/// ```
/// use tidewater::domain::result::Result;
/// use tidewater::domain::errors::TidewaterError;
///
/// fn lookup() -> Result<String> {
///     Err(TidewaterError::NotFound("export".to_string()))
/// }
///
/// assert!(lookup().is_err());
/// ```
pub type Result<T> = std::result::Result<T, TidewaterError>;
