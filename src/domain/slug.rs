//! Slug derivation and validation for posts and tags.

use slug::slugify;
use thiserror::Error;

const MAX_SLUG_LENGTH: usize = 250;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("`{value}` is not a valid slug")]
    Invalid { value: String },
}

/// Derive a URL slug from human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    if candidate.len() > MAX_SLUG_LENGTH {
        candidate.truncate(MAX_SLUG_LENGTH);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    Ok(candidate)
}

/// A slug is lowercase ASCII letters, digits, `-` and `_`, not starting or
/// ending with a separator.
pub fn is_valid_slug(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_SLUG_LENGTH
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        && !value.starts_with(['-', '_'])
        && !value.ends_with(['-', '_'])
}

/// Accept an explicit slug when valid, otherwise derive one from `fallback`.
pub fn resolve_slug(explicit: Option<&str>, fallback: &str) -> Result<String, SlugError> {
    match explicit.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) if is_valid_slug(value) => Ok(value.to_string()),
        Some(value) => Err(SlugError::Invalid {
            value: value.to_string(),
        }),
        None => derive_slug(fallback),
    }
}
