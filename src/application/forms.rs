//! Reader-submitted forms and their validation.
//!
//! Forms are deserialized leniently (every field defaults to empty) so that
//! missing fields surface as field errors on the re-rendered page instead of
//! as extractor rejections.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_COMMENT_NAME: usize = 80;
const MAX_COMMENT_BODY: usize = 5000;
const MAX_SHARE_NAME: usize = 25;
const MAX_SHARE_COMMENTS: usize = 2000;
const MAX_SEARCH_QUERY: usize = 200;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("compile email regex")
});

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= MAX_EMAIL_LENGTH && EMAIL_REGEX.is_match(value)
}

/// Validation messages keyed by field name, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    entries: Vec<(&'static str, Vec<String>)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        let message = message.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, messages)) => messages.push(message),
            None => self.entries.push((field, vec![message])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Field name used for errors that are not tied to a single input.
pub const FORM_ERROR_FIELD: &str = "__all__";

fn required(errors: &mut FieldErrors, field: &'static str, value: &str, max: usize) {
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if value.chars().count() > max {
        errors.add(
            field,
            format!("Ensure this value has at most {max} characters."),
        );
    }
}

fn email(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if !is_valid_email(value) {
        errors.add(field, "Enter a valid email address.");
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommentForm {
    pub name: String,
    pub email: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub name: String,
    pub email: String,
    pub body: String,
}

impl CommentForm {
    /// Trim every field in place so re-rendered forms show what was validated.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            body: self.body.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<NewComment, FieldErrors> {
        let form = self.clone().normalized();
        let mut errors = FieldErrors::new();
        required(&mut errors, "name", &form.name, MAX_COMMENT_NAME);
        email(&mut errors, "email", &form.email);
        required(&mut errors, "body", &form.body, MAX_COMMENT_BODY);
        errors.into_result(NewComment {
            name: form.name,
            email: form.email,
            body: form.body,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShareForm {
    pub name: String,
    pub email: String,
    pub to: String,
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub name: String,
    pub email: String,
    pub to: String,
    pub comments: String,
}

impl ShareForm {
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            to: self.to.trim().to_string(),
            comments: self.comments.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<ShareRequest, FieldErrors> {
        let form = self.clone().normalized();
        let mut errors = FieldErrors::new();
        required(&mut errors, "name", &form.name, MAX_SHARE_NAME);
        email(&mut errors, "email", &form.email);
        email(&mut errors, "to", &form.to);
        if form.comments.chars().count() > MAX_SHARE_COMMENTS {
            errors.add(
                "comments",
                format!("Ensure this value has at most {MAX_SHARE_COMMENTS} characters."),
            );
        }
        errors.into_result(ShareRequest {
            name: form.name,
            email: form.email,
            to: form.to,
            comments: form.comments,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SearchForm {
    pub query: Option<String>,
}

impl SearchForm {
    /// `Ok(None)` when no query was submitted at all.
    pub fn validate(&self) -> Result<Option<String>, FieldErrors> {
        let Some(raw) = self.query.as_deref() else {
            return Ok(None);
        };
        let query = raw.trim();
        let mut errors = FieldErrors::new();
        required(&mut errors, "query", query, MAX_SEARCH_QUERY);
        errors.into_result(Some(query.to_string()))
    }
}
