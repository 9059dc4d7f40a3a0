//! User profile model.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

/// Profile document stored in the `users` collection, one per identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Document ID (not the identity key; profiles are looked up by email)
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    /// Email address, the identity key
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Profile picture reference (URI)
    #[serde(default)]
    pub photo_ref: Option<String>,
}

/// Owner-submitted profile edit.
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(
        custom(function = name_not_blank),
        length(max = 100, message = "Name is too long")
    )]
    pub name: String,
    #[validate(length(max = 32, message = "Phone number is too long"))]
    pub phone: String,
    pub photo_ref: String,
}

impl ProfileUpdate {
    /// The edit with surrounding whitespace removed from every field.
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            photo_ref: self.photo_ref.trim().to_string(),
        }
    }
}

fn name_not_blank(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("blank")
            .with_message(Cow::Borrowed("Name must not be empty")));
    }
    Ok(())
}
