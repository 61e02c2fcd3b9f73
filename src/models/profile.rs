use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Identity data typed into the portal. Loaded once and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserProfile {
    #[validate(length(min = 1, message = "passport_number is required"))]
    pub passport_number: String,

    #[validate(length(min = 1, message = "full_name is required"))]
    pub full_name: String,

    #[validate(length(equal = 4, message = "birth_year must have four digits"))]
    pub birth_year: String,

    #[validate(length(min = 1, message = "nationality is required"))]
    pub nationality: String,

    #[validate(email(message = "email is not a valid address"))]
    pub email: String,

    #[validate(length(min = 6, message = "phone is too short"))]
    pub phone: String,
}

impl UserProfile {
    /// Full validation, including the parts the derive cannot express.
    pub fn check(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        if !self.birth_year.chars().all(|c| c.is_ascii_digit()) {
            let mut errors = validator::ValidationErrors::new();
            let mut error = validator::ValidationError::new("digits");
            error.message = Some("birth_year must be numeric".into());
            errors.add("birth_year", error);
            return Err(errors);
        }
        Ok(())
    }
}

/// A monitored province, by the display name the portal lists it under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Province(String);

impl Province {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Province {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Province {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
