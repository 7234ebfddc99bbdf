//! Project identifiers.
//!
//! A project is the tenant boundary of the delivery control plane. Every
//! insight document except the global milestone lives under the project's
//! prefix, so the identifier doubles as a path segment and is validated
//! accordingly.
//!
//! # Example
//!
//! ```rust
//! use insight_core::project::ProjectId;
//!
//! let project = ProjectId::new("acme-prod").unwrap();
//! assert_eq!(project.storage_prefix(), "insights/acme-prod/");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::paths::InsightPaths;

/// Maximum accepted project id length.
pub const MAX_PROJECT_ID_LEN: usize = 128;

/// A unique identifier for a project.
///
/// Project IDs must be:
/// - Non-empty and at most 128 characters
/// - ASCII letters, digits, `-`, `_` or `.`
/// - Not `.` or `..`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a new project ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the project ID is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Returns the storage prefix for this project.
    #[must_use]
    pub fn storage_prefix(&self) -> String {
        format!("{}/{}/", InsightPaths::PREFIX, self.0)
    }

    /// Returns the project ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidId {
                message: "project ID cannot be empty".to_string(),
            });
        }

        if id.len() > MAX_PROJECT_ID_LEN {
            return Err(Error::InvalidId {
                message: format!(
                    "project ID '{id}' is too long (maximum {MAX_PROJECT_ID_LEN} characters)"
                ),
            });
        }

        if id == "." || id == ".." {
            return Err(Error::InvalidId {
                message: format!("project ID '{id}' is reserved"),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::InvalidId {
                message: format!(
                    "project ID '{id}' contains invalid characters (allowed: letters, digits, '-', '_', '.')"
                ),
            });
        }

        Ok(())
    }
}

impl TryFrom<String> for ProjectId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ProjectId> for String {
    fn from(value: ProjectId) -> Self {
        value.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
