//! Logical resource identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_LEN: usize = 255;

/// The key of a resource inside a template.
/// Only ASCII alphanumerics are allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Derive a logical ID from a free-form construct id by dropping every
    /// character that is not ASCII alphanumeric.
    pub fn from_construct_id(construct_id: &str) -> Result<Self> {
        let cleaned: String = construct_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        Self::validate(&cleaned).map_err(|_| {
            Error::InvalidInput(format!(
                "construct id '{construct_id}' does not yield a valid logical id"
            ))
        })?;
        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<()> {
        if s.is_empty() {
            return Err(Error::InvalidInput("logical id is empty".to_string()));
        }
        if s.len() > MAX_LEN {
            return Err(Error::InvalidInput(format!(
                "logical id '{s}' exceeds {MAX_LEN} characters"
            )));
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(format!(
                "logical id '{s}' contains invalid character '{c}'"
            )));
        }
        Ok(())
    }
}

impl std::str::FromStr for LogicalId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::validate(s)?;
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
