//! Shared core types used across configuration, resolution and rendering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identity of an addon instance within a project: `category.instance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceRef {
    category: String,
    instance: String,
}

impl InstanceRef {
    pub fn new(category: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            instance: instance.into(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Instance name in environment-variable form (`read-replica` -> `READ_REPLICA`).
    pub fn env_instance(&self) -> String {
        env_token(&self.instance)
    }

    /// Category name in environment-variable form.
    pub fn env_category(&self) -> String {
        env_token(&self.category)
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.instance)
    }
}

impl FromStr for InstanceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, instance) = s
            .split_once('.')
            .ok_or_else(|| Error::validation(format!("'{}' is not of the form category.instance", s)))?;
        if category.is_empty() || instance.is_empty() || instance.contains('.') {
            return Err(Error::validation(format!(
                "'{}' is not of the form category.instance",
                s
            )));
        }
        Ok(Self::new(category, instance))
    }
}

impl TryFrom<String> for InstanceRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstanceRef> for String {
    fn from(value: InstanceRef) -> Self {
        value.to_string()
    }
}

/// Access mode of an application attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Readwrite,
    Readonly,
}

/// Upper-case a name and replace characters that are invalid in env var names.
pub fn env_token(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
