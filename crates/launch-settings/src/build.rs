//! Inputs from the build system.

use crate::Result;
use async_trait::async_trait;

/// A named run command reported by the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub name: String,
    pub command_line: String,
}

impl BuildCommand {
    pub fn new(name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
        }
    }
}

/// One evaluation of the project as seen by the build system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMetadata {
    pub commands: Vec<BuildCommand>,
    /// Value of the active-profile property, if set.
    pub active_profile: Option<String>,
}

impl BuildMetadata {
    /// The active profile property, ignoring blank values.
    #[must_use]
    pub fn active_profile(&self) -> Option<&str> {
        self.active_profile
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

/// Receives active-profile selections so the build system can remember them.
#[async_trait]
pub trait ActiveProfileSink: Send + Sync {
    async fn set_active_profile(&self, name: &str) -> Result<()>;
}
