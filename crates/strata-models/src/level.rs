//! Abstraction levels for stored memories.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Granularity of a memory, ordered finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Level {
    /// A single function or method signature
    FunctionSignature,
    /// A contiguous part of a file (class, block)
    FileSection,
    /// A whole file
    File,
    /// A module or package
    Module,
    /// The whole project
    Project,
}

impl Level {
    /// Number of levels.
    pub const COUNT: usize = 5;

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::FunctionSignature => "function_signature",
            Level::FileSection => "file_section",
            Level::File => "file",
            Level::Module => "module",
            Level::Project => "project",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "function_signature" => Some(Level::FunctionSignature),
            "file_section" => Some(Level::FileSection),
            "file" => Some(Level::File),
            "module" => Some(Level::Module),
            "project" => Some(Level::Project),
            _ => None,
        }
    }

    /// All levels, finest first.
    pub fn all() -> &'static [Level] {
        &[
            Level::FunctionSignature,
            Level::FileSection,
            Level::File,
            Level::Module,
            Level::Project,
        ]
    }

    /// Position in the finest-to-coarsest ordering.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Comma-separated list used in validation messages.
    pub fn allowed_values() -> String {
        Self::all()
            .iter()
            .map(Level::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl TryFrom<String> for Level {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Level::from_str(&value).ok_or(ValidationError::InvalidLevel(value))
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
