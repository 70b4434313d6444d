//! Supported execution languages.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Language the remote side compiles or interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// C++ source, compiled remotely.
    Cpp,
    /// Python source.
    Python,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Self; 2] = [Self::Cpp, Self::Python];

    /// Identifier sent in the handshake.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown language identifier.
#[derive(Debug, Clone, Error)]
#[error("Unsupported language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" => Ok(Self::Cpp),
            "python" | "py" => Ok(Self::Python),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}
