//! Recording behaviour.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// What to do with a performance record at the end of a capture scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Compare against an existing record, create it when missing.
    #[default]
    Once,
    /// Never create records; a missing record is a failure.
    None,
    /// Compare when present; create and still fail when missing.
    All,
    /// Always replace the stored record without comparing.
    Overwrite,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::None => "none",
            Self::All => "all",
            Self::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Self::Once),
            "none" => Ok(Self::None),
            "all" => Ok(Self::All),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(ConfigError::InvalidValue {
                field: "recording.mode".to_string(),
                reason: format!("expected one of once, none, all, overwrite; got '{other}'"),
            }),
        }
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// Record creation and comparison policy.
    #[serde(default)]
    pub mode: Mode,

    /// Collapse SQL column and value lists to `...` in fingerprints.
    #[serde(default = "default_true")]
    pub hide_columns: bool,

    /// Embed a line diff in mismatch errors. Turned off when the test runner
    /// renders record diffs itself.
    #[serde(default = "default_true")]
    pub show_diff: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            hide_columns: true,
            show_diff: true,
        }
    }
}
