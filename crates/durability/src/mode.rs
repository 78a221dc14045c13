//! Durability modes for the decision log

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How hard the decision log tries to survive a crash
///
/// | Mode | File | Survives process crash | Survives power loss |
/// |------|------|------------------------|---------------------|
/// | None | no | no | no |
/// | Buffered | yes, flushed per record | yes | no |
/// | Strict | yes, fsync per record | yes | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// Decisions live in memory only.
    ///
    /// Undelivered decisions can still be re-sent while the process lives.
    /// Use case: tests, benchmarks, deployments where participants time out
    /// in-doubt transactions themselves.
    None,

    /// Every record is written to the OS before the call returns.
    #[default]
    Buffered,

    /// Every record is fsynced before the call returns.
    ///
    /// Expect milliseconds per commit.
    Strict,
}

impl DurabilityMode {
    /// Check if this mode writes a file
    pub fn requires_file(&self) -> bool {
        !matches!(self, DurabilityMode::None)
    }

    /// Check if every record is fsynced
    pub fn requires_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Strict)
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DurabilityMode::None => "none",
            DurabilityMode::Buffered => "buffered",
            DurabilityMode::Strict => "strict",
        };
        f.write_str(name)
    }
}

impl FromStr for DurabilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(DurabilityMode::None),
            "buffered" => Ok(DurabilityMode::Buffered),
            "strict" => Ok(DurabilityMode::Strict),
            other => Err(format!("unknown durability mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags() {
        assert!(!DurabilityMode::None.requires_file());
        assert!(DurabilityMode::Buffered.requires_file());
        assert!(!DurabilityMode::Buffered.requires_fsync());
        assert!(DurabilityMode::Strict.requires_fsync());
    }

    #[test]
    fn test_default_is_buffered() {
        assert_eq!(DurabilityMode::default(), DurabilityMode::Buffered);
    }

    #[test]
    fn test_parse_and_display() {
        for mode in [
            DurabilityMode::None,
            DurabilityMode::Buffered,
            DurabilityMode::Strict,
        ] {
            assert_eq!(mode.to_string().parse::<DurabilityMode>().unwrap(), mode);
        }
        assert_eq!("STRICT".parse::<DurabilityMode>().unwrap(), DurabilityMode::Strict);
        assert!("eventually".parse::<DurabilityMode>().is_err());
    }
}
