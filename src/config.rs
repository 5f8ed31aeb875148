//! Machine configuration.
//!
//! A configuration fixes the memory size, the initial program counter and
//! how much step history the CLI keeps. It can be read from a JSON file:
//!
//! ```json
//! { "memory_bytes": 32768, "start_address": 0, "history_capacity": 16 }
//! ```
//!
//! Missing fields take their defaults.

use std::path::Path;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cpu::memory::DEFAULT_MEMORY_BYTES;

/// Machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Memory size in bytes, rounded up to whole words.
    pub memory_bytes: usize,
    /// Initial program counter.
    pub start_address: u32,
    /// Number of step records kept by the history log.
    pub history_capacity: usize,
}

impl MachineConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: MachineConfig = serde_json::from_str(text)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values describe a usable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_bytes == 0 {
            return Err(ConfigError::EmptyMemory);
        }
        if self.start_address as usize >= self.memory_bytes {
            return Err(ConfigError::StartOutOfRange {
                start: self.start_address,
                memory_bytes: self.memory_bytes,
            });
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_bytes: DEFAULT_MEMORY_BYTES,
            start_address: 0,
            history_capacity: 64,
        }
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("memory size must be non-zero")]
    EmptyMemory,

    #[error("start address {start:#X} outside memory of {memory_bytes} bytes")]
    StartOutOfRange { start: u32, memory_bytes: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{Cpu, RegisterName};

    #[test]
    fn test_defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.memory_bytes, 1 << 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = MachineConfig::from_json_str(r#"{ "memory_bytes": 300, "start_address": 3 }"#).unwrap();
        assert_eq!(config.memory_bytes, 300);
        assert_eq!(config.start_address, 3);
        assert_eq!(config.history_capacity, 64);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(
            MachineConfig::from_json_str(r#"{ "memory_bytes": 0 }"#),
            Err(ConfigError::EmptyMemory)
        );
        assert!(matches!(
            MachineConfig::from_json_str(r#"{ "memory_bytes": 30, "start_address": 30 }"#),
            Err(ConfigError::StartOutOfRange { .. })
        ));
        assert!(matches!(
            MachineConfig::from_json_str(r#"{ "memory": 30 }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_cpu_with_config() {
        let config = MachineConfig { memory_bytes: 100, start_address: 9, history_capacity: 0 };
        let cpu = Cpu::with_config(&config).unwrap();
        assert_eq!(cpu.mem.size_bytes(), 102);
        assert_eq!(cpu.register(RegisterName::PC), 9);
    }
}
