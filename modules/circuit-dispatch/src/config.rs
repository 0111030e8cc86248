use std::env;

use crate::error::{DispatchError, Result};

/// Capacity of the pending-action queue when nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

const QUEUE_CAPACITY_VAR: &str = "CIRCUIT_QUEUE_CAPACITY";

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum number of actions buffered while the dispatcher is busy.
    /// Actions arriving beyond this bound are dropped.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let queue_capacity = match env::var(QUEUE_CAPACITY_VAR) {
            Ok(raw) => parse_capacity(&raw)?,
            Err(_) => DEFAULT_QUEUE_CAPACITY,
        };
        Ok(Self { queue_capacity })
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

fn parse_capacity(raw: &str) -> Result<usize> {
    let capacity: usize = raw.trim().parse().map_err(|_| {
        DispatchError::Config(format!("{QUEUE_CAPACITY_VAR} must be a number, got {raw:?}"))
    })?;
    if capacity == 0 {
        return Err(DispatchError::Config(format!(
            "{QUEUE_CAPACITY_VAR} must be greater than zero"
        )));
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_fifty() {
        assert_eq!(DispatcherConfig::default().queue_capacity, 50);
    }

    #[test]
    fn parses_capacity_with_whitespace() {
        assert_eq!(parse_capacity(" 12 ").unwrap(), 12);
    }

    #[test]
    fn rejects_non_numeric_capacity() {
        let err = parse_capacity("lots").unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = parse_capacity("0").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
