use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::error::{PoolError, PoolResult};

/// Default number of pages cached by a buffer pool
pub const DEFAULT_PAGES: usize = 50;

/// Default lock wait before a transaction's page request is abandoned
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 1000;

/// Buffer pool settings.
///
/// Loadable from JSON; missing fields take their defaults, e.g.
/// `{"capacity": 200}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of pages held in the cache
    pub capacity: usize,
    /// How long `get_page` may wait for a page lock
    pub lock_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PAGES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl PoolConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PoolResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PoolError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PoolError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "capacity must be at least one page".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.capacity, DEFAULT_PAGES);
        assert_eq!(config.lock_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{"capacity": 7}"#).unwrap();
        assert_eq!(config.capacity, 7);
        assert_eq!(config.lock_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS);
    }

    #[test]
    fn test_from_file_validates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pool.json");

        fs::write(&path, r#"{"capacity": 0}"#).unwrap();
        assert!(matches!(
            PoolConfig::from_file(&path),
            Err(PoolError::InvalidConfig(_))
        ));

        fs::write(&path, r#"{"capacity": 3, "lock_timeout_ms": 20}"#).unwrap();
        let config = PoolConfig::from_file(&path).unwrap();
        assert_eq!(config.capacity, 3);
        assert_eq!(config.lock_timeout(), Duration::from_millis(20));
    }

    #[test]
    fn test_missing_file() {
        let result = PoolConfig::from_file("/nonexistent/pool.json");
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }
}
