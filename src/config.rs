use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};

/// ledger configuration
///
/// Bounds for the retry loops in the account manager and the receipt id
/// generator, plus the receipt id prefix. Validated once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// prefix on every receipt id, e.g. "RCP"
    pub receipt_prefix: String,
    /// candidate regenerations before IdGenerationExhausted
    pub max_id_attempts: u32,
    /// try_lock attempts against a busy account before giving up
    pub max_lock_attempts: u32,
    /// sleep between lock attempts
    pub lock_retry_delay_ms: u64,
}

impl LedgerConfig {
    /// standard configuration
    pub fn standard() -> Self {
        Self {
            receipt_prefix: "RCP".to_string(),
            max_id_attempts: 5,
            max_lock_attempts: 50,
            lock_retry_delay_ms: 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.receipt_prefix.is_empty() {
            return Err(LedgerError::InvalidConfiguration {
                message: "receipt_prefix must not be empty".to_string(),
            });
        }

        if self.max_id_attempts == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "max_id_attempts must be at least 1".to_string(),
            });
        }

        if self.max_lock_attempts == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "max_lock_attempts must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_config_is_valid() {
        assert!(LedgerConfig::standard().validate().is_ok());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let config = LedgerConfig {
            receipt_prefix: String::new(),
            ..LedgerConfig::standard()
        };
        assert!(matches!(
            config.validate(),
            Err(LedgerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_zero_retry_bounds_rejected() {
        let config = LedgerConfig {
            max_id_attempts: 0,
            ..LedgerConfig::standard()
        };
        assert!(config.validate().is_err());

        let config = LedgerConfig {
            max_lock_attempts: 0,
            ..LedgerConfig::standard()
        };
        assert!(config.validate().is_err());
    }
}
