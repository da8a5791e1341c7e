//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// SHA256 over the source/target identity.
    ///
    /// Tuning knobs are left out so a progress file stays valid when only
    /// batch size or worker count change between runs.
    pub fn fingerprint(&self) -> String {
        let source_port = self.source.port.to_string();
        let target_port = self.target.port.to_string();

        let mut hasher = Sha256::new();
        for part in [
            self.source.host.as_str(),
            source_port.as_str(),
            self.source.database.as_str(),
            self.target.host.as_str(),
            target_port.as_str(),
            self.target.database.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
source:
  host: mysql.internal
  database: shop
  user: exodus
  password: secret
target:
  host: mariadb.internal
  port: 3307
  database: shop
  user: exodus
  password: secret
migration:
  transaction_size: 500
  retry_on_errors: false
  on_batch_failure: abort
  workers: 4
"#;

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.target.port, 3307);
        assert_eq!(config.migration.transaction_size, 500);
        assert_eq!(config.migration.batch_recalc_interval, 10);
        assert!(!config.migration.retry_on_errors);
        assert_eq!(config.migration.on_batch_failure, BatchFailurePolicy::Abort);
        assert!(config.migration.migrate_data);
        assert!(!config.migration.dry_run);
        assert_eq!(config.migration.get_workers(), 4);
        assert!(config.migration.is_multi_threaded());
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = YAML.replace("transaction_size: 500", "transaction_size: 0");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_fingerprint_ignores_tuning() {
        let a = Config::from_yaml(YAML).unwrap();
        let mut b = a.clone();
        b.migration.transaction_size = 42;
        b.migration.workers = Some(1);
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.target.database = "shop_copy".into();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_dry_run_moves_no_data() {
        let mut config = Config::from_yaml(YAML).unwrap();
        assert!(config.migration.moves_data());
        config.migration.dry_run = true;
        assert!(!config.migration.moves_data());
        config.migration.dry_run = false;
        config.migration.migrate_data = false;
        assert!(!config.migration.moves_data());
    }

    #[test]
    fn test_auto_tuning_keeps_explicit_workers() {
        let resources = SystemResources {
            total_memory_gb: 16.0,
            cpu_cores: 12,
        };
        let tuned = MigrationConfig {
            workers: Some(3),
            ..MigrationConfig::default()
        }
        .with_auto_tuning(&resources);
        assert_eq!(tuned.get_workers(), 3);

        let tuned = MigrationConfig::default().with_auto_tuning(&resources);
        assert_eq!(tuned.get_workers(), 10);
    }
}
