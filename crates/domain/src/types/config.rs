//! Application configuration types
//!
//! Loaded by the infra config loader from environment variables or a
//! TOML/JSON file; see `umbono-infra::config`.

use serde::{Deserialize, Serialize};

use crate::types::sharing::{Partner, ProcessingAction};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sharing: SharingJobConfig,
    #[serde(default)]
    pub partners: Vec<PartnerSettings>,
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

/// Settings for the partner sharing background job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharingJobConfig {
    /// 6-field cron expression for the recurring trigger.
    pub schedule: String,
    /// Maximum rows fetched per batch inside one reconciliation pass.
    pub batch_size: usize,
    /// Wall-clock window for a single pass; bounds worst-case run length so
    /// a recurring invocation cannot overlap with itself indefinitely.
    pub max_interval_hours: u32,
    /// Added to the pass window when computing the lock lease, so a crashed
    /// holder's lock expires rather than deadlocking the job.
    pub lock_buffer_minutes: u32,
    /// Retry budget for failed rows; 0 retries forever.
    pub max_retry_attempts: u32,
}

impl Default for SharingJobConfig {
    fn default() -> Self {
        Self {
            schedule: "0 */10 * * * *".into(), // every 10 minutes
            batch_size: 1000,
            max_interval_hours: 2,
            lock_buffer_minutes: 5,
            max_retry_attempts: 10,
        }
    }
}

/// Per-partner integration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartnerSettings {
    pub partner: Partner,
    pub active: bool,
    #[serde(default = "default_true")]
    pub create_enabled: bool,
    #[serde(default = "default_true")]
    pub update_enabled: bool,
    #[serde(default = "default_true")]
    pub delete_enabled: bool,
}

impl PartnerSettings {
    /// Whether the given lifecycle action is enabled for this partner.
    pub fn action_enabled(&self, action: ProcessingAction) -> bool {
        match action {
            ProcessingAction::Create => self.create_enabled,
            ProcessingAction::Update => self.update_enabled,
            ProcessingAction::Delete => self.delete_enabled,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharing_job_defaults_are_sane() {
        let config = SharingJobConfig::default();

        assert!(config.batch_size > 0);
        assert!(config.max_interval_hours > 0);
        assert!(config.lock_buffer_minutes > 0);
    }

    #[test]
    fn partner_settings_action_toggles() {
        let settings = PartnerSettings {
            partner: Partner::SaYouth,
            active: true,
            create_enabled: true,
            update_enabled: false,
            delete_enabled: true,
        };

        assert!(settings.action_enabled(ProcessingAction::Create));
        assert!(!settings.action_enabled(ProcessingAction::Update));
        assert!(settings.action_enabled(ProcessingAction::Delete));
    }

    #[test]
    fn partner_settings_action_toggles_default_to_enabled() {
        let toml = r#"
            partner = "sayouth"
            active = true
        "#;
        let settings: PartnerSettings = toml::from_str(toml).unwrap();

        assert!(settings.action_enabled(ProcessingAction::Create));
        assert!(settings.action_enabled(ProcessingAction::Update));
        assert!(settings.action_enabled(ProcessingAction::Delete));
    }
}
