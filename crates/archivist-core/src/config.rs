//! Configuration (TOML).
//!
//! Every field has a default, so an empty file (or none at all) is a valid
//! configuration. An empty `[[schedule]]` list means the built-in cadences.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::app::scheduler::{SeedEntry, SeedSchedule};
use crate::app::worker_pool::WorkerBudget;
use crate::domain::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_immediate_workers")]
    pub immediate: usize,

    #[serde(default = "default_routine_workers")]
    pub routine: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivistConfig {
    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Freshness window of "page confirmed empty" markers.
    #[serde(default = "default_recency_ttl_minutes")]
    pub recency_ttl_minutes: u64,

    /// Lifetime of a dedup token (expected lifetime of a queued job).
    #[serde(default = "default_dedup_ttl_minutes")]
    pub dedup_ttl_minutes: u64,

    #[serde(default)]
    pub schedule: Vec<SeedEntry>,
}

fn default_immediate_workers() -> usize {
    4
}
fn default_routine_workers() -> usize {
    2
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    300_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_recency_ttl_minutes() -> u64 {
    10
}
fn default_dedup_ttl_minutes() -> u64 {
    60
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            immediate: default_immediate_workers(),
            routine: default_routine_workers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ArchivistConfig {
    fn default() -> Self {
        Self {
            workers: WorkersConfig::default(),
            retry: RetryConfig::default(),
            recency_ttl_minutes: default_recency_ttl_minutes(),
            dedup_ttl_minutes: default_dedup_ttl_minutes(),
            schedule: Vec::new(),
        }
    }
}

impl ArchivistConfig {
    /// Read, parse and validate a config file.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml_str(&content)?;
        info!(
            path = %path.display(),
            immediate_workers = config.workers.immediate,
            routine_workers = config.workers.routine,
            schedule_entries = config.schedule.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ArchivistConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // 片方のレーンでも 0 だと、そのレーンに積まれた仕事は二度と動かない
        for (lane, workers) in [
            ("immediate", self.workers.immediate),
            ("routine", self.workers.routine),
        ] {
            if workers == 0 {
                return Err(ConfigError::Invalid(format!(
                    "workers.{lane} must be >= 1"
                )));
            }
        }
        if self.workers.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "workers.poll_interval_ms must be >= 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if let Some(entry) = self.schedule.iter().find(|e| e.cron.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "schedule entry '{}' has an empty cron expression",
                entry.name
            )));
        }
        SeedSchedule::new(self.schedule.clone())
            .check_names()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn worker_budget(&self) -> WorkerBudget {
        WorkerBudget {
            immediate: self.workers.immediate,
            routine: self.workers.routine,
            poll_interval: Duration::from_millis(self.workers.poll_interval_ms),
        }
    }

    pub fn recency_ttl(&self) -> Duration {
        Duration::from_secs(self.recency_ttl_minutes * 60)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_minutes * 60)
    }

    /// Configured cadences, or the built-in ones when none are configured.
    pub fn schedule(&self) -> SeedSchedule {
        if self.schedule.is_empty() {
            SeedSchedule::defaults()
        } else {
            SeedSchedule::new(self.schedule.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, Lane};
    use rstest::rstest;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = ArchivistConfig::from_toml_str("").unwrap();
        assert_eq!(config, ArchivistConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.worker_budget(), WorkerBudget::default());
        assert_eq!(config.recency_ttl(), Duration::from_secs(600));
        assert_eq!(config.dedup_ttl(), Duration::from_secs(3600));
        assert_eq!(config.schedule(), SeedSchedule::defaults());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = ArchivistConfig::from_toml_str(
            r#"
            recency_ttl_minutes = 3

            [workers]
            routine = 8

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.workers.immediate, 4);
        assert_eq!(config.workers.routine, 8);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.recency_ttl(), Duration::from_secs(180));
    }

    #[test]
    fn schedule_entries_replace_defaults() {
        let config = ArchivistConfig::from_toml_str(
            r#"
            [[schedule]]
            name = "front-page"
            cron = "0 * * * * *"
            lane = "immediate"
            job = { kind = "list_discussions", page = 1 }

            [[schedule]]
            name = "modlog"
            cron = "30 */2 * * * *"
            lane = "routine"
            job = { kind = "crawl_judgement" }
            "#,
        )
        .unwrap();

        let schedule = config.schedule();
        assert_eq!(schedule.len(), 2);
        assert_eq!(
            schedule.entries[0].job,
            Job::ListDiscussions {
                forum: None,
                page: Some(1)
            }
        );
        assert_eq!(schedule.entries[1].lane, Lane::Routine);
        assert_eq!(schedule.entries[1].job, Job::CrawlJudgement);
    }

    #[rstest]
    #[case::no_immediate_workers("[workers]\nimmediate = 0\n", "workers.immediate")]
    #[case::no_routine_workers("[workers]\nroutine = 0\n", "workers.routine")]
    #[case::busy_polling("[workers]\npoll_interval_ms = 0\n", "workers.poll_interval_ms")]
    fn rejects_worker_settings_that_stall_a_lane(#[case] toml: &str, #[case] field: &str) {
        let err = ArchivistConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(&err, ConfigError::Invalid(msg) if msg.contains(field)), "{err}");
    }

    #[test]
    fn rejects_unusable_retry_settings() {
        assert!(matches!(
            ArchivistConfig::from_toml_str("[retry]\nmax_attempts = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ArchivistConfig::from_toml_str("[retry]\nmultiplier = 0.5\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_empty_cron_and_duplicate_names() {
        let empty_cron = r#"
            [[schedule]]
            name = "a"
            cron = " "
            lane = "immediate"
            job = { kind = "crawl_judgement" }
        "#;
        assert!(matches!(
            ArchivistConfig::from_toml_str(empty_cron),
            Err(ConfigError::Invalid(_))
        ));

        let duplicated = r#"
            [[schedule]]
            name = "a"
            cron = "0 * * * * *"
            lane = "immediate"
            job = { kind = "crawl_judgement" }

            [[schedule]]
            name = "a"
            cron = "0 */5 * * * *"
            lane = "routine"
            job = { kind = "crawl_judgement" }
        "#;
        assert!(matches!(
            ArchivistConfig::from_toml_str(duplicated),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            ArchivistConfig::from_toml_str("workers = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = ArchivistConfig::load("/nonexistent/archivist.toml")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("archivist.toml")));
    }
}
