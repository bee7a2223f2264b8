//! Caller-owned automatic backups
//!
//! Nothing here runs on its own. The owner of an [`AutoBackup`] decides
//! when to ask whether a backup is due and runs it on its own thread.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BackupError, BackupPhase};

use super::manager::{BackupEngine, BackupSummary};
use super::naming;
use super::retention;

/// Daily or weekly/monthly time slot for automatic backups (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSchedule {
    pub hour: u32,
    pub minute: u32,
    /// 0 = Sunday through 6 = Saturday
    #[serde(default)]
    pub day_of_week: Option<u32>,
    /// 1 through 31
    #[serde(default)]
    pub day_of_month: Option<u32>,
}

impl BackupSchedule {
    /// Every day at `hour:minute`
    pub fn daily(hour: u32, minute: u32) -> Self {
        Self {
            hour,
            minute,
            day_of_week: None,
            day_of_month: None,
        }
    }

    pub fn validate(&self) -> Result<(), BackupError> {
        let valid = self.hour < 24
            && self.minute < 60
            && self.day_of_week.map_or(true, |d| d < 7)
            && self.day_of_month.map_or(true, |d| (1..=31).contains(&d));
        if valid {
            Ok(())
        } else {
            Err(BackupError::InvalidParameters(format!(
                "invalid schedule {:?}",
                self
            )))
        }
    }

    /// Latest scheduled instant at or before `now`
    ///
    /// Looks back at most 62 days, which covers any monthly slot that
    /// exists in the calendar.
    pub fn last_slot(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;

        (0..=62).find_map(|days_back| {
            let date = now.date_naive() - Duration::days(days_back);
            let weekday_ok = self
                .day_of_week
                .map_or(true, |d| date.weekday().num_days_from_sunday() == d);
            let monthday_ok = self.day_of_month.map_or(true, |d| date.day() == d);
            if !weekday_ok || !monthday_ok {
                return None;
            }
            let slot = date.and_time(time).and_utc();
            (slot <= now).then_some(slot)
        })
    }
}

fn default_interval_hours() -> u32 {
    24
}

fn default_max_backups() -> usize {
    7
}

fn default_name() -> String {
    "auto".to_string()
}

/// Configuration of automatic backups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBackupConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Minimum hours between backups when no schedule is set
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,

    /// Backups of `name` kept after each automatic run
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    #[serde(default)]
    pub compress: bool,

    #[serde(default)]
    pub encrypt: bool,

    /// Logical backup name
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory to back up
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Fixed time slot; overrides `interval_hours` when set
    #[serde(default)]
    pub schedule: Option<BackupSchedule>,
}

impl Default for AutoBackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            max_backups: default_max_backups(),
            compress: false,
            encrypt: false,
            name: default_name(),
            source_dir: None,
            schedule: None,
        }
    }
}

/// Handle owning the state of automatic backups
#[derive(Debug, Clone)]
pub struct AutoBackup {
    config: AutoBackupConfig,
    last_backup: Option<DateTime<Utc>>,
}

impl AutoBackup {
    pub fn new(config: AutoBackupConfig) -> Self {
        Self {
            config,
            last_backup: None,
        }
    }

    /// Create a handle whose last run is taken from the newest existing backup
    pub fn resume(config: AutoBackupConfig, backup_dir: &Path) -> Result<Self, BackupError> {
        let latest = naming::find_latest(backup_dir, &config.name)
            .map_err(|e| BackupError::copy(BackupPhase::Locate, backup_dir, e))?;
        Ok(Self {
            config,
            last_backup: latest.map(|entry| entry.id.timestamp_utc()),
        })
    }

    pub fn config(&self) -> &AutoBackupConfig {
        &self.config
    }

    pub fn last_backup(&self) -> Option<DateTime<Utc>> {
        self.last_backup
    }

    /// Whether an automatic backup should run at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return false;
        }

        match (&self.config.schedule, self.last_backup) {
            (Some(schedule), last) => match schedule.last_slot(now) {
                Some(slot) => last.map_or(true, |last| last < slot),
                None => false,
            },
            (None, None) => true,
            (None, Some(last)) => {
                now - last >= Duration::hours(i64::from(self.config.interval_hours))
            }
        }
    }

    /// Run a full backup if one is due, then prune old automatic backups
    ///
    /// `engine` must carry the key when the configuration asks for
    /// encryption.
    pub fn run_if_due(
        &mut self,
        now: DateTime<Utc>,
        engine: &BackupEngine,
    ) -> Result<Option<BackupSummary>, BackupError> {
        if !self.is_due(now) {
            return Ok(None);
        }
        let source_dir = self.config.source_dir.as_deref().ok_or_else(|| {
            BackupError::InvalidParameters("automatic backup has no source directory".to_string())
        })?;
        if self.config.encrypt && !engine.options().is_encrypted() {
            return Err(BackupError::Encrypt {
                path: source_dir.to_path_buf(),
                message: "encryption requested but no key is loaded".to_string(),
            });
        }

        let summary = engine.full_backup(&self.config.name, source_dir)?;
        self.last_backup = Some(now);

        if self.config.max_backups > 0 {
            let pruned =
                retention::prune_to(engine.backup_dir(), &self.config.name, self.config.max_backups)?;
            if !pruned.is_empty() {
                tracing::info!(count = pruned.len(), "Pruned old automatic backups");
            }
        }

        Ok(Some(summary))
    }
}
