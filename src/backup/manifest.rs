//! `backup_info.txt` manifests
//!
//! A manifest is a plain-text list of `Key: value` lines written once, at
//! the end of a successful backup. Unknown keys are ignored when parsing so
//! older readers accept newer manifests.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ManifestError;
use crate::storage::atomic::write_atomic;

use super::naming::BackupKind;

/// File name of the manifest inside each backup directory
pub const MANIFEST_FILE: &str = "backup_info.txt";

const KEY_NAME: &str = "Backup Name";
const KEY_TYPE: &str = "Backup Type";
const KEY_PATH: &str = "Backup Path";
const KEY_CREATED: &str = "Created";
const KEY_SIZE: &str = "Size";
const KEY_FILE_COUNT: &str = "File Count";
const KEY_CHECKSUM: &str = "Checksum";
const KEY_COMPRESSED: &str = "Compressed";
const KEY_ENCRYPTED: &str = "Encrypted";
const KEY_BASED_ON: &str = "Based on backup from";

/// Metadata describing one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupManifest {
    pub name: String,
    pub kind: BackupKind,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
    /// Total plaintext bytes of the files in the backup
    pub size: u64,
    pub file_count: u64,
    /// Tree checksum of the plaintext content
    pub checksum: String,
    pub compressed: bool,
    pub encrypted: bool,
    /// Creation time of the baseline an incremental was taken against
    pub based_on: Option<DateTime<Utc>>,
}

impl BackupManifest {
    /// Render the manifest text
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", KEY_NAME, self.name);
        let _ = writeln!(out, "{}: {}", KEY_TYPE, self.kind.label());
        let _ = writeln!(out, "{}: {}", KEY_PATH, self.path.display());
        let _ = writeln!(out, "{}: {}", KEY_CREATED, format_time(&self.created));
        let _ = writeln!(out, "{}: {} bytes", KEY_SIZE, self.size);
        let _ = writeln!(out, "{}: {}", KEY_FILE_COUNT, self.file_count);
        let _ = writeln!(out, "{}: {}", KEY_CHECKSUM, self.checksum);
        let _ = writeln!(out, "{}: {}", KEY_COMPRESSED, yes_no(self.compressed));
        let _ = writeln!(out, "{}: {}", KEY_ENCRYPTED, yes_no(self.encrypted));
        if let Some(based_on) = &self.based_on {
            let _ = writeln!(out, "{}: {}", KEY_BASED_ON, format_time(based_on));
        }
        out
    }

    /// Parse manifest text
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let fields = parse_fields(text);

        let get = |key: &'static str| required(&fields, key);
        let invalid = |key: &'static str, value: &str| ManifestError::InvalidValue {
            key,
            value: value.to_string(),
        };

        let name = get(KEY_NAME)?.to_string();

        // Manifests without a type predate incremental backups
        let kind = match fields.get(KEY_TYPE) {
            Some(value) => BackupKind::from_label(value).ok_or_else(|| invalid(KEY_TYPE, value))?,
            None => BackupKind::Full,
        };

        let created_raw = get(KEY_CREATED)?;
        let created = parse_time(created_raw).ok_or_else(|| invalid(KEY_CREATED, created_raw))?;

        let size_raw = get(KEY_SIZE)?;
        let size = size_raw
            .trim_end_matches("bytes")
            .trim()
            .parse()
            .map_err(|_| invalid(KEY_SIZE, size_raw))?;

        let count_raw = get(KEY_FILE_COUNT)?;
        let file_count = count_raw
            .parse()
            .map_err(|_| invalid(KEY_FILE_COUNT, count_raw))?;

        let flag = |key: &'static str| -> Result<bool, ManifestError> {
            match fields.get(key).map(String::as_str) {
                None => Ok(false),
                Some(value) if value.eq_ignore_ascii_case("yes") => Ok(true),
                Some(value) if value.eq_ignore_ascii_case("no") => Ok(false),
                Some(value) => Err(invalid(key, value)),
            }
        };

        let based_on = match fields.get(KEY_BASED_ON) {
            Some(value) => Some(parse_time(value).ok_or_else(|| invalid(KEY_BASED_ON, value))?),
            None => None,
        };

        Ok(Self {
            name,
            kind,
            path: PathBuf::from(fields.get(KEY_PATH).cloned().unwrap_or_default()),
            created,
            size,
            file_count,
            checksum: get(KEY_CHECKSUM)?.to_string(),
            compressed: flag(KEY_COMPRESSED)?,
            encrypted: flag(KEY_ENCRYPTED)?,
            based_on,
        })
    }

    /// Write the manifest into `backup_path`
    pub fn write(&self, backup_path: &Path) -> std::io::Result<()> {
        write_atomic(&backup_path.join(MANIFEST_FILE), self.to_text().as_bytes())
    }

    /// Load the manifest stored in `backup_path`
    pub fn load(backup_path: &Path) -> Result<Self, ManifestError> {
        let path = backup_path.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|e| ManifestError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::parse(&text)
    }
}

/// Best-effort read of the stored checksum, tolerating partial manifests
pub fn read_checksum(backup_path: &Path) -> Option<String> {
    let text = fs::read_to_string(backup_path.join(MANIFEST_FILE)).ok()?;
    parse_fields(&text)
        .remove(KEY_CHECKSUM)
        .filter(|checksum| !checksum.is_empty())
}

/// Split manifest text into its `Key: value` pairs
///
/// Lines without a `:` separator are skipped. Later duplicates win.
pub fn parse_fields(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn required<'a>(
    fields: &'a BTreeMap<String, String>,
    key: &'static str,
) -> Result<&'a str, ManifestError> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or(ManifestError::MissingField(key))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
