//! Backup display formatting

use chrono::{DateTime, Utc};
use tabled::{settings::Style, Table, Tabled};

use super::{format_age, format_size};
use crate::backup::BackupInfo;

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Backup")]
    dir_name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Created (UTC)")]
    created: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Files")]
    files: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Flags")]
    flags: String,
}

fn flags(info: &BackupInfo) -> String {
    match (info.compressed, info.encrypted) {
        (true, true) => "zstd+aes".to_string(),
        (true, false) => "zstd".to_string(),
        (false, true) => "aes".to_string(),
        (false, false) => String::new(),
    }
}

/// Format backups as a table, in the order given
pub fn format_backup_list(backups: &[BackupInfo], now: DateTime<Utc>) -> String {
    if backups.is_empty() {
        return "No backups found.".to_string();
    }

    let rows = backups.iter().map(|info| BackupRow {
        dir_name: info.dir_name(),
        kind: info.kind.to_string(),
        created: info.created.format("%Y-%m-%d %H:%M:%S").to_string(),
        age: format_age(now.signed_duration_since(info.created)),
        files: info
            .file_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string()),
        size: info.size.map(format_size).unwrap_or_else(|| "?".to_string()),
        flags: flags(info),
    });

    let mut table = Table::new(rows);
    table.with(Style::psql());
    table.to_string()
}

/// Format one backup for `strongbox backup info`
pub fn format_backup_details(info: &BackupInfo) -> String {
    let mut output = String::new();
    output.push_str(&format!("Backup:     {}\n", info.dir_name()));
    output.push_str(&format!("Name:       {}\n", info.name));
    output.push_str(&format!("Type:       {}\n", info.kind));
    output.push_str(&format!("Location:   {}\n", info.path.display()));
    output.push_str(&format!(
        "Created:    {}\n",
        info.created.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match (info.file_count, info.size, &info.checksum) {
        (Some(files), Some(size), Some(checksum)) => {
            output.push_str(&format!("Files:      {}\n", files));
            output.push_str(&format!("Size:       {} ({} bytes)\n", format_size(size), size));
            output.push_str(&format!("Checksum:   {}\n", checksum));
        }
        _ => output.push_str("Manifest:   missing or unreadable\n"),
    }
    output.push_str(&format!(
        "Compressed: {}\n",
        if info.compressed { "Yes" } else { "No" }
    ));
    output.push_str(&format!(
        "Encrypted:  {}",
        if info.encrypted { "Yes" } else { "No" }
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupKind;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn sample(compressed: bool) -> BackupInfo {
        BackupInfo {
            name: "docs".to_string(),
            kind: BackupKind::Full,
            path: PathBuf::from("/backups/docs_20250314_120000"),
            created: Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap(),
            size: Some(10),
            file_count: Some(2),
            checksum: Some("ab".repeat(32)),
            compressed,
            encrypted: false,
        }
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(format_backup_list(&[], Utc::now()), "No backups found.");
    }

    #[test]
    fn test_list_contains_rows() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap();
        let output = format_backup_list(&[sample(true)], now);

        assert!(output.contains("Backup"));
        assert!(output.contains("docs_20250314_120000"));
        assert!(output.contains("2025-03-14 12:00:00"));
        assert!(output.contains("3h"));
        assert!(output.contains("10 B"));
        assert!(output.contains("zstd"));
    }

    #[test]
    fn test_details_without_manifest() {
        let mut info = sample(false);
        info.size = None;
        info.file_count = None;
        info.checksum = None;

        let output = format_backup_details(&info);
        assert!(output.contains("Manifest:   missing or unreadable"));
        assert!(output.contains("Compressed: No"));
    }
}
