//! Exclusion list loading
//!
//! Reads a CSV with any of the columns `DeviceId`, `DirectoryId`,
//! `SerialNumber`, `DeviceName`. Other columns are ignored and rows with
//! nothing to match on are dropped.

use super::ExclusionEntry;
use crate::error::Result;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ExclusionRow {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    directory_id: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    device_name: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<ExclusionRow> for ExclusionEntry {
    fn from(row: ExclusionRow) -> Self {
        ExclusionEntry {
            device_id: clean(row.device_id),
            directory_id: clean(row.directory_id),
            serial_number: clean(row.serial_number),
            display_name: clean(row.device_name),
        }
    }
}

pub fn parse_exclusions<R: Read>(reader: R) -> Result<Vec<ExclusionEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let mut entries = Vec::new();
    for result in rdr.deserialize() {
        let row: ExclusionRow = result?;
        let entry = ExclusionEntry::from(row);
        if !entry.is_empty() {
            entries.push(entry);
        }
    }

    Ok(entries)
}

pub fn load_exclusions(path: &Path) -> Result<Vec<ExclusionEntry>> {
    let file = std::fs::File::open(path)?;
    let entries = parse_exclusions(file)?;
    tracing::info!(path = %path.display(), count = entries.len(), "loaded exclusions");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_columns() {
        let csv = "DeviceId,DirectoryId,SerialNumber,DeviceName\n\
                   dev-1,,,\n\
                   ,aad-2,,\n\
                   ,, SN-3 ,\n\
                   ,,,KIOSK-4\n";

        let entries = parse_exclusions(csv.as_bytes()).unwrap();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].device_id.as_deref(), Some("dev-1"));
        assert_eq!(entries[1].directory_id.as_deref(), Some("aad-2"));
        assert_eq!(entries[2].serial_number.as_deref(), Some("SN-3"));
        assert_eq!(entries[3].display_name.as_deref(), Some("KIOSK-4"));
    }

    #[test]
    fn test_drops_empty_rows() {
        let csv = "DeviceId,SerialNumber\n,\n  ,  \nabc,\n";
        let entries = parse_exclusions(csv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].device_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_subset_of_columns_and_extra_columns() {
        let csv = "SerialNumber,Notes\nSN-9,keep for lab\n";
        let entries = parse_exclusions(csv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].serial_number.as_deref(), Some("SN-9"));
        assert!(entries[0].device_id.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclusions.csv");
        std::fs::write(&path, "DeviceName\nBOARDROOM-PC\n").unwrap();

        let entries = load_exclusions(&path).unwrap();
        assert_eq!(entries[0].display_name.as_deref(), Some("BOARDROOM-PC"));
    }
}
