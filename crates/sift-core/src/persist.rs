//! JSON document persistence shared by the reliability ledger and the
//! extraction cache: read-if-present and atomic temp-file + rename writes.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Read and parse a JSON document. A missing file is `Ok(None)`.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::PersistenceFailure(format!(
                "Failed to read {}: {e}",
                path.display()
            )));
        }
    };
    serde_json::from_str(&raw).map(Some).map_err(|e| {
        AppError::PersistenceFailure(format!("Corrupt document {}: {e}", path.display()))
    })
}

/// Serialize `value` to `path` via a sibling temp file, so readers never see
/// a half-written document.
pub fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&json)?;
    f.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_file_reads_as_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let doc: Option<BTreeMap<String, u32>> =
            read_document(&tmp.path().join("absent.json")).unwrap();
        assert!(doc.is_none());
    }

    #[test]
    fn test_write_then_read_creates_parent_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/state/doc.json");
        let doc = BTreeMap::from([("a".to_string(), 1u32)]);
        write_document(&path, &doc).unwrap();

        let back: BTreeMap<String, u32> = read_document(&path).unwrap().unwrap();
        assert_eq!(back, doc);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_persistence_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        fs::write(&path, "{ not json").unwrap();
        let err = read_document::<BTreeMap<String, u32>>(&path).unwrap_err();
        assert!(matches!(err, AppError::PersistenceFailure(_)));
    }
}
