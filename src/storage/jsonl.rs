//! JSONL file persistence.
//!
//! One JSON value per line. Rewrites go through a sibling temp file and a
//! rename so a crash mid-save leaves the previous file intact.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ConvoyError, Result};

/// A single JSONL file on disk
#[derive(Debug, Clone)]
pub struct JsonlFile {
    path: PathBuf,
}

impl JsonlFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record; a missing file reads as empty
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                ConvoyError::Storage(format!("{}:{}: {}", self.path.display(), lineno + 1, e))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Replace the file's contents with `records`
    pub fn rewrite<'a, T, I>(&self, records: I) -> Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        self.ensure_parent()?;
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for record in records {
                writeln!(writer, "{}", serde_json::to_string(record)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestRecord {
        id: String,
        status: String,
    }

    fn record(id: &str, status: &str) -> TestRecord {
        TestRecord {
            id: id.to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let file = JsonlFile::new(temp.path().join("missing.jsonl"));
        let records: Vec<TestRecord> = file.read_all().unwrap();
        assert!(records.is_empty());
        assert!(!file.path().exists());
    }

    #[test]
    fn test_rewrite_and_read() {
        let temp = TempDir::new().unwrap();
        let file = JsonlFile::new(temp.path().join("log.jsonl"));
        file.rewrite(&[record("1", "active"), record("2", "done")]).unwrap();

        let records: Vec<TestRecord> = file.read_all().unwrap();
        assert_eq!(records, vec![record("1", "active"), record("2", "done")]);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let temp = TempDir::new().unwrap();
        let file = JsonlFile::new(temp.path().join("nested/dir/log.jsonl"));
        file.rewrite(&[record("1", "active")]).unwrap();

        let replacement = vec![record("2", "done")];
        file.rewrite(&replacement).unwrap();

        let records: Vec<TestRecord> = file.read_all().unwrap();
        assert_eq!(records, replacement);
        assert!(!temp.path().join("nested/dir/log.jsonl.tmp").exists());
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.jsonl");
        fs::write(&path, "{\"id\":\"1\",\"status\":\"a\"}\n\n   \n").unwrap();

        let records: Vec<TestRecord> = JsonlFile::new(&path).read_all().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_read_reports_bad_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.jsonl");
        fs::write(&path, "{\"id\":\"1\",\"status\":\"a\"}\nnot json\n").unwrap();

        let err = JsonlFile::new(&path).read_all::<TestRecord>().unwrap_err();
        assert!(matches!(err, ConvoyError::Storage(_)));
        assert!(err.to_string().contains(":2:"));
    }
}
