//! Created-case fixtures shared between scenarios and workers.
//!
//! The file maps a category to the cases created under it:
//!
//! ```json
//! { "Query": [ { "caseTitle": "AutoCase_QWERTY", "caseNumber": "CAS-01234" } ] }
//! ```
//!
//! Every mutation is a locked read-modify-write followed by an atomic
//! rename, so concurrent runners never see a half-written file.

use crate::random::Randomness;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// One created case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    #[serde(rename = "caseTitle")]
    pub case_title: String,
    #[serde(rename = "caseNumber", default)]
    pub case_number: String,
}

impl CaseRecord {
    pub fn new(title: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            case_title: title.into(),
            case_number: number.into(),
        }
    }
}

pub type Fixtures = BTreeMap<String, Vec<CaseRecord>>;

/// JSON fixture file with an adjacent `.lock` file.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FixtureStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the whole file. Missing or empty files read as `{}`.
    pub fn load(&self) -> Result<Fixtures> {
        let _lock = self.lock()?;
        self.read()
    }

    pub fn append(&self, category: &str, record: CaseRecord) -> Result<()> {
        let title = record.case_title.clone();
        self.update(|all| {
            all.entry(category.to_string()).or_default().push(record);
        })?;
        info!("Saved fixture '{}' under {}", title, category);
        Ok(())
    }

    pub fn titles(&self, category: &str) -> Result<Vec<String>> {
        Ok(self
            .load()?
            .get(category)
            .map(|records| records.iter().map(|r| r.case_title.clone()).collect())
            .unwrap_or_default())
    }

    pub fn read_random_title(&self, category: &str, rng: &Randomness) -> Result<Option<String>> {
        let titles = self.titles(category)?;
        Ok(rng.index(titles.len()).map(|i| titles[i].clone()))
    }

    pub fn contains(&self, category: &str, title: &str) -> Result<bool> {
        Ok(self.titles(category)?.iter().any(|t| t == title))
    }

    /// Remove `title` from every category. Returns how many records went.
    pub fn delete_by_title(&self, title: &str) -> Result<usize> {
        let removed = self.update(|all| {
            let mut removed = 0;
            for records in all.values_mut() {
                let before = records.len();
                records.retain(|r| r.case_title != title);
                removed += before - records.len();
            }
            removed
        })?;
        if removed > 0 {
            info!("Removed fixture '{}'", title);
        } else {
            debug!("No fixture named '{}'", title);
        }
        Ok(removed)
    }

    fn update<R>(&self, f: impl FnOnce(&mut Fixtures) -> R) -> Result<R> {
        let _lock = self.lock()?;
        let mut all = self.read()?;
        let out = f(&mut all);
        self.write(&all)?;
        Ok(out)
    }

    /// Exclusive lock held until the returned file is dropped.
    fn lock(&self) -> Result<File> {
        if let Some(dir) = self.dir() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock()?;
        Ok(file)
    }

    fn read(&self) -> Result<Fixtures> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Fixtures::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Fixtures::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, all: &Fixtures) -> Result<()> {
        let dir = self.dir().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, all)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store() -> (tempfile::TempDir, FixtureStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::open(dir.path().join("test-data/createCase.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_reads_empty() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_empty());
        assert!(store.titles("Query").unwrap().is_empty());
        assert_eq!(store.read_random_title("Query", &Randomness::seeded(1)).unwrap(), None);
    }

    #[test]
    fn empty_file_reads_empty() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn append_then_contains() {
        let (_dir, store) = store();
        store
            .append("Query", CaseRecord::new("AutoCase_ABCDEF", "CAS-1001"))
            .unwrap();
        assert!(store.contains("Query", "AutoCase_ABCDEF").unwrap());
        assert!(!store.contains("Complaint", "AutoCase_ABCDEF").unwrap());

        let raw = fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["Query"][0]["caseTitle"], "AutoCase_ABCDEF");
        assert_eq!(json["Query"][0]["caseNumber"], "CAS-1001");
    }

    #[test]
    fn delete_removes_from_every_category() {
        let (_dir, store) = store();
        store.append("Query", CaseRecord::new("A", "1")).unwrap();
        store.append("Query", CaseRecord::new("B", "2")).unwrap();
        store.append("Complaint", CaseRecord::new("A", "3")).unwrap();

        assert_eq!(store.delete_by_title("A").unwrap(), 2);
        assert!(!store.contains("Query", "A").unwrap());
        assert!(!store.contains("Complaint", "A").unwrap());
        assert_eq!(store.titles("Query").unwrap(), vec!["B".to_string()]);
        assert_eq!(store.delete_by_title("A").unwrap(), 0);
    }

    #[test]
    fn random_title_comes_from_category() {
        let (_dir, store) = store();
        for t in ["X1", "X2", "X3"] {
            store.append("Query", CaseRecord::new(t, "")).unwrap();
        }
        let rng = Randomness::seeded(4);
        for _ in 0..20 {
            let title = store.read_random_title("Query", &rng).unwrap().unwrap();
            assert!(title.starts_with('X'));
        }
    }

    #[test]
    fn accepts_records_without_number() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{"Query":[{"caseTitle":"Old"}]}"#).unwrap();
        assert_eq!(store.titles("Query").unwrap(), vec!["Old".to_string()]);
    }

    #[test]
    fn concurrent_appends_all_persist() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..5 {
                        // Separate handles, as separate processes would have.
                        FixtureStore::open(store.path())
                            .append("Query", CaseRecord::new(format!("W{}-{}", worker, i), ""))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let titles = store.titles("Query").unwrap();
        assert_eq!(titles.len(), 40);
        assert!(titles.contains(&"W7-4".to_string()));
    }
}
