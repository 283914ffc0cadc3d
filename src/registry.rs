//! Figure Registry
//!
//! Durable label → figure mapping backed by a single JSON file. Every
//! mutation rewrites the whole store before returning. A store that cannot be
//! parsed is backed up and replaced with an empty one instead of failing; a
//! store that cannot be read at all is an error, so it is never overwritten.
//!
//! Audits open the store with [`ArtifactRegistry::open_read_only`], which
//! parses without creating, resetting or backing anything up.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::artifact::{format_sequence, ArtifactRecord, FigureSpec};
use crate::error::{RefError, Result};

type Records = BTreeMap<String, ArtifactRecord>;

/// The figure registry
pub struct ArtifactRegistry {
    /// Path to the JSON store
    path: PathBuf,
    /// Generator recorded when a spec omits one
    default_generator: String,
    read_only: bool,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    records: Records,
    /// Last sequence number handed out
    last_sequence: u64,
}

impl RegistryState {
    fn from_records(records: Records) -> Self {
        let last_sequence = records
            .values()
            .filter_map(ArtifactRecord::sequence_number)
            .max()
            .unwrap_or(0);
        Self {
            records,
            last_sequence,
        }
    }
}

/// How a registration treats an existing label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overwrite {
    Replace,
    Reject,
}

impl ArtifactRegistry {
    /// Open the store at `path`, creating it if absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_generator(path, "unknown")
    }

    /// Open the store with a custom default generator attribution
    pub fn open_with_generator(path: impl AsRef<Path>, default_generator: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let records = Self::load(&path)?;
        let state = RegistryState::from_records(records);
        debug!(
            path = %path.display(),
            records = state.records.len(),
            last_sequence = state.last_sequence,
            "opened figure registry"
        );

        Ok(Self {
            path,
            default_generator: default_generator.to_string(),
            read_only: false,
            state: Mutex::new(state),
        })
    }

    /// Open the store for inspection only
    ///
    /// Nothing on disk is touched: an absent store reads as empty, and a
    /// corrupt or unreadable one is an error. Registrations are rejected.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match read_store(&path)? {
            Some(content) => normalize_labels(serde_json::from_slice(&content)?),
            None => Records::new(),
        };
        let state = RegistryState::from_records(records);
        debug!(path = %path.display(), records = state.records.len(), "opened figure registry read-only");

        Ok(Self {
            path,
            default_generator: String::new(),
            read_only: true,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a figure, replacing any record with the same label
    pub fn register(&self, spec: FigureSpec) -> Result<ArtifactRecord> {
        self.insert(spec, Overwrite::Replace)
    }

    /// Register a figure, failing if its label is already taken
    pub fn register_or_fail(&self, spec: FigureSpec) -> Result<ArtifactRecord> {
        self.insert(spec, Overwrite::Reject)
    }

    /// Get a record by label
    pub fn get(&self, label: &str) -> Option<ArtifactRecord> {
        self.state.lock().records.get(label).cloned()
    }

    /// All records, ordered by label
    pub fn list(&self) -> Vec<ArtifactRecord> {
        self.state.lock().records.values().cloned().collect()
    }

    /// All records, ordered by sequence id
    pub fn list_by_sequence(&self) -> Vec<ArtifactRecord> {
        let mut records = self.list();
        records.sort_by_key(|r| r.sequence_number().unwrap_or(0));
        records
    }

    /// Every registered label
    pub fn labels(&self) -> BTreeSet<String> {
        self.state.lock().records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, spec: FigureSpec, overwrite: Overwrite) -> Result<ArtifactRecord> {
        if self.read_only {
            return Err(RefError::ReadOnly(self.path.clone()));
        }
        if spec.filename.trim().is_empty() {
            return Err(RefError::InvalidSpec("filename must not be empty".to_string()));
        }
        let label = spec.resolved_label();
        if label.trim().is_empty() {
            return Err(RefError::InvalidSpec("label must not be empty".to_string()));
        }

        // Held across the write so concurrent registrations cannot lose updates.
        let mut state = self.state.lock();

        if overwrite == Overwrite::Reject {
            if let Some(existing) = state.records.get(&label) {
                return Err(RefError::DuplicateLabel {
                    label,
                    sequence_id: existing.sequence_id.clone(),
                });
            }
        }

        let sequence = state
            .last_sequence
            .checked_add(1)
            .ok_or_else(|| RefError::InvalidSpec("sequence ids exhausted".to_string()))?;
        let record = spec.into_record(format_sequence(sequence), &self.default_generator);
        let previous = state.records.insert(label.clone(), record.clone());

        if let Err(e) = write_store(&self.path, &state.records) {
            // Keep memory in step with what is on disk.
            match previous {
                Some(prev) => state.records.insert(label, prev),
                None => state.records.remove(&label),
            };
            return Err(e);
        }
        state.last_sequence = sequence;

        if previous.is_some() {
            info!(label = %record.label, sequence = %record.sequence_id, "replaced figure");
        } else {
            debug!(label = %record.label, sequence = %record.sequence_id, "registered figure");
        }
        Ok(record)
    }

    /// Read the store, recovering from corruption
    fn load(path: &Path) -> Result<Records> {
        if !path.exists() {
            let records = Records::new();
            write_store(path, &records)?;
            return Ok(records);
        }

        // An unreadable store would be replaced by the next write.
        let content = match read_store(path)? {
            Some(content) => content,
            None => return Ok(Records::new()),
        };

        match serde_json::from_slice::<Records>(&content) {
            Ok(records) => Ok(normalize_labels(records)),
            Err(e) => {
                let backup = backup_path(path);
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "registry store is corrupt, resetting"
                );
                fs::copy(path, &backup)?;
                let records = Records::new();
                write_store(path, &records)?;
                Ok(records)
            }
        }
    }
}

/// Raw store content, `None` when absent or blank
fn read_store(path: &Path) -> Result<Option<Vec<u8>>> {
    let content = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(content))
}

/// The map key is authoritative for a record's label
fn normalize_labels(records: Records) -> Records {
    records
        .into_iter()
        .map(|(key, mut record)| {
            if record.label != key {
                warn!(key = %key, label = %record.label, "record label differs from key, using key");
                record.label = key.clone();
            }
            (key, record)
        })
        .collect()
}

/// `<store>.corrupted.<timestamp>`
fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".corrupted.{}", stamp));
    PathBuf::from(name)
}

/// Write the full store via a sibling temp file and rename
fn write_store(path: &Path, records: &Records) -> Result<()> {
    let content = serde_json::to_string_pretty(records)?;
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_create_registry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = ArtifactRegistry::open(&path).unwrap();
        assert!(registry.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_register_and_get() {
        let dir = tempdir().unwrap();
        let registry = ArtifactRegistry::open(dir.path().join("registry.json")).unwrap();

        let record = registry
            .register(FigureSpec::new("intro.png", "Overview").section("Introduction"))
            .unwrap();
        assert_eq!(record.label, "fig:intro");
        assert_eq!(record.sequence_id, "001");

        let fetched = registry.get("fig:intro").unwrap();
        assert_eq!(fetched, record);
        assert!(registry.get("fig:missing").is_none());
    }

    #[test]
    fn test_overwrite_assigns_fresh_sequence() {
        let dir = tempdir().unwrap();
        let registry = ArtifactRegistry::open(dir.path().join("registry.json")).unwrap();

        registry.register(FigureSpec::new("a.png", "first")).unwrap();
        let second = registry.register(FigureSpec::new("a.png", "second")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(second.sequence_id, "002");
        assert_eq!(registry.get("fig:a").unwrap().caption, "second");
    }

    #[test]
    fn test_register_or_fail_rejects_duplicate() {
        let dir = tempdir().unwrap();
        let registry = ArtifactRegistry::open(dir.path().join("registry.json")).unwrap();

        registry.register_or_fail(FigureSpec::new("a.png", "first")).unwrap();
        let result = registry.register_or_fail(FigureSpec::new("a.png", "second"));

        assert!(matches!(result, Err(RefError::DuplicateLabel { .. })));
        assert_eq!(registry.get("fig:a").unwrap().caption, "first");
    }

    #[test]
    fn test_empty_filename_rejected() {
        let dir = tempdir().unwrap();
        let registry = ArtifactRegistry::open(dir.path().join("registry.json")).unwrap();
        assert!(registry.register(FigureSpec::new("  ", "none")).is_err());
    }

    #[test]
    fn test_whitespace_store_is_empty_without_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, "\n  \n").unwrap();

        let registry = ArtifactRegistry::open(&path).unwrap();
        assert!(registry.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_key_overrides_mismatched_label() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = ArtifactRegistry::open(&path).unwrap();
        registry.register(FigureSpec::new("a.png", "A")).unwrap();
        drop(registry);

        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("\"label\": \"fig:a\"", "\"label\": \"fig:other\"")).unwrap();

        let reopened = ArtifactRegistry::open(&path).unwrap();
        assert_eq!(reopened.get("fig:a").unwrap().label, "fig:a");
    }

    #[test]
    fn test_unreadable_store_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        // Reading a directory fails even for a privileged user.
        fs::create_dir(&path).unwrap();

        let result = ArtifactRegistry::open(&path);
        assert!(matches!(result, Err(RefError::Io(_))));
        assert!(path.is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_exhausted_sequence_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = ArtifactRegistry::open(&path).unwrap();
        registry.register(FigureSpec::new("a.png", "A")).unwrap();
        drop(registry);

        let content = fs::read_to_string(&path).unwrap();
        let max = format!("\"sequence_id\": \"{}\"", u64::MAX);
        fs::write(&path, content.replace("\"sequence_id\": \"001\"", &max)).unwrap();

        let registry = ArtifactRegistry::open(&path).unwrap();
        let result = registry.register(FigureSpec::new("b.png", "B"));
        assert!(matches!(result, Err(RefError::InvalidSpec(_))));
        assert!(registry.get("fig:b").is_none());
    }

    #[test]
    fn test_read_only_leaves_corrupt_store_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, "{not json").unwrap();

        assert!(ArtifactRegistry::open_read_only(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_only_rejects_registration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        ArtifactRegistry::open(&path)
            .unwrap()
            .register(FigureSpec::new("a.png", "A"))
            .unwrap();

        let registry = ArtifactRegistry::open_read_only(&path).unwrap();
        assert_eq!(registry.labels().into_iter().collect::<Vec<_>>(), vec!["fig:a"]);
        let result = registry.register(FigureSpec::new("b.png", "B"));
        assert!(matches!(result, Err(RefError::ReadOnly(_))));

        let absent = ArtifactRegistry::open_read_only(dir.path().join("nested/none.json")).unwrap();
        assert!(absent.is_empty());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_concurrent_registrations_all_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = Arc::new(ArtifactRegistry::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .register(FigureSpec::new(format!("fig{}.png", i), "parallel"))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = ArtifactRegistry::open(&path).unwrap();
        assert_eq!(reopened.len(), 8);
        let mut ids: Vec<_> = reopened.list().into_iter().map(|r| r.sequence_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}
