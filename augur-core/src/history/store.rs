//! CSV-backed history store with an in-memory read cache.
//!
//! Layout: `{root}/{entity}.csv`, one file per entity.
//!
//! - Atomic writes (write to `.csv.tmp`, rename into place)
//! - Writes serialized per entity
//! - Loads cached by entity + file modification time
//! - Data-shape failures drop the row and are counted, never fatal

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use super::normalize::canonical_column;
use super::row::{HistoryRow, Record};

/// Maximum number of per-row warnings kept on a load.
const MAX_WARNINGS: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid entity name '{0}'")]
    InvalidEntity(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {message}")]
    Csv { path: PathBuf, message: String },
}

/// Rows loaded for one entity, oldest first.
#[derive(Debug, Clone)]
pub struct LoadedHistory<R> {
    pub rows: Arc<Vec<R>>,
    /// Records dropped by normalization.
    pub dropped: usize,
    pub warnings: Vec<String>,
}

impl<R: HistoryRow> LoadedHistory<R> {
    fn empty() -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            dropped: 0,
            warnings: Vec::new(),
        }
    }

    /// Rows dated on or before `as_of`.
    pub fn up_to(&self, as_of: NaiveDate) -> &[R] {
        let end = self.rows.partition_point(|r| r.date() <= as_of);
        &self.rows[..end]
    }
}

struct CachedRows<R: HistoryRow> {
    bounds: R::Bounds,
    modified: Option<SystemTime>,
    loaded: LoadedHistory<R>,
}

/// Per-entity CSV history store.
pub struct HistoryStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the CSV file for an entity.
    pub fn entity_path(&self, entity: &str) -> Result<PathBuf, StoreError> {
        let valid = !entity.is_empty()
            && entity
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '^'))
            && !entity.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidEntity(entity.to_string()));
        }
        Ok(self.root.join(format!("{entity}.csv")))
    }

    /// Load all rows for an entity, deduplicated on date and sorted ascending.
    ///
    /// A missing file yields an empty history.
    pub fn load<R: HistoryRow>(
        &self,
        entity: &str,
        bounds: &R::Bounds,
    ) -> Result<LoadedHistory<R>, StoreError> {
        let path = self.entity_path(entity)?;
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();

        if let Some(hit) = self.cached::<R>(entity, bounds, modified) {
            return Ok(hit);
        }

        let loaded = if path.exists() {
            read_rows::<R>(&path, bounds)?
        } else {
            LoadedHistory::empty()
        };
        if loaded.dropped > 0 {
            warn!(entity, dropped = loaded.dropped, "history rows dropped during normalization");
        }

        let entry: Arc<dyn Any + Send + Sync> = Arc::new(CachedRows::<R> {
            bounds: bounds.clone(),
            modified,
            loaded: loaded.clone(),
        });
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(cache_key::<R>(entity), entry);
        }
        Ok(loaded)
    }

    /// Most recent row for an entity.
    pub fn latest<R: HistoryRow>(
        &self,
        entity: &str,
        bounds: &R::Bounds,
    ) -> Result<Option<R>, StoreError> {
        Ok(self.load::<R>(entity, bounds)?.rows.last().cloned())
    }

    /// Merge `rows` into the entity's history and persist atomically.
    ///
    /// Incoming rows win over stored rows with the same date. Returns the
    /// number of rows stored afterwards.
    pub fn append<R: HistoryRow>(
        &self,
        entity: &str,
        rows: &[R],
        bounds: &R::Bounds,
    ) -> Result<usize, StoreError> {
        let path = self.entity_path(entity)?;
        let lock = self.write_lock(entity);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let existing = if path.exists() {
            read_rows::<R>(&path, bounds)?
        } else {
            LoadedHistory::empty()
        };

        let mut merged: BTreeMap<NaiveDate, R> = BTreeMap::new();
        for row in existing.rows.iter().chain(rows.iter()) {
            merged.insert(row.date(), row.clone());
        }

        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let tmp_path = path.with_extension("csv.tmp");
        write_rows(&tmp_path, merged.values(), bounds)?;
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })?;

        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&cache_key::<R>(entity));
        }
        debug!(entity, rows = merged.len(), "history appended");
        Ok(merged.len())
    }

    /// Parse a foreign CSV file (any supported column aliases) without
    /// touching the store.
    pub fn import<R: HistoryRow>(path: &Path, bounds: &R::Bounds) -> Result<LoadedHistory<R>, StoreError> {
        if !path.exists() {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }
        read_rows::<R>(path, bounds)
    }

    fn cached<R: HistoryRow>(
        &self,
        entity: &str,
        bounds: &R::Bounds,
        modified: Option<SystemTime>,
    ) -> Option<LoadedHistory<R>> {
        let entry = {
            let cache = self.cache.read().ok()?;
            cache.get(&cache_key::<R>(entity))?.clone()
        };
        let rows = entry.downcast::<CachedRows<R>>().ok()?;
        if rows.modified == modified && modified.is_some() && &rows.bounds == bounds {
            Some(rows.loaded.clone())
        } else {
            None
        }
    }

    fn write_lock(&self, entity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn cache_key<R: 'static>(entity: &str) -> String {
    format!("{entity}::{}", std::any::type_name::<R>())
}

fn read_rows<R: HistoryRow>(path: &Path, bounds: &R::Bounds) -> Result<LoadedHistory<R>, StoreError> {
    let csv_err = |e: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(canonical_column)
        .collect();

    let mut by_date: BTreeMap<NaiveDate, R> = BTreeMap::new();
    let mut dropped = 0usize;
    let mut warnings = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                let record: Record = headers
                    .iter()
                    .cloned()
                    .zip(raw.iter().map(str::to_string))
                    .collect();
                R::parse(&record, bounds).map_err(|e| e.to_string())
            });
        match outcome {
            Ok(row) => {
                by_date.insert(row.date(), row);
            }
            Err(reason) => {
                dropped += 1;
                if warnings.len() < MAX_WARNINGS {
                    warnings.push(format!("{}:{}: {reason}", path.display(), line + 2));
                }
            }
        }
    }

    Ok(LoadedHistory {
        rows: Arc::new(by_date.into_values().collect()),
        dropped,
        warnings,
    })
}

fn write_rows<'a, R: HistoryRow>(
    path: &Path,
    rows: impl Iterator<Item = &'a R>,
    bounds: &R::Bounds,
) -> Result<(), StoreError> {
    let csv_err = |e: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    writer.write_record(R::header(bounds)).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row.to_fields(bounds)).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// BLAKE3 fingerprint of a row sequence (hex). Used as the `hist_hash` part of
/// agent cache keys.
pub fn history_hash<R: HistoryRow>(rows: &[R]) -> String {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        if let Ok(bytes) = serde_json::to_vec(row) {
            hasher.update(&bytes);
            hasher.update(b"\n");
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, DrawRow, GameRules};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_entity_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let rules = GameRules::preset("cash_five").unwrap();
        let loaded = store.load::<DrawRow>("cash_five", &rules).unwrap();
        assert!(loaded.rows.is_empty());
        assert!(store.latest::<DrawRow>("cash_five", &rules).unwrap().is_none());
    }

    #[test]
    fn import_reads_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, "date,n1,n2,n3\n2024-03-01,1,2,3\n").unwrap();
        let rules = GameRules::preset("pick3").unwrap();
        let loaded = HistoryStore::import::<DrawRow>(&path, &rules).unwrap();
        assert_eq!(loaded.rows.len(), 1);
        assert_eq!(loaded.rows[0].whites, vec![1, 2, 3]);
        assert!(HistoryStore::import::<DrawRow>(&dir.path().join("nope.csv"), &rules).is_err());
    }

    #[test]
    fn load_normalizes_dedupes_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let csv = "Draw Date,Winning Numbers,Mega Ball\n\
                   01/09/2024,1 2 3 4 5,7\n\
                   01/02/2024,10 20 30 40 50,8\n\
                   01/09/2024,6 7 8 9 10,9\n\
                   garbage,1 2 3 4 5,1\n\
                   01/05/2024,1 2,3\n";
        fs::write(dir.path().join("mega_millions.csv"), csv).unwrap();

        let store = HistoryStore::new(dir.path());
        let rules = GameRules::preset("mega_millions").unwrap();
        let loaded = store.load::<DrawRow>("mega_millions", &rules).unwrap();

        assert_eq!(loaded.rows.len(), 2);
        assert_eq!(loaded.dropped, 2);
        assert_eq!(loaded.warnings.len(), 2);
        assert_eq!(loaded.rows[0].draw_date, date(2024, 1, 2));
        // Later duplicate wins.
        assert_eq!(loaded.rows[1].whites, vec![6, 7, 8, 9, 10]);
        assert_eq!(loaded.rows[1].special, Some(9));
    }

    #[test]
    fn append_merges_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let rules = GameRules::preset("powerball").unwrap();

        let first = vec![
            DrawRow::new(date(2024, 1, 1), vec![1, 2, 3, 4, 5], Some(1)),
            DrawRow::new(date(2024, 1, 3), vec![6, 7, 8, 9, 10], None),
        ];
        assert_eq!(store.append("powerball", &first, &rules).unwrap(), 2);

        let second = vec![DrawRow::new(date(2024, 1, 3), vec![11, 12, 13, 14, 15], Some(2))];
        assert_eq!(store.append("powerball", &second, &rules).unwrap(), 2);

        let loaded = store.load::<DrawRow>("powerball", &rules).unwrap();
        assert_eq!(loaded.dropped, 0);
        assert_eq!(loaded.rows[0].special, Some(1));
        assert_eq!(loaded.rows[1].whites, vec![11, 12, 13, 14, 15]);
        assert!(!dir.path().join("powerball.csv.tmp").exists());

        let latest = store.latest::<DrawRow>("powerball", &rules).unwrap().unwrap();
        assert_eq!(latest.draw_date, date(2024, 1, 3));
    }

    #[test]
    fn missing_special_round_trips_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let rules = GameRules::preset("powerball").unwrap();
        let rows = vec![DrawRow::new(date(2024, 1, 1), vec![1, 2, 3, 4, 5], None)];
        store.append("pb", &rows, &rules).unwrap();
        let loaded = store.load::<DrawRow>("pb", &rules).unwrap();
        assert_eq!(loaded.rows[0].special, None);
    }

    #[test]
    fn bars_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let bars = vec![Bar {
            date: date(2024, 1, 2),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1_000,
        }];
        store.append("SPY", &bars, &()).unwrap();
        let loaded = store.load::<Bar>("SPY", &()).unwrap();
        assert_eq!(loaded.rows.as_slice(), bars.as_slice());
    }

    #[test]
    fn up_to_excludes_future_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let rules = GameRules::preset("cash_five").unwrap();
        let rows: Vec<DrawRow> = (1..=5)
            .map(|d| DrawRow::new(date(2024, 1, d), vec![1, 2, 3, 4, 5], None))
            .collect();
        store.append("c5", &rows, &rules).unwrap();
        let loaded = store.load::<DrawRow>("c5", &rules).unwrap();
        assert_eq!(loaded.up_to(date(2024, 1, 3)).len(), 3);
        assert_eq!(loaded.up_to(date(2023, 12, 31)).len(), 0);
    }

    #[test]
    fn rejects_path_traversal() {
        let store = HistoryStore::new("/tmp");
        assert!(matches!(
            store.entity_path("../etc/passwd"),
            Err(StoreError::InvalidEntity(_))
        ));
    }

    #[test]
    fn history_hash_tracks_content() {
        let a = vec![DrawRow::new(date(2024, 1, 1), vec![1, 2, 3], None)];
        let b = vec![DrawRow::new(date(2024, 1, 1), vec![1, 2, 4], None)];
        assert_eq!(history_hash(&a), history_hash(&a.clone()));
        assert_ne!(history_hash(&a), history_hash(&b));
    }
}
