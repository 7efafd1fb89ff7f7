use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{Festival, Source, Status};
use crate::utils;

/// Which stored records a delete or listing applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FestivalFilter {
    pub source: Option<Source>,
}

impl FestivalFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn source(source: Source) -> Self {
        Self {
            source: Some(source),
        }
    }

    fn matches(&self, festival: &Festival) -> bool {
        self.source.map_or(true, |source| festival.source == source)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    /// Records the store refused, with the reason.
    pub failed: Vec<(String, String)>,
}

impl UpsertReport {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Outcome of a scoped clear plus upsert applied as one unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    /// Records removed from the cleared sources before the upsert.
    pub cleared: usize,
    pub upsert: UpsertReport,
}

/// Upsert sink keyed by `Festival::id`. Scraped fields are overwritten on
/// conflict; `status`, `is_interested` and `is_favorite` belong to the
/// consumer and survive.
pub trait FestivalStore: Send {
    fn upsert(&mut self, festivals: &[Festival]) -> Result<UpsertReport, StoreError>;
    fn delete(&mut self, filter: &FestivalFilter) -> Result<usize, StoreError>;
    /// Delete every record of `sources`, then upsert `festivals`. Either both
    /// happen or, on error, neither does.
    fn replace(
        &mut self,
        sources: &[Source],
        festivals: &[Festival],
    ) -> Result<ReplaceReport, StoreError>;
    fn list(&self, filter: &FestivalFilter) -> Result<Vec<Festival>, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&utils::database_path())
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.display(), "opened festival store");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS festivals(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                date TEXT NOT NULL,
                website TEXT,
                locations TEXT NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                is_interested INTEGER NOT NULL DEFAULT 0,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS festivals_source ON festivals(source);",
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Festival>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_FESTIVAL} WHERE id = ?1"),
                params![id],
                StoredRow::from_row,
            )
            .optional()?;
        row.map(StoredRow::into_festival).transpose()
    }

    /// Consumer-side edit (archiving, interest, favorites).
    pub fn update_consumer_fields(
        &self,
        id: &str,
        status: Status,
        is_interested: bool,
        is_favorite: bool,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE festivals SET status = ?2, is_interested = ?3, is_favorite = ?4 WHERE id = ?1",
            params![id, status.as_str(), is_interested, is_favorite],
        )?;
        Ok(changed > 0)
    }
}

const SELECT_FESTIVAL: &str = "SELECT id, name, date, website, locations, source, status,
        is_interested, is_favorite, last_updated FROM festivals";

/// Upsert `festivals` on an open transaction. Rows the database refuses are
/// reported individually; statement-level failures abort the batch.
fn write_batch(conn: &Connection, festivals: &[Festival]) -> Result<UpsertReport, StoreError> {
    let now = Utc::now();
    let mut report = UpsertReport::default();
    let mut exists = conn.prepare("SELECT 1 FROM festivals WHERE id = ?1")?;
    let mut write = conn.prepare(
        "INSERT INTO festivals (id, name, date, website, locations, source, status,
            is_interested, is_favorite, created_at, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           date = excluded.date,
           website = excluded.website,
           locations = excluded.locations,
           source = excluded.source,
           last_updated = excluded.last_updated",
    )?;

    for festival in festivals {
        let locations = match serde_json::to_string(&festival.locations) {
            Ok(json) => json,
            Err(err) => {
                report.failed.push((festival.id.clone(), err.to_string()));
                continue;
            }
        };
        let known = exists.exists(params![festival.id])?;
        let result = write.execute(params![
            festival.id,
            festival.name,
            festival.date,
            festival.website,
            locations,
            festival.source.as_str(),
            festival.status.as_str(),
            festival.is_interested,
            festival.is_favorite,
            now,
            festival.last_updated,
        ]);
        match result {
            Ok(_) if known => report.updated += 1,
            Ok(_) => report.inserted += 1,
            Err(err) => {
                warn!(
                    id = %festival.id,
                    name = %festival.name,
                    error = %err,
                    "record rejected by store"
                );
                report.failed.push((festival.id.clone(), err.to_string()));
            }
        }
    }
    Ok(report)
}

impl FestivalStore for SqliteStore {
    fn upsert(&mut self, festivals: &[Festival]) -> Result<UpsertReport, StoreError> {
        self.replace(&[], festivals).map(|report| report.upsert)
    }

    fn replace(
        &mut self,
        sources: &[Source],
        festivals: &[Festival],
    ) -> Result<ReplaceReport, StoreError> {
        let tx = self.conn.transaction()?;
        let mut report = ReplaceReport::default();
        for source in sources {
            let removed =
                tx.execute("DELETE FROM festivals WHERE source = ?1", params![source.as_str()])?;
            debug!(%source, removed, "clearing stored records");
            report.cleared += removed;
        }
        report.upsert = write_batch(&tx, festivals)?;
        tx.commit()?;
        Ok(report)
    }

    fn delete(&mut self, filter: &FestivalFilter) -> Result<usize, StoreError> {
        let removed = match filter.source {
            Some(source) => self
                .conn
                .execute("DELETE FROM festivals WHERE source = ?1", params![source.as_str()])?,
            None => self.conn.execute("DELETE FROM festivals", [])?,
        };
        Ok(removed)
    }

    fn list(&self, filter: &FestivalFilter) -> Result<Vec<Festival>, StoreError> {
        let mut rows = Vec::new();
        match filter.source {
            Some(source) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{SELECT_FESTIVAL} WHERE source = ?1 ORDER BY date, name"
                ))?;
                for row in stmt.query_map(params![source.as_str()], StoredRow::from_row)? {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{SELECT_FESTIVAL} ORDER BY date, name"))?;
                for row in stmt.query_map([], StoredRow::from_row)? {
                    rows.push(row?);
                }
            }
        }
        rows.into_iter().map(StoredRow::into_festival).collect()
    }
}

/// Raw column values; enum and JSON columns are decoded afterwards so a bad
/// value names the row it came from.
struct StoredRow {
    id: String,
    name: String,
    date: NaiveDate,
    website: Option<String>,
    locations: String,
    source: String,
    status: String,
    is_interested: bool,
    is_favorite: bool,
    last_updated: DateTime<Utc>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            date: row.get(2)?,
            website: row.get(3)?,
            locations: row.get(4)?,
            source: row.get(5)?,
            status: row.get(6)?,
            is_interested: row.get(7)?,
            is_favorite: row.get(8)?,
            last_updated: row.get(9)?,
        })
    }

    fn into_festival(self) -> Result<Festival, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };
        let source = self.source.parse::<Source>().map_err(corrupt)?;
        let status = self.status.parse::<Status>().map_err(corrupt)?;
        let locations = serde_json::from_str(&self.locations)?;
        Ok(Festival {
            id: self.id,
            name: self.name,
            date: self.date,
            website: self.website,
            locations,
            source,
            status,
            is_interested: self.is_interested,
            is_favorite: self.is_favorite,
            last_updated: self.last_updated,
        })
    }
}

/// In-process store with the same upsert rules as `SqliteStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, Festival>,
    unavailable: bool,
    reject_upserts: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails, as if the database were unreachable.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Make every following upsert fail while deletes and reads keep working.
    pub fn reject_upserts(&mut self, reject: bool) {
        self.reject_upserts = reject;
    }

    pub fn get(&self, id: &str) -> Option<&Festival> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Festival> {
        self.records.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

fn merge_into(
    records: &mut BTreeMap<String, Festival>,
    festivals: &[Festival],
) -> UpsertReport {
    let mut report = UpsertReport::default();
    for festival in festivals {
        match records.get_mut(&festival.id) {
            Some(existing) => {
                existing.name = festival.name.clone();
                existing.date = festival.date;
                existing.website = festival.website.clone();
                existing.locations = festival.locations.clone();
                existing.source = festival.source;
                existing.last_updated = festival.last_updated;
                report.updated += 1;
            }
            None => {
                records.insert(festival.id.clone(), festival.clone());
                report.inserted += 1;
            }
        }
    }
    report
}

impl FestivalStore for MemoryStore {
    fn upsert(&mut self, festivals: &[Festival]) -> Result<UpsertReport, StoreError> {
        self.replace(&[], festivals).map(|report| report.upsert)
    }

    /// Works on a copy and swaps it in only when every step succeeded.
    fn replace(
        &mut self,
        sources: &[Source],
        festivals: &[Festival],
    ) -> Result<ReplaceReport, StoreError> {
        self.check()?;
        let mut staged = self.records.clone();
        let before = staged.len();
        staged.retain(|_, festival| !sources.contains(&festival.source));
        let cleared = before - staged.len();

        if self.reject_upserts {
            return Err(StoreError::Unavailable("memory store rejects upserts".into()));
        }
        let upsert = merge_into(&mut staged, festivals);
        self.records = staged;
        Ok(ReplaceReport { cleared, upsert })
    }

    fn delete(&mut self, filter: &FestivalFilter) -> Result<usize, StoreError> {
        self.check()?;
        let before = self.records.len();
        self.records.retain(|_, festival| !filter.matches(festival));
        Ok(before - self.records.len())
    }

    fn list(&self, filter: &FestivalFilter) -> Result<Vec<Festival>, StoreError> {
        self.check()?;
        let mut found: Vec<Festival> = self
            .records
            .values()
            .filter(|festival| filter.matches(festival))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
        Ok(found)
    }
}
