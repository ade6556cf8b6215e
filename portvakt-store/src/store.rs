//! SQLite-backed ban store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::info;

use crate::record::BanRecord;

/// Persistence errors, surfaced unwrapped to the caller of the single
/// operation that failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable table of banned IPs with visit counters and freshness stamps.
pub struct BanStore {
    conn: Connection,
    page_size: usize,
}

impl BanStore {
    /// Create or open the ban database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn, page_size };
        store.init_schema()?;
        info!(path = %path.as_ref().display(), "opened ban store");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            page_size: 64,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS ban_record (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL UNIQUE,
                remark TEXT NOT NULL,
                ctime INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                visits INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;
        // mtime index keeps freshness scans off a full table walk
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ban_record_mtime ON ban_record(mtime)",
            [],
        )?;
        Ok(())
    }

    /// Insert a new record unless the IP is already present.
    ///
    /// Returns `true` if a row was created.
    pub fn insert_if_absent(
        &self,
        ip: &str,
        remark: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO ban_record (ip, remark, ctime, mtime, visits)
             VALUES (?1, ?2, ?3, ?3, 1)",
            params![ip, remark, now_ms],
        )?;
        Ok(changed > 0)
    }

    /// Point lookup by exact IP.
    pub fn get(&self, ip: &str) -> Result<Option<BanRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, ip, remark, ctime, mtime, visits FROM ban_record
                 WHERE ip = ?1 LIMIT 1",
                params![ip],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Refresh a record after a repeat event: bump the visit counter and the
    /// freshness stamp. Returns `false` when the IP has no record.
    pub fn touch(&self, ip: &str, now_ms: i64) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE ban_record SET visits = visits + 1, mtime = ?2 WHERE ip = ?1",
            params![ip, now_ms],
        )?;
        Ok(changed > 0)
    }

    /// Delete the record for `ip`. Returns `true` if a row was removed.
    pub fn delete(&self, ip: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM ban_record WHERE ip = ?1", params![ip])?;
        Ok(changed > 0)
    }

    /// Visit every record whose `mtime` is at or after `cutoff_ms` (still
    /// within the retention window). Returns the number visited.
    pub fn for_each_fresh<F>(&self, cutoff_ms: i64, f: F) -> Result<u64, StoreError>
    where
        F: FnMut(&BanRecord),
    {
        self.for_each_page("mtime >= ?2", cutoff_ms, f)
    }

    /// Visit every record whose `mtime` is strictly before `cutoff_ms`
    /// (expired). Returns the number visited.
    pub fn for_each_stale<F>(&self, cutoff_ms: i64, f: F) -> Result<u64, StoreError>
    where
        F: FnMut(&BanRecord),
    {
        self.for_each_page("mtime < ?2", cutoff_ms, f)
    }

    /// Visit every record in insertion order. Returns the number visited.
    pub fn for_each<F>(&self, f: F) -> Result<u64, StoreError>
    where
        F: FnMut(&BanRecord),
    {
        self.for_each_page("mtime >= ?2", i64::MIN, f)
    }

    /// Keyset pagination by row id, so callbacks are free to delete the
    /// rows they are handed without disturbing the scan.
    fn for_each_page<F>(&self, clause: &str, cutoff_ms: i64, mut f: F) -> Result<u64, StoreError>
    where
        F: FnMut(&BanRecord),
    {
        let sql = format!(
            "SELECT id, ip, remark, ctime, mtime, visits FROM ban_record
             WHERE id > ?1 AND {clause} ORDER BY id ASC LIMIT {}",
            self.page_size
        );
        let mut last_id = 0i64;
        let mut total = 0u64;
        loop {
            let page: Vec<BanRecord> = {
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![last_id, cutoff_ms], row_to_record)?;
                rows.collect::<Result<_, _>>()?
            };
            if page.is_empty() {
                break;
            }
            let full = page.len() == self.page_size;
            for record in &page {
                last_id = record.id;
                total += 1;
                f(record);
            }
            if !full {
                break;
            }
        }
        Ok(total)
    }
}

fn row_to_record(row: &Row<'_>) -> Result<BanRecord, rusqlite::Error> {
    Ok(BanRecord {
        id: row.get(0)?,
        ip: row.get(1)?,
        remark: row.get(2)?,
        created_at_ms: row.get(3)?,
        last_seen_at_ms: row.get(4)?,
        visit_count: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_per_ip() {
        let store = BanStore::in_memory().unwrap();
        assert!(store.insert_if_absent("9.9.9.9", "port_scan:22", 100).unwrap());
        assert!(!store.insert_if_absent("9.9.9.9", "port_scan:23", 200).unwrap());

        let record = store.get("9.9.9.9").unwrap().unwrap();
        assert_eq!(record.remark, "port_scan:22");
        assert_eq!(record.visit_count, 1);
        assert_eq!(record.created_at_ms, 100);
    }

    #[test]
    fn touch_bumps_visits_and_freshness() {
        let store = BanStore::in_memory().unwrap();
        store.insert_if_absent("9.9.9.9", "port_scan:22", 100).unwrap();
        assert!(store.touch("9.9.9.9", 500).unwrap());
        assert!(store.touch("9.9.9.9", 900).unwrap());

        let record = store.get("9.9.9.9").unwrap().unwrap();
        assert_eq!(record.visit_count, 3);
        assert_eq!(record.last_seen_at_ms, 900);
        assert_eq!(record.created_at_ms, 100);
    }

    #[test]
    fn touch_missing_ip_reports_absence() {
        let store = BanStore::in_memory().unwrap();
        assert!(!store.touch("1.2.3.4", 100).unwrap());
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let store = BanStore::in_memory().unwrap();
        store.insert_if_absent("9.9.9.9", "port_scan:22", 100).unwrap();
        assert!(store.delete("9.9.9.9").unwrap());
        assert!(!store.delete("9.9.9.9").unwrap());
        assert!(store.get("9.9.9.9").unwrap().is_none());
    }

    #[test]
    fn freshness_scans_split_on_cutoff() {
        let store = BanStore::in_memory().unwrap();
        store.insert_if_absent("1.1.1.1", "port_scan:22", 100).unwrap();
        store.insert_if_absent("2.2.2.2", "port_scan:22", 500).unwrap();
        store.insert_if_absent("3.3.3.3", "port_scan:22", 900).unwrap();

        let mut fresh = Vec::new();
        store.for_each_fresh(500, |r| fresh.push(r.ip.clone())).unwrap();
        assert_eq!(fresh, vec!["2.2.2.2", "3.3.3.3"]);

        let mut stale = Vec::new();
        store.for_each_stale(500, |r| stale.push(r.ip.clone())).unwrap();
        assert_eq!(stale, vec!["1.1.1.1"]);
    }

    #[test]
    fn pagination_survives_deletion_in_callback() {
        let store = BanStore::in_memory().unwrap();
        for i in 0..200u32 {
            let ip = format!("10.0.{}.{}", i / 256, i % 256);
            store.insert_if_absent(&ip, "port_scan:22", 1).unwrap();
        }
        let visited = store
            .for_each_stale(100, |record| {
                store.delete(&record.ip).unwrap();
            })
            .unwrap();
        assert_eq!(visited, 200);
        assert_eq!(store.for_each(|_| {}).unwrap(), 0);
    }
}
