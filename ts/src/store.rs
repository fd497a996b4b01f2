//! SQLite-backed Store implementation

use std::fs;
use std::path::Path;

use eyre::{Context, Result, bail};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use tracing::{debug, info};

use crate::now_ms;
use crate::record::{Filter, IndexValue, Page, Record};

/// Database file name inside the store directory
const DB_FILE: &str = "taskstore.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);
CREATE TABLE IF NOT EXISTS record_index (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    field TEXT NOT NULL,
    value_text TEXT,
    value_int INTEGER,
    PRIMARY KEY (collection, id, field)
);
CREATE INDEX IF NOT EXISTS idx_record_index_text ON record_index (collection, field, value_text);
CREATE INDEX IF NOT EXISTS idx_record_index_int ON record_index (collection, field, value_int);
"#;

/// Persistent record store
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store in the given directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base = path.as_ref();
        fs::create_dir_all(base).context("Failed to create store directory")?;
        let db_path = base.join(DB_FILE);
        let conn = Connection::open(&db_path).context(format!("Failed to open {}", db_path.display()))?;
        info!(path = %db_path.display(), "Opened task store");
        Self::init(conn)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("Failed to initialize schema")?;
        Ok(Self { conn })
    }

    /// Insert a new record, failing if the id is already taken
    pub fn create<T: Record>(&mut self, record: T) -> Result<String> {
        let tx = self.conn.transaction()?;
        let id = insert_record(&tx, &record)?;
        tx.commit()?;
        debug!(collection = T::collection_name(), %id, "create: stored");
        Ok(id)
    }

    /// Insert a parent and its children atomically
    ///
    /// Either every record is written or none is.
    pub fn create_with_children<P: Record, C: Record>(&mut self, parent: P, children: Vec<C>) -> Result<String> {
        let batch = self.batch()?;
        let id = batch.create(&parent)?;
        for child in &children {
            batch.create(child)?;
        }
        batch.commit()?;
        debug!(
            collection = P::collection_name(),
            %id,
            child_count = children.len(),
            "create_with_children: stored"
        );
        Ok(id)
    }

    /// Start a transactional batch of writes
    pub fn batch(&mut self) -> Result<Batch<'_>> {
        Ok(Batch {
            tx: self.conn.transaction()?,
        })
    }

    /// Fetch a record by id
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![T::collection_name(), id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|d| serde_json::from_str(&d).context("Failed to deserialize record"))
            .transpose()
    }

    /// Replace an existing record
    pub fn update<T: Record>(&mut self, record: T) -> Result<()> {
        let tx = self.conn.transaction()?;
        update_record(&tx, &record)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a record; returns false if it did not exist
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let deleted = delete_record(&tx, T::collection_name(), id)?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Delete a parent and every child whose `parent_field` points at it
    ///
    /// `child_collections` names the collections to cascade into. Returns
    /// false (and deletes nothing) if the parent does not exist.
    pub fn delete_with_children<P: Record>(
        &mut self,
        id: &str,
        parent_field: &str,
        child_collections: &[&str],
    ) -> Result<bool> {
        let tx = self.conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM records WHERE collection = ?1 AND id = ?2",
                params![P::collection_name(), id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }

        let mut child_count = 0usize;
        for collection in child_collections {
            let child_ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM record_index WHERE collection = ?1 AND field = ?2 AND value_text = ?3",
                )?;
                let rows = stmt.query_map(params![collection, parent_field, id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<String>>>()?
            };
            for child_id in &child_ids {
                delete_record(&tx, collection, child_id)?;
            }
            child_count += child_ids.len();
        }

        delete_record(&tx, P::collection_name(), id)?;
        tx.commit()?;

        debug!(collection = P::collection_name(), %id, child_count, "delete_with_children: removed");
        Ok(true)
    }

    /// List all records matching every filter, newest first
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>> {
        let (clause, values) = where_clause(T::collection_name(), filters);
        let sql = format!(
            "SELECT r.data FROM records r WHERE {} ORDER BY r.created_at DESC, r.rowid DESC",
            clause
        );
        self.query_records(&sql, values)
    }

    /// List one page of matching records plus the total match count
    pub fn list_page<T: Record>(&self, filters: &[Filter], page: Page) -> Result<(Vec<T>, usize)> {
        let total = self.count::<T>(filters)?;

        let (clause, mut values) = where_clause(T::collection_name(), filters);
        let sql = format!(
            "SELECT r.data FROM records r WHERE {} ORDER BY r.created_at DESC, r.rowid DESC LIMIT ? OFFSET ?",
            clause
        );
        values.push(Value::Integer(page.limit as i64));
        values.push(Value::Integer(page.offset as i64));

        Ok((self.query_records(&sql, values)?, total))
    }

    /// Count records matching every filter
    pub fn count<T: Record>(&self, filters: &[Filter]) -> Result<usize> {
        let (clause, values) = where_clause(T::collection_name(), filters);
        let sql = format!("SELECT COUNT(*) FROM records r WHERE {}", clause);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Recompute the index rows for every record of a type
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize> {
        let records: Vec<T> = self.list(&[])?;
        let tx = self.conn.transaction()?;
        for record in &records {
            write_indexes(&tx, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn query_records<T: Record>(&self, sql: &str, values: Vec<Value>) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let data = row?;
            records.push(serde_json::from_str(&data).context("Failed to deserialize record")?);
        }
        Ok(records)
    }
}

/// A set of writes committed together
///
/// Dropping a batch without calling [`Batch::commit`] rolls it back.
pub struct Batch<'a> {
    tx: Transaction<'a>,
}

impl Batch<'_> {
    /// Insert a record as part of the batch
    pub fn create<T: Record>(&self, record: &T) -> Result<String> {
        insert_record(&self.tx, record)
    }

    /// Replace a record as part of the batch
    pub fn update<T: Record>(&self, record: &T) -> Result<()> {
        update_record(&self.tx, record)
    }

    /// Commit all writes
    pub fn commit(self) -> Result<()> {
        self.tx.commit().context("Failed to commit batch")
    }
}

fn insert_record<T: Record>(conn: &Connection, record: &T) -> Result<String> {
    let collection = T::collection_name();
    let id = record.id().to_string();

    let exists = conn
        .query_row(
            "SELECT 1 FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        bail!("Record already exists: {}/{}", collection, id);
    }

    let data = serde_json::to_string(record).context("Failed to serialize record")?;
    conn.execute(
        "INSERT INTO records (collection, id, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![collection, id, data, now_ms(), record.updated_at()],
    )?;
    write_indexes(conn, record)?;
    Ok(id)
}

fn update_record<T: Record>(conn: &Connection, record: &T) -> Result<()> {
    let collection = T::collection_name();
    let data = serde_json::to_string(record).context("Failed to serialize record")?;
    let changed = conn.execute(
        "UPDATE records SET data = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
        params![data, record.updated_at(), collection, record.id()],
    )?;
    if changed == 0 {
        bail!("Record not found: {}/{}", collection, record.id());
    }
    write_indexes(conn, record)
}

fn delete_record(conn: &Connection, collection: &str, id: &str) -> Result<bool> {
    conn.execute(
        "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    let deleted = conn.execute(
        "DELETE FROM records WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    Ok(deleted > 0)
}

fn write_indexes<T: Record>(conn: &Connection, record: &T) -> Result<()> {
    let collection = T::collection_name();
    conn.execute(
        "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
        params![collection, record.id()],
    )?;

    for (field, value) in record.indexed_fields() {
        let (text, int) = match value {
            IndexValue::String(s) => (Some(s), None),
            IndexValue::Int(i) => (None, Some(i)),
            IndexValue::Bool(b) => (None, Some(i64::from(b))),
        };
        conn.execute(
            "INSERT INTO record_index (collection, id, field, value_text, value_int) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![collection, record.id(), field, text, int],
        )?;
    }
    Ok(())
}

/// Build the WHERE clause and positional values for a filtered query
fn where_clause(collection: &str, filters: &[Filter]) -> (String, Vec<Value>) {
    let mut clause = String::from("r.collection = ?");
    let mut values = vec![Value::Text(collection.to_string())];

    for filter in filters {
        let (column, value) = match &filter.value {
            IndexValue::String(s) => ("value_text", Value::Text(s.clone())),
            IndexValue::Int(i) => ("value_int", Value::Integer(*i)),
            IndexValue::Bool(b) => ("value_int", Value::Integer(i64::from(*b))),
        };
        clause.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM record_index i WHERE i.collection = r.collection \
             AND i.id = r.id AND i.field = ? AND i.{} {} ?)",
            column,
            filter.op.as_sql()
        ));
        values.push(Value::Text(filter.field.clone()));
        values.push(value);
    }

    (clause, values)
}
