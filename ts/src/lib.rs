//! TaskStore - generic persistent record store
//!
//! Stores any serde-serializable type implementing [`Record`] as a JSON
//! document in SQLite, alongside a side table of indexed fields that can be
//! filtered on without deserializing every row.
//!
//! # Architecture
//!
//! ```text
//! {store_path}/
//! └── taskstore.db
//!     ├── records        (collection, id, data, created_at, updated_at)
//!     └── record_index   (collection, id, field, value_text, value_int)
//! ```
//!
//! Parent/child relationships are expressed through an indexed field on the
//! child (e.g. `task_id`). [`Store::create_with_children`] writes a parent and
//! its children in one transaction; [`Store::delete_with_children`] removes a
//! parent together with every child pointing at it.
//!
//! # Example
//!
//! ```ignore
//! use taskstore::{Filter, Store};
//!
//! let mut store = Store::open(".calibrate")?;
//! store.create(task)?;
//! let planned: Vec<Task> = store.list(&[Filter::eq("status", "planned")])?;
//! ```

mod record;
mod store;

pub use record::{Filter, FilterOp, IndexValue, Page, Record};
pub use store::{Batch, Store};

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
