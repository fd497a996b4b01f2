//! Record trait and query types

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// A persistable document
///
/// Implementors are stored as JSON in the collection named by
/// [`Record::collection_name`]. Fields returned from [`Record::indexed_fields`]
/// are written to the index table and can be used in [`Filter`]s.
pub trait Record: Serialize + DeserializeOwned + Send {
    /// Unique identifier within the collection
    fn id(&self) -> &str;

    /// Last update timestamp (Unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Collection (logical table) name
    fn collection_name() -> &'static str;

    /// Fields to index for filtering
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// Value of an indexed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for IndexValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Comparison operator for a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Filter on an indexed field
///
/// A record matches only if it has the field indexed and the comparison
/// holds. Records that do not index the field never match, including for
/// [`FilterOp::Ne`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    /// Equality filter
    pub fn eq(field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// Filter with an explicit operator
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// Offset/limit window for paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// Build a window from a 1-based page number and page size
    ///
    /// Page 0 is treated as page 1.
    pub fn number(page: usize, page_size: usize) -> Self {
        Self {
            offset: page.saturating_sub(1) * page_size,
            limit: page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number() {
        assert_eq!(Page::number(1, 20), Page { offset: 0, limit: 20 });
        assert_eq!(Page::number(3, 10), Page { offset: 20, limit: 10 });
        assert_eq!(Page::number(0, 10), Page { offset: 0, limit: 10 });
    }

    #[test]
    fn test_filter_eq_from_str() {
        let filter = Filter::eq("status", "planned");
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value, IndexValue::String("planned".to_string()));
    }

    #[test]
    fn test_filter_op_sql() {
        assert_eq!(FilterOp::Eq.as_sql(), "=");
        assert_eq!(FilterOp::Ne.as_sql(), "<>");
        assert_eq!(FilterOp::Lte.as_sql(), "<=");
    }
}
