//! A typed, storage-agnostic table abstraction: reflective row layouts, a composable search
//! algebra, an indexed in-memory engine, a reader-preferred concurrency wrapper, and versioned
//! binary/CSV codecs.
//!
//! Applications define row shapes as ordinary record types (via `#[derive(TableRow)]` or
//! [`layout::LayoutBuilder`]), map them onto a [`table::Table`] back-end, and query/mutate
//! through [`search::Search`]/[`search::ResultOption`] regardless of which back-end is behind it.

pub mod codec;
pub mod concurrent;
pub mod error;
pub mod field;
pub mod layout;
pub mod memory;
pub mod row;
pub mod search;
pub mod table;
pub mod transaction;
pub mod types;
pub mod value;
pub mod varint;

pub use codec::{CsvProperties, NewLineMode};
pub use concurrent::ConcurrentTable;
pub use error::{Error, Result};
pub use field::{FieldFlags, FieldProperties};
pub use layout::{LayoutBuilder, RowLayout};
pub use memory::{MemoryTable, MemoryTableOptions};
pub use row::{Identifier, Row};
pub use search::{AnsiQuoting, Quoting, ResultOption, Search};
pub use table::{KeyedTable, Schema, Table, TypedTable};
pub use transaction::{Transaction, TransactionFlags, TransactionKind};
pub use types::{DataType, DateTimeKind, DateTimeType, StringEncoding};
pub use value::Value;

/// Derives [`Schema`] for a record type from `#[field(...)]` and sibling attributes, the
/// compile-time replacement for runtime attribute scanning (§4.1.1).
pub use tablekit_derive::TableRow;
