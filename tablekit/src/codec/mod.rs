//! C9/C10/C11 — the self-describing persisted formats this crate owns (§4.5, §4.6, §6).

pub mod csv;
pub mod dat;
pub mod stream;

pub use csv::{read_csv, write_csv, CsvProperties, NewLineMode};
pub use dat::{read_table, write_table, CURRENT_VERSION};
pub use stream::{read_rows, write_rows};
