use thiserror::Error;

/// The closed error taxonomy surfaced by every table back-end, codec and wrapper in this crate.
///
/// Callers match exhaustively on this rather than on per-component error types; the concurrent
/// wrapper and the `Try*` table methods are the only places that swallow a variant into a `bool`.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("invalid schema: {0}")]
	InvalidSchema(String),

	#[error("unsupported schema: {0}")]
	UnsupportedSchema(String),

	#[error("invariant violated: {0}")]
	InvariantViolated(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("table is read-only")]
	ReadOnly,

	#[error("malformed input: {0}")]
	MalformedInput(String),

	#[error("inconsistent source: expected {expected} rows, loaded {loaded}")]
	InconsistentSource { expected: usize, loaded: usize },

	#[error("operation on a disposed resource")]
	Disposed,

	#[error("unsupported format version: {0}")]
	VersionUnsupported(i64),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
