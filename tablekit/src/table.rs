//! C6 — the table contract every back-end implements, plus the typed and keyed wrappers
//! overlaid on top of it (§4.7).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::layout::RowLayout;
use crate::row::Row;
use crate::search::{ResultOption, Search};
use crate::transaction::{Transaction, TransactionKind};
use crate::value::Value;

/// The untyped operations every storage back-end (in-memory engine, SQL driver, codec-backed
/// table) must expose. Object-safe so callers can hold `Box<dyn Table>`/`&dyn Table` without
/// committing to a concrete engine.
pub trait Table {
	fn layout(&self) -> &Arc<RowLayout>;
	fn is_read_only(&self) -> bool;

	fn clear(&mut self) -> Result<()>;
	fn count(&self, search: Option<&Search>) -> Result<usize>;
	fn exists(&self, search: &Search) -> Result<bool>;

	fn get_row(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Option<Row>>;
	fn get_rows(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Vec<Row>>;
	fn get_row_at(&self, index: usize) -> Result<Row>;

	fn distinct(&self, field: &str, search: Option<&Search>) -> Result<Vec<Value>>;
	fn get_values(&self, field: &str, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Vec<Value>>;
	fn minimum(&self, field: &str, search: Option<&Search>) -> Result<Option<Value>>;
	fn maximum(&self, field: &str, search: Option<&Search>) -> Result<Option<Value>>;
	fn sum(&self, field: &str, search: Option<&Search>) -> Result<Value>;

	fn insert(&mut self, row: Row) -> Result<Row>;
	fn update(&mut self, row: Row) -> Result<()>;
	/// `Insert` honoring a transaction's [`crate::transaction::TransactionFlags`] (currently only
	/// `NO_AUTO_INCREMENT` affects insertion). The default ignores the flags and defers to
	/// [`Table::insert`]; back-ends with auto-increment fields override it.
	fn insert_with_flags(&mut self, row: Row, _flags: crate::transaction::TransactionFlags) -> Result<Row> {
		self.insert(row)
	}
	fn replace(&mut self, row: Row) -> Result<()>;
	fn delete(&mut self, row: &Row) -> Result<()>;

	fn set_value(&mut self, row: &Row, field: &str, value: Value) -> Result<Row>;
	fn commit(&mut self, transactions: Vec<Transaction>) -> Result<usize>;
	fn use_layout(&mut self, layout: Arc<RowLayout>) -> Result<()>;

	/// Inserts every row of `rows`, in order. The default implementation calls [`Table::insert`]
	/// once per row; back-ends that batch writes can override this.
	fn insert_many(&mut self, rows: Vec<Row>) -> Result<Vec<Row>> {
		rows.into_iter().map(|r| self.insert(r)).collect()
	}

	/// `Delete` that reports success instead of propagating `NotFound`, used by callers that
	/// treat "nothing matched" as a no-op rather than an error (`TryDelete`, §4.7).
	fn try_delete(&mut self, search: &Search) -> bool {
		let row = match self.get_row(Some(search), None) {
			Ok(Some(row)) => row,
			_ => return false,
		};
		match self.delete(&row) {
			Ok(()) => true,
			Err(err) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(table = %self.layout().name(), error = %err, "try_delete failed");
				#[cfg(not(feature = "tracing"))]
				let _ = err;
				false
			}
		}
	}
}

/// Materializes a record type to and from a [`Row`] via a fixed [`RowLayout`]. Implemented by
/// `#[derive(TableRow)]` and usable by hand for record types a macro shouldn't touch.
pub trait Schema: Sized {
	fn layout() -> Arc<RowLayout>;
	fn into_row(self) -> Row;
	fn from_row(row: &Row) -> Result<Self>;
}

/// Overlays `T`-shaped methods on an untyped [`Table`], (de)materializing rows through `T`'s
/// [`Schema`] implementation (§4.7).
pub struct TypedTable<T: Schema> {
	inner: Box<dyn Table>,
	_marker: std::marker::PhantomData<T>,
}

impl<T: Schema> TypedTable<T> {
	pub fn new(inner: Box<dyn Table>) -> Result<Self> {
		if inner.layout().as_ref() != T::layout().as_ref() {
			return Err(Error::InvalidSchema(format!(
				"table layout '{}' does not match schema layout '{}'",
				inner.layout().name(),
				T::layout().name()
			)));
		}
		Ok(Self { inner, _marker: std::marker::PhantomData })
	}

	pub fn layout(&self) -> &Arc<RowLayout> {
		self.inner.layout()
	}

	pub fn count(&self, search: Option<&Search>) -> Result<usize> {
		self.inner.count(search)
	}

	pub fn get(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Option<T>> {
		self.inner.get_row(search, options)?.map(|row| T::from_row(&row)).transpose()
	}

	pub fn get_all(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Vec<T>> {
		self.inner.get_rows(search, options)?.iter().map(T::from_row).collect()
	}

	pub fn insert(&mut self, value: T) -> Result<T> {
		let row = self.inner.insert(value.into_row())?;
		T::from_row(&row)
	}

	pub fn update(&mut self, value: T) -> Result<()> {
		self.inner.update(value.into_row())
	}

	pub fn replace(&mut self, value: T) -> Result<()> {
		self.inner.replace(value.into_row())
	}

	pub fn delete(&mut self, value: &T) -> Result<()>
	where
		T: Clone,
	{
		self.inner.delete(&value.clone().into_row())
	}

	pub fn clear(&mut self) -> Result<()> {
		self.inner.clear()
	}
}

/// A [`TypedTable`] additionally indexed by a key projected out of each row (`this[TKey]`,
/// `GetDictionary`, §4.7). Rust has no fallible indexer sugar, so `this[key]` becomes `get`.
pub struct KeyedTable<K, T: Schema> {
	table: TypedTable<T>,
	key_field: String,
	extract_key: fn(&T) -> K,
}

impl<K, T> KeyedTable<K, T>
where
	K: Eq + Hash + Clone + Into<Value>,
	T: Schema + Clone,
{
	pub fn new(table: TypedTable<T>, key_field: impl Into<String>, extract_key: fn(&T) -> K) -> Self {
		Self { table, key_field: key_field.into(), extract_key }
	}

	pub fn get(&self, key: &K) -> Result<Option<T>> {
		let search = Search::equals(&self.key_field, key.clone().into());
		self.table.get(Some(&search), None)
	}

	pub fn exists(&self, key: &K) -> Result<bool> {
		Ok(self.get(key)?.is_some())
	}

	pub fn get_dictionary(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<HashMap<K, T>> {
		let rows = self.table.get_all(search, options)?;
		Ok(rows.into_iter().map(|row| ((self.extract_key)(&row), row)).collect())
	}

	pub fn insert(&mut self, value: T) -> Result<T> {
		self.table.insert(value)
	}

	pub fn delete(&mut self, key: &K) -> Result<()> {
		let existing = self.get(key)?.ok_or_else(|| Error::NotFound(format!("no row with key for field '{}'", self.key_field)))?;
		self.table.delete(&existing)
	}
}

/// Applies a [`Transaction`] list in order against a table, returning the number committed
/// (`Commit`, §4.7). `NO_AUTO_INCREMENT`/`IGNORE_MISSING` flags are honored per transaction.
pub fn commit(table: &mut dyn Table, transactions: Vec<Transaction>) -> Result<usize> {
	let mut count = 0;
	for transaction in transactions {
		let ignore_missing = transaction.flags.contains(crate::transaction::TransactionFlags::IGNORE_MISSING);
		let outcome = match transaction.kind {
			TransactionKind::Insert => table.insert_with_flags(transaction.row, transaction.flags).map(|_| ()),
			TransactionKind::Replace => table.replace(transaction.row),
			TransactionKind::Update => table.update(transaction.row),
			TransactionKind::Delete => table.delete(&transaction.row),
		};
		match outcome {
			Ok(()) => count += 1,
			Err(Error::NotFound(_)) if ignore_missing => {}
			Err(err) => return Err(err),
		}
	}
	Ok(count)
}
