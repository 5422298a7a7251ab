//! C8 — a reader-preferred concurrency wrapper around any [`Table`] (§4.4).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::layout::RowLayout;
use crate::row::Row;
use crate::search::{ResultOption, Search};
use crate::table::Table;
use crate::transaction::Transaction;
use crate::value::Value;

/// Wraps a table so reads proceed concurrently while writes are serialized against both other
/// writes and any in-flight reads. The "wrapping an already-wrapped table fails" rule from §4.4
/// holds by construction rather than by a run-time check: [`ConcurrentTable`] exposes an
/// interior-mutable `&self` API and deliberately does not implement [`Table`] (whose mutating
/// methods take `&mut self`), so there is no `Table` value representing an existing wrapper to
/// pass back into `new`. The constructor stays fallible for call-site symmetry with the rest of
/// the crate's constructors.
pub struct ConcurrentTable<T: Table> {
	inner: Mutex<T>,
	readers: AtomicI64,
	write_lock: Mutex<()>,
	max_wait: Duration,
}

impl<T: Table> ConcurrentTable<T> {
	pub fn new(table: T) -> Result<Self> {
		Self::with_max_wait(table, Duration::from_millis(100))
	}

	pub fn with_max_wait(table: T, max_wait: Duration) -> Result<Self> {
		Ok(Self { inner: Mutex::new(table), readers: AtomicI64::new(0), write_lock: Mutex::new(()), max_wait })
	}

	fn enter_read(&self) -> ReadGuard<'_, T> {
		let previous = self.readers.fetch_add(1, Ordering::SeqCst);
		if previous < 0 {
			panic!("concurrent table reader count went negative: invariant violated");
		}
		ReadGuard { table: self }
	}

	/// Acquires the write mutex, then waits for in-flight readers to drain: 1 ms sleeps until
	/// `max_wait` elapses, then a tight yield loop (§4.4).
	fn enter_write(&self) -> WriteGuard<'_> {
		#[cfg(feature = "tracing")]
		let span = tracing::trace_span!("concurrent_table_write_wait").entered();
		let guard = self.write_lock.lock().expect("write mutex poisoned");
		let started = Instant::now();
		while self.readers.load(Ordering::SeqCst) > 0 {
			if self.max_wait.is_zero() || started.elapsed() < self.max_wait {
				std::thread::sleep(Duration::from_millis(1));
			} else {
				std::thread::yield_now();
			}
		}
		#[cfg(feature = "tracing")]
		drop(span);
		WriteGuard { _mutex_guard: guard }
	}

	pub fn layout(&self) -> Arc<RowLayout> {
		self.enter_read().table.inner.lock().expect("table mutex poisoned").layout().clone()
	}

	pub fn is_read_only(&self) -> bool {
		self.enter_read().table.inner.lock().expect("table mutex poisoned").is_read_only()
	}

	pub fn count(&self, search: Option<&Search>) -> Result<usize> {
		let _guard = self.enter_read();
		self.inner.lock().expect("table mutex poisoned").count(search)
	}

	pub fn exists(&self, search: &Search) -> Result<bool> {
		let _guard = self.enter_read();
		self.inner.lock().expect("table mutex poisoned").exists(search)
	}

	pub fn get_row(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Option<Row>> {
		let _guard = self.enter_read();
		self.inner.lock().expect("table mutex poisoned").get_row(search, options)
	}

	pub fn get_rows(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Vec<Row>> {
		let _guard = self.enter_read();
		self.inner.lock().expect("table mutex poisoned").get_rows(search, options)
	}

	pub fn get_row_at(&self, index: usize) -> Result<Row> {
		let _guard = self.enter_read();
		self.inner.lock().expect("table mutex poisoned").get_row_at(index)
	}

	pub fn sum(&self, field: &str, search: Option<&Search>) -> Result<Value> {
		let _guard = self.enter_read();
		self.inner.lock().expect("table mutex poisoned").sum(field, search)
	}

	pub fn clear(&self) -> Result<()> {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").clear()
	}

	pub fn insert(&self, row: Row) -> Result<Row> {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").insert(row)
	}

	pub fn update(&self, row: Row) -> Result<()> {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").update(row)
	}

	pub fn replace(&self, row: Row) -> Result<()> {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").replace(row)
	}

	pub fn delete(&self, row: &Row) -> Result<()> {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").delete(row)
	}

	pub fn try_delete(&self, search: &Search) -> bool {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").try_delete(search)
	}

	pub fn set_value(&self, row: &Row, field: &str, value: Value) -> Result<Row> {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").set_value(row, field, value)
	}

	pub fn commit(&self, transactions: Vec<Transaction>) -> Result<usize> {
		let _guard = self.enter_write();
		self.inner.lock().expect("table mutex poisoned").commit(transactions)
	}
}

struct ReadGuard<'a, T: Table> {
	table: &'a ConcurrentTable<T>,
}

impl<T: Table> Drop for ReadGuard<'_, T> {
	fn drop(&mut self) {
		let previous = self.table.readers.fetch_sub(1, Ordering::SeqCst);
		if previous <= 0 {
			panic!("concurrent table reader count went negative: invariant violated");
		}
	}
}

struct WriteGuard<'a> {
	_mutex_guard: std::sync::MutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::layout::LayoutBuilder;
	use crate::memory::MemoryTable;
	use crate::types::DataType;
	use std::sync::Arc as StdArc;

	fn layout() -> StdArc<RowLayout> {
		StdArc::new(
			LayoutBuilder::new("Item")
				.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID | FieldFlags::AUTO_INCREMENT))
				.build()
				.unwrap(),
		)
	}

	#[test]
	fn concurrent_reads_and_writes_are_serialized_correctly() {
		let layout = layout();
		let table = ConcurrentTable::new(MemoryTable::new(layout.clone())).unwrap();
		let inserted = table.insert(Row::new(layout.clone(), vec![Value::Int64(0)]).unwrap()).unwrap();
		assert_eq!(inserted.get(0), Some(&Value::Int64(1)));
		assert_eq!(table.count(None).unwrap(), 1);
	}

	#[test]
	fn readers_run_concurrently_without_blocking_each_other() {
		let layout = layout();
		let table = Arc::new(ConcurrentTable::new(MemoryTable::new(layout.clone())).unwrap());
		table.insert(Row::new(layout.clone(), vec![Value::Int64(0)]).unwrap()).unwrap();
		std::thread::scope(|scope| {
			for _ in 0..4 {
				let table = table.clone();
				scope.spawn(move || {
					assert_eq!(table.count(None).unwrap(), 1);
				});
			}
		});
	}
}
