//! C7 — the in-memory table engine: an `IndexMap`-backed row store (preserving insertion
//! order) with per-field [`field_index::FieldIndex`]es over `ID`/`Index`-flagged columns.

mod field_index;

pub use field_index::FieldIndex;

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::field::FieldProperties;
use crate::layout::RowLayout;
use crate::row::{Identifier, Row};
use crate::search::{ResultOption, ScanSource, Search};
use crate::table::Table;
use crate::transaction::TransactionFlags;
use crate::types::DataType;
use crate::value::Value;

/// Rows loaded per page by [`MemoryTable::load_table`].
const TRANSACTION_ROW_COUNT: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTableOptions {
	/// Skips building any [`FieldIndex`], even over `ID`/`Index`-flagged columns.
	pub disable_index: bool,
}

/// A source a [`MemoryTable`] can be bulk-loaded from (`LoadTable`, §4.3): a known row count
/// plus a row iterator, e.g. a codec reader.
pub trait RowSource {
	fn row_count(&self) -> usize;
	fn rows(&mut self) -> &mut dyn Iterator<Item = Row>;
}

#[derive(Debug)]
pub struct MemoryTable {
	layout: Arc<RowLayout>,
	rows: IndexMap<Identifier, Row>,
	indices: Vec<Option<FieldIndex>>,
	identifier_fields: Vec<usize>,
	read_only: bool,
	sequence_number: u64,
	options: MemoryTableOptions,
}

impl MemoryTable {
	pub fn new(layout: Arc<RowLayout>) -> Self {
		Self::with_options(layout, MemoryTableOptions::default())
	}

	pub fn with_options(layout: Arc<RowLayout>, options: MemoryTableOptions) -> Self {
		let indices = build_indices(&layout, options);
		let identifier_fields: Vec<usize> = layout.identifier_fields().map(|f| f.index).collect();
		Self { layout, rows: IndexMap::new(), indices, identifier_fields, read_only: false, sequence_number: 0, options }
	}

	pub fn freeze(&mut self) {
		self.read_only = true;
	}

	pub fn sequence_number(&self) -> u64 {
		self.sequence_number
	}

	fn identifier_for(&self, row: &Row) -> Identifier {
		if self.identifier_fields.is_empty() {
			let all: Vec<usize> = (0..self.layout.field_count()).collect();
			row.identifier(&all)
		} else {
			row.identifier(&self.identifier_fields)
		}
	}

	fn positions(&self, search: Option<&Search>) -> Result<Vec<usize>> {
		match search {
			Some(search) => search.scan(&self.layout, self, None),
			None => Ok((0..self.rows.len()).collect()),
		}
	}

	fn positions_with_options(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Vec<usize>> {
		let positions = self.positions(search)?;
		match options {
			Some(options) => options.apply(&self.layout, self, positions),
			None => Ok(positions),
		}
	}

	fn values_at(&self, field: &str, positions: &[usize]) -> Result<(usize, DataType, Vec<Value>)> {
		let idx = self.layout.require_field_index(field, false)?;
		let data_type = self.layout.field(idx).expect("resolved index is in bounds").data_type;
		let values = positions.iter().map(|&p| self.rows.get_index(p).expect("scan position in bounds").1.get(idx).cloned().unwrap_or(Value::Null)).collect();
		Ok((idx, data_type, values))
	}

	fn next_auto_increment(&self, field: &FieldProperties) -> Result<Value> {
		match field.data_type {
			DataType::Int8
			| DataType::Int16
			| DataType::Int32
			| DataType::Int64
			| DataType::UInt8
			| DataType::UInt16
			| DataType::UInt32
			| DataType::UInt64 => {
				let current_max = self.rows.values().filter_map(|r| r.get(field.index)).map(as_i128).max().unwrap_or(0);
				let next = current_max + 1;
				Ok(match field.data_type {
					DataType::Int8 => Value::Int8(next as i8),
					DataType::Int16 => Value::Int16(next as i16),
					DataType::Int32 => Value::Int32(next as i32),
					DataType::Int64 => Value::Int64(next as i64),
					DataType::UInt8 => Value::UInt8(next as u8),
					DataType::UInt16 => Value::UInt16(next as u16),
					DataType::UInt32 => Value::UInt32(next as u32),
					DataType::UInt64 => Value::UInt64(next as u64),
					_ => unreachable!(),
				})
			}
			DataType::DateTime => Ok(Value::DateTime(Utc::now())),
			DataType::Guid => Ok(Value::Guid(Uuid::new_v4())),
			DataType::User => Ok(Value::User(Uuid::new_v4().to_string())),
			other => Err(Error::UnsupportedSchema(format!("AutoIncrement is not supported for data type {other:?}"))),
		}
	}

	/// Bulk-loads rows from `source` in pages of [`TRANSACTION_ROW_COUNT`], reporting progress
	/// via `callback` after each page (`LoadTable`, §4.3). When `search` is `Some`, only rows
	/// matching it are inserted and the final row-count invariant below is skipped, since
	/// filtering legitimately shrinks the loaded set.
	pub fn load_table(&mut self, source: &mut dyn RowSource, search: Option<&Search>, mut callback: Option<&mut dyn FnMut(usize, usize)>) -> Result<usize> {
		let total = source.row_count();
		let mut loaded = 0usize;
		let mut page = Vec::with_capacity(TRANSACTION_ROW_COUNT);
		loop {
			page.clear();
			for row in source.rows().take(TRANSACTION_ROW_COUNT) {
				page.push(row);
			}
			if page.is_empty() {
				break;
			}
			for row in page.drain(..) {
				if let Some(search) = search {
					if !search.check(&self.layout, &row)? {
						continue;
					}
				}
				self.insert(row)?;
				loaded += 1;
			}
			if let Some(callback) = callback.as_deref_mut() {
				callback(loaded, total);
			}
		}
		if search.is_none() && self.rows.len() != total {
			return Err(Error::InconsistentSource { expected: total, loaded: self.rows.len() });
		}
		Ok(loaded)
	}
}

fn build_indices(layout: &RowLayout, options: MemoryTableOptions) -> Vec<Option<FieldIndex>> {
	if options.disable_index {
		return (0..layout.field_count()).map(|_| None).collect();
	}
	layout
		.fields()
		.iter()
		.map(|field| {
			if field.flags.contains(crate::field::FieldFlags::ID) || field.flags.contains(crate::field::FieldFlags::INDEX) {
				Some(FieldIndex::new())
			} else {
				None
			}
		})
		.collect()
}

fn as_i128(value: &Value) -> i128 {
	match value {
		Value::Int8(n) => *n as i128,
		Value::Int16(n) => *n as i128,
		Value::Int32(n) => *n as i128,
		Value::Int64(n) => *n as i128,
		Value::UInt8(n) => *n as i128,
		Value::UInt16(n) => *n as i128,
		Value::UInt32(n) => *n as i128,
		Value::UInt64(n) => *n as i128,
		_ => 0,
	}
}

fn as_f64(value: &Value) -> f64 {
	match value {
		Value::Single(n) => *n as f64,
		Value::Double(n) => *n,
		_ => as_i128(value) as f64,
	}
}

fn as_decimal(value: &Value) -> Decimal {
	match value {
		Value::Decimal(d) => *d,
		Value::Single(n) => Decimal::try_from(*n as f64).unwrap_or(Decimal::ZERO),
		Value::Double(n) => Decimal::try_from(*n).unwrap_or(Decimal::ZERO),
		_ => Decimal::from(as_i128(value) as i64),
	}
}

impl ScanSource for MemoryTable {
	fn len(&self) -> usize {
		self.rows.len()
	}

	fn row_at(&self, position: usize) -> &Row {
		self.rows.get_index(position).expect("position in bounds").1
	}

	fn index_lookup(&self, field_index: usize, value: &Value) -> Option<Vec<usize>> {
		let index = self.indices.get(field_index)?.as_ref()?;
		let identifiers = index.get(value)?;
		Some(identifiers.iter().filter_map(|id| self.rows.get_index_of(id)).collect())
	}
}

impl Table for MemoryTable {
	fn layout(&self) -> &Arc<RowLayout> {
		&self.layout
	}

	fn is_read_only(&self) -> bool {
		self.read_only
	}

	fn clear(&mut self) -> Result<()> {
		self.rows.clear();
		self.indices = build_indices(&self.layout, self.options);
		self.sequence_number += 1;
		Ok(())
	}

	fn count(&self, search: Option<&Search>) -> Result<usize> {
		Ok(self.positions(search)?.len())
	}

	fn exists(&self, search: &Search) -> Result<bool> {
		Ok(!self.positions(Some(search))?.is_empty())
	}

	fn get_row(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Option<Row>> {
		let positions = self.positions_with_options(search, options)?;
		Ok(positions.first().map(|&p| self.rows.get_index(p).expect("position in bounds").1.clone()))
	}

	fn get_rows(&self, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Vec<Row>> {
		let positions = self.positions_with_options(search, options)?;
		Ok(positions.iter().map(|&p| self.rows.get_index(p).expect("position in bounds").1.clone()).collect())
	}

	fn get_row_at(&self, index: usize) -> Result<Row> {
		self.rows.get_index(index).map(|(_, row)| row.clone()).ok_or_else(|| Error::NotFound(format!("no row at ordinal position {index}")))
	}

	fn distinct(&self, field: &str, search: Option<&Search>) -> Result<Vec<Value>> {
		let positions = self.positions(search)?;
		let (_, _, values) = self.values_at(field, &positions)?;
		let mut seen = std::collections::HashSet::new();
		Ok(values.into_iter().filter(|v| seen.insert(v.clone())).collect())
	}

	fn get_values(&self, field: &str, search: Option<&Search>, options: Option<&ResultOption>) -> Result<Vec<Value>> {
		let positions = self.positions_with_options(search, options)?;
		let (_, _, values) = self.values_at(field, &positions)?;
		Ok(values)
	}

	fn minimum(&self, field: &str, search: Option<&Search>) -> Result<Option<Value>> {
		let positions = self.positions(search)?;
		let (_, _, values) = self.values_at(field, &positions)?;
		Ok(values.into_iter().filter(|v| !v.is_null()).min())
	}

	fn maximum(&self, field: &str, search: Option<&Search>) -> Result<Option<Value>> {
		let positions = self.positions(search)?;
		let (_, _, values) = self.values_at(field, &positions)?;
		Ok(values.into_iter().filter(|v| !v.is_null()).max())
	}

	fn sum(&self, field: &str, search: Option<&Search>) -> Result<Value> {
		let positions = self.positions(search)?;
		let (_, data_type, values) = self.values_at(field, &positions)?;
		Ok(match data_type {
			DataType::Int8 => Value::Int8(values.iter().map(as_i128).sum::<i128>() as i8),
			DataType::Int16 => Value::Int16(values.iter().map(as_i128).sum::<i128>() as i16),
			DataType::Int32 => Value::Int32(values.iter().map(as_i128).sum::<i128>() as i32),
			DataType::Int64 => Value::Int64(values.iter().map(as_i128).sum::<i128>() as i64),
			DataType::UInt8 => Value::UInt8(values.iter().map(as_i128).sum::<i128>() as u8),
			DataType::UInt16 => Value::UInt16(values.iter().map(as_i128).sum::<i128>() as u16),
			DataType::UInt32 => Value::UInt32(values.iter().map(as_i128).sum::<i128>() as u32),
			DataType::UInt64 => Value::UInt64(values.iter().map(as_i128).sum::<i128>() as u64),
			DataType::Single => Value::Single(values.iter().map(as_f64).sum::<f64>() as f32),
			DataType::Double => Value::Double(values.iter().map(as_f64).sum::<f64>()),
			DataType::Decimal => Value::Decimal(values.iter().map(as_decimal).sum()),
			other => return Err(Error::UnsupportedSchema(format!("sum is not supported for field '{field}' of type {other:?}"))),
		})
	}

	fn insert(&mut self, row: Row) -> Result<Row> {
		self.insert_with_flags(row, TransactionFlags::empty())
	}

	fn insert_with_flags(&mut self, row: Row, flags: TransactionFlags) -> Result<Row> {
		if self.read_only {
			return Err(Error::ReadOnly);
		}
		let mut row = row;
		if !flags.contains(TransactionFlags::NO_AUTO_INCREMENT) {
			for &idx in &self.identifier_fields {
				let field = self.layout.field(idx).expect("identifier field index is valid");
				if field.flags.contains(crate::field::FieldFlags::AUTO_INCREMENT) {
					let value = self.next_auto_increment(field)?;
					row = row.with_value(idx, value)?;
				}
			}
		}
		let identifier = self.identifier_for(&row);
		if self.rows.contains_key(&identifier) {
			return Err(Error::InvariantViolated(format!("row with identifier {:?} already exists in table '{}'", identifier.values(), self.layout.name())));
		}
		for (idx, index) in self.indices.iter_mut().enumerate() {
			if let Some(index) = index {
				index.insert(row.get(idx).cloned().unwrap_or(Value::Null), identifier.clone());
			}
		}
		self.rows.insert(identifier, row.clone());
		self.sequence_number += 1;
		Ok(row)
	}

	fn update(&mut self, row: Row) -> Result<()> {
		if self.read_only {
			return Err(Error::ReadOnly);
		}
		let identifier = self.identifier_for(&row);
		let existing = self.rows.get(&identifier).ok_or_else(|| Error::NotFound(format!("no row with identifier {:?} in table '{}'", identifier.values(), self.layout.name())))?.clone();
		for (idx, index) in self.indices.iter_mut().enumerate() {
			if let Some(index) = index {
				let old_value = existing.get(idx).cloned().unwrap_or(Value::Null);
				let new_value = row.get(idx).cloned().unwrap_or(Value::Null);
				index.replace(&old_value, new_value, &identifier);
			}
		}
		self.rows.insert(identifier, row);
		Ok(())
	}

	fn replace(&mut self, row: Row) -> Result<()> {
		let identifier = self.identifier_for(&row);
		if self.rows.contains_key(&identifier) {
			self.update(row)
		} else {
			self.insert(row).map(|_| ())
		}
	}

	fn delete(&mut self, row: &Row) -> Result<()> {
		if self.read_only {
			return Err(Error::ReadOnly);
		}
		let identifier = self.identifier_for(row);
		let (_, _, removed_row) = self
			.rows
			.shift_remove_full(&identifier)
			.ok_or_else(|| Error::NotFound(format!("no row with identifier {:?} in table '{}'", identifier.values(), self.layout.name())))?;
		for (idx, index) in self.indices.iter_mut().enumerate() {
			if let Some(index) = index {
				index.remove(&removed_row.get(idx).cloned().unwrap_or(Value::Null), &identifier);
			}
		}
		Ok(())
	}

	fn set_value(&mut self, row: &Row, field: &str, value: Value) -> Result<Row> {
		let idx = self.layout.require_field_index(field, false)?;
		let old_identifier = self.identifier_for(row);
		let new_row = row.with_value(idx, value)?;
		let new_identifier = self.identifier_for(&new_row);
		if old_identifier == new_identifier {
			self.update(new_row.clone())?;
		} else {
			self.delete(row)?;
			self.insert(new_row.clone())?;
		}
		Ok(new_row)
	}

	fn commit(&mut self, transactions: Vec<crate::transaction::Transaction>) -> Result<usize> {
		crate::table::commit(self, transactions)
	}

	fn use_layout(&mut self, layout: Arc<RowLayout>) -> Result<()> {
		self.layout = layout;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::layout::LayoutBuilder;

	fn layout() -> Arc<RowLayout> {
		Arc::new(
			LayoutBuilder::new("Item")
				.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID | FieldFlags::AUTO_INCREMENT))
				.field(FieldProperties::new(1, "name", DataType::String, FieldFlags::INDEX))
				.field(FieldProperties::new(2, "amount", DataType::Int64, FieldFlags::empty()))
				.build()
				.unwrap(),
		)
	}

	fn row(layout: &Arc<RowLayout>, id: i64, name: &str, amount: i64) -> Row {
		Row::new(layout.clone(), vec![Value::Int64(id), Value::String(name.into()), Value::Int64(amount)]).unwrap()
	}

	#[test]
	fn insert_assigns_auto_increment_and_bumps_sequence() {
		let layout = layout();
		let mut table = MemoryTable::new(layout.clone());
		let inserted = table.insert(row(&layout, 0, "a", 1)).unwrap();
		assert_eq!(inserted.get(0), Some(&Value::Int64(1)));
		let inserted = table.insert(row(&layout, 0, "b", 2)).unwrap();
		assert_eq!(inserted.get(0), Some(&Value::Int64(2)));
		assert_eq!(table.sequence_number(), 2);
	}

	#[test]
	fn duplicate_identifier_is_invariant_violation() {
		let layout = layout();
		let mut table = MemoryTable::new(layout.clone());
		table.insert(row(&layout, 1, "a", 1)).unwrap();
		let err = table.insert(Row::new(layout.clone(), vec![Value::Int64(1), Value::String("b".into()), Value::Int64(2)]).unwrap()).unwrap_err();
		assert!(matches!(err, Error::InvariantViolated(_)));
	}

	#[test]
	fn delete_then_get_row_at_reflects_insertion_order() {
		let layout = layout();
		let mut table = MemoryTable::new(layout.clone());
		table.insert(row(&layout, 1, "a", 1)).unwrap();
		table.insert(row(&layout, 2, "b", 2)).unwrap();
		table.insert(row(&layout, 3, "c", 3)).unwrap();
		table.delete(&row(&layout, 2, "b", 2)).unwrap();
		assert_eq!(table.get_row_at(0).unwrap().get(0), Some(&Value::Int64(1)));
		assert_eq!(table.get_row_at(1).unwrap().get(0), Some(&Value::Int64(3)));
	}

	#[test]
	fn index_lookup_is_used_for_equality_search() {
		let layout = layout();
		let mut table = MemoryTable::new(layout.clone());
		table.insert(row(&layout, 1, "a", 1)).unwrap();
		table.insert(row(&layout, 2, "b", 2)).unwrap();
		let found = table.get_rows(Some(&Search::equals("name", Value::String("b".into()))), None).unwrap();
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].get(0), Some(&Value::Int64(2)));
	}

	#[test]
	fn sum_and_aggregate_fields() {
		let layout = layout();
		let mut table = MemoryTable::new(layout.clone());
		table.insert(row(&layout, 1, "a", 1)).unwrap();
		table.insert(row(&layout, 2, "b", 5)).unwrap();
		assert_eq!(table.sum("amount", None).unwrap(), Value::Int64(6));
		assert_eq!(table.maximum("amount", None).unwrap(), Some(Value::Int64(5)));
	}
}
