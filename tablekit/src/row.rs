//! C4 — rows and identifiers.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::layout::RowLayout;
use crate::value::Value;

/// `(layout, values[])`. Immutable from the caller's perspective: every mutating table
/// operation takes or returns a new `Row` rather than patching one in place.
#[derive(Debug, Clone)]
pub struct Row {
	layout: Arc<RowLayout>,
	values: Vec<Value>,
}

impl Row {
	pub fn new(layout: Arc<RowLayout>, values: Vec<Value>) -> Result<Self> {
		if values.len() < layout.field_count() {
			return Err(Error::InvalidArgument(format!(
				"row for layout '{}' has {} values, expected at least {}",
				layout.name(),
				values.len(),
				layout.field_count()
			)));
		}
		Ok(Self { layout, values })
	}

	/// Builds a row whose every column holds its field's default (or `Value::Null` when
	/// nullable), used as the starting point for partial inserts.
	pub fn default_for(layout: Arc<RowLayout>) -> Self {
		let values = layout
			.fields()
			.iter()
			.map(|f| if f.is_nullable() { Value::Null } else { crate::value::Value::default_for(f.data_type) })
			.collect();
		Self { layout, values }
	}

	pub fn layout(&self) -> &Arc<RowLayout> {
		&self.layout
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn get(&self, index: usize) -> Option<&Value> {
		self.values.get(index)
	}

	pub fn get_by_name(&self, name: &str) -> Result<&Value> {
		let index = self.layout.require_field_index(name, false)?;
		Ok(&self.values[index])
	}

	/// Returns a new row with `index` replaced; rows are never mutated in place (§3).
	pub fn with_value(&self, index: usize, value: Value) -> Result<Row> {
		if index >= self.values.len() {
			return Err(Error::InvalidArgument(format!("field index {index} out of bounds")));
		}
		let mut values = self.values.clone();
		values[index] = value;
		Ok(Row { layout: self.layout.clone(), values })
	}

	/// Builds the [`Identifier`] for this row over `field_indices`, or the layout's identifier
	/// set (every `ID`-flagged field) when `field_indices` is empty.
	pub fn identifier(&self, field_indices: &[usize]) -> Identifier {
		let indices: Vec<usize> = if field_indices.is_empty() {
			self.layout.identifier_fields().map(|f| f.index).collect()
		} else {
			field_indices.to_vec()
		};
		let values = indices.iter().map(|&i| self.values[i].clone()).collect();
		Identifier { field_indices: indices, values }
	}
}

impl PartialEq for Row {
	fn eq(&self, other: &Self) -> bool {
		self.layout == other.layout && self.values == other.values
	}
}
impl Eq for Row {}

impl Hash for Row {
	/// XORs rotating bit-shifts of each element's hash, per §3: `h = rotl(h, i) ^ hash(values[i])`.
	fn hash<H: Hasher>(&self, state: &mut H) {
		let mut acc: u64 = 0;
		for (i, value) in self.values.iter().enumerate() {
			let mut element_hasher = fxhash::FxHasher::default();
			value.hash(&mut element_hasher);
			let element_hash = element_hasher.finish();
			acc ^= element_hash.rotate_left((i as u32 * 7) % 64);
		}
		acc.hash(state);
	}
}

/// A structural key formed from a row's values at a chosen field-index subset. Two identifiers
/// are equal iff both field sets and all values are equal (§3); used as the primary key of the
/// in-memory engine's row map (C7).
#[derive(Debug, Clone)]
pub struct Identifier {
	field_indices: Vec<usize>,
	values: Vec<Value>,
}

impl Identifier {
	pub fn field_indices(&self) -> &[usize] {
		&self.field_indices
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}
}

impl PartialEq for Identifier {
	fn eq(&self, other: &Self) -> bool {
		self.field_indices == other.field_indices && self.values == other.values
	}
}
impl Eq for Identifier {}

impl Hash for Identifier {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.field_indices.hash(state);
		for value in &self.values {
			value.hash(state);
		}
	}
}

impl Ord for Identifier {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.values.cmp(&other.values)
	}
}
impl PartialOrd for Identifier {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::layout::LayoutBuilder;
	use crate::types::DataType;

	fn layout() -> Arc<RowLayout> {
		Arc::new(
			LayoutBuilder::new("Item")
				.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
				.field(FieldProperties::new(1, "name", DataType::String, FieldFlags::empty()))
				.build()
				.unwrap(),
		)
	}

	#[test]
	fn identifier_defaults_to_id_fields() {
		let row = Row::new(layout(), vec![Value::Int64(1), Value::String("a".into())]).unwrap();
		let id = row.identifier(&[]);
		assert_eq!(id.field_indices(), &[0]);
		assert_eq!(id.values(), &[Value::Int64(1)]);
	}

	#[test]
	fn with_value_does_not_mutate_original() {
		let row = Row::new(layout(), vec![Value::Int64(1), Value::String("a".into())]).unwrap();
		let updated = row.with_value(1, Value::String("b".into())).unwrap();
		assert_eq!(row.get(1), Some(&Value::String("a".into())));
		assert_eq!(updated.get(1), Some(&Value::String("b".into())));
	}
}
