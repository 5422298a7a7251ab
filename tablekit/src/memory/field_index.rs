//! `FieldIndex` — a structurally-ordered value → row-identifier index (§4.3).
//!
//! The source keeps a "fake-sorted" hashmap (plain hashmap plus a lazily sorted key array)
//! because structural comparison of boxed values there is expensive. [`crate::value::Value`]
//! has a cheap total order, so a `BTreeMap` gives the same deterministic range traversal
//! directly, per the "In-memory index" design note (§9).

use std::collections::BTreeMap;

use crate::row::Identifier;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct FieldIndex {
	buckets: BTreeMap<Value, Vec<Identifier>>,
	len: usize,
}

impl FieldIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn get(&self, value: &Value) -> Option<&[Identifier]> {
		self.buckets.get(value).map(Vec::as_slice)
	}

	pub fn insert(&mut self, value: Value, identifier: Identifier) {
		self.buckets.entry(value).or_default().push(identifier);
		self.len += 1;
	}

	pub fn remove(&mut self, value: &Value, identifier: &Identifier) {
		if let Some(bucket) = self.buckets.get_mut(value) {
			if let Some(pos) = bucket.iter().position(|id| id == identifier) {
				bucket.remove(pos);
				self.len -= 1;
			}
			if bucket.is_empty() {
				self.buckets.remove(value);
			}
		}
	}

	/// `Delete(old) + Add(new)`, skipped entirely when `old == new` (§4.3 `Update`/`Replace`).
	pub fn replace(&mut self, old_value: &Value, new_value: Value, identifier: &Identifier) {
		if old_value == &new_value {
			return;
		}
		self.remove(old_value, identifier);
		self.insert(new_value, identifier.clone());
	}

	pub fn clear(&mut self) {
		self.buckets.clear();
		self.len = 0;
	}

	/// Every identifier whose bucket key falls in `[min, max]`, in ascending key order — the
	/// range traversal the structurally-ordered dictionary exists to support.
	pub fn range(&self, min: &Value, max: &Value) -> impl Iterator<Item = &Identifier> {
		self.buckets.range(min.clone()..=max.clone()).flat_map(|(_, ids)| ids.iter())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn id(n: i64) -> Identifier {
		crate::row::Row::new(
			std::sync::Arc::new(
				crate::layout::LayoutBuilder::new("Item")
					.field(crate::field::FieldProperties::new(0, "id", crate::types::DataType::Int64, crate::field::FieldFlags::ID))
					.build()
					.unwrap(),
			),
			vec![Value::Int64(n)],
		)
		.unwrap()
		.identifier(&[])
	}

	#[test]
	fn bucket_length_invariant_holds_after_mutation() {
		let mut index = FieldIndex::new();
		index.insert(Value::Int64(1), id(1));
		index.insert(Value::Int64(1), id(2));
		index.insert(Value::Int64(2), id(3));
		assert_eq!(index.len(), 3);
		index.remove(&Value::Int64(1), &id(1));
		assert_eq!(index.len(), 2);
		assert_eq!(index.get(&Value::Int64(1)).map(<[_]>::len), Some(1));
	}

	#[test]
	fn replace_is_noop_when_value_unchanged() {
		let mut index = FieldIndex::new();
		let row_id = id(1);
		index.insert(Value::Int64(1), row_id.clone());
		index.replace(&Value::Int64(1), Value::Int64(1), &row_id);
		assert_eq!(index.len(), 1);
	}
}
