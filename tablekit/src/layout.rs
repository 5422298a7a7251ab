//! C3 — row layouts: the immutable ordered schema a [`crate::row::Row`] is shaped by.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::error::{Error, Result};
use crate::field::{FieldFlags, FieldProperties};

/// An immutable, ordered tuple of [`FieldProperties`], optionally bound to a record type.
/// Two layouts are equal iff their field counts match and each field-properties pair is
/// pairwise equal (§3); the bound `row_type` does not participate in equality, mirroring the
/// source design where untyped and typed layouts with the same columns must compare equal so a
/// typed table can `UseLayout` an untyped one read from storage.
#[derive(Debug, Clone)]
pub struct RowLayout {
	name: String,
	fields: Vec<FieldProperties>,
	row_type: Option<TypeId>,
}

impl RowLayout {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn fields(&self) -> &[FieldProperties] {
		&self.fields
	}

	pub fn field_count(&self) -> usize {
		self.fields.len()
	}

	pub fn is_typed(&self) -> bool {
		self.row_type.is_some()
	}

	pub fn row_type(&self) -> Option<TypeId> {
		self.row_type
	}

	/// Matches logical name first, then alternative names. Case-insensitive when
	/// `case_insensitive` is set (`TableFlags::FIELD_NAMES_CASE_INSENSITIVE`, §4.1).
	pub fn field_index(&self, name: &str, case_insensitive: bool) -> Option<usize> {
		let matches = |candidate: &str| {
			if case_insensitive {
				candidate.eq_ignore_ascii_case(name)
			} else {
				candidate == name
			}
		};
		for field in &self.fields {
			if matches(&field.name) {
				return Some(field.index);
			}
		}
		for field in &self.fields {
			if field.alternative_names.iter().any(|alt| matches(alt)) {
				return Some(field.index);
			}
		}
		None
	}

	pub fn require_field_index(&self, name: &str, case_insensitive: bool) -> Result<usize> {
		self.field_index(name, case_insensitive)
			.ok_or_else(|| Error::InvalidSchema(format!("field '{name}' not present in layout '{}'", self.name)))
	}

	pub fn field(&self, index: usize) -> Option<&FieldProperties> {
		self.fields.get(index)
	}

	/// Every field carrying the `ID` flag.
	pub fn identifier_fields(&self) -> impl Iterator<Item = &FieldProperties> {
		self.fields.iter().filter(|f| f.flags.contains(FieldFlags::ID))
	}

	/// `Some` iff exactly one field carries the `ID` flag.
	pub fn single_identifier(&self) -> Option<&FieldProperties> {
		let mut ids = self.identifier_fields();
		let first = ids.next()?;
		match ids.next() {
			None => Some(first),
			Some(_) => None,
		}
	}

	/// Resolves a typed layout's columns against an untyped layout read from storage
	/// (`GetMatching`, §4.1): nameAtDatabase exact, name exact, nameAtDatabase
	/// case-insensitive, name case-insensitive, in that order. Missing fields raise
	/// `InvalidSchema` unless `ignore_missing` is set.
	pub fn match_fields(&self, other: &RowLayout, ignore_missing: bool) -> Result<Vec<Option<usize>>> {
		let mut mapping = Vec::with_capacity(self.fields.len());
		for field in &self.fields {
			let found = other.fields.iter().find(|f| f.name_at_database == field.name_at_database)
				.or_else(|| other.fields.iter().find(|f| f.name == field.name))
				.or_else(|| other.fields.iter().find(|f| f.name_at_database.eq_ignore_ascii_case(&field.name_at_database)))
				.or_else(|| other.fields.iter().find(|f| f.name.eq_ignore_ascii_case(&field.name)));
			match found {
				Some(f) => mapping.push(Some(f.index)),
				None if ignore_missing => mapping.push(None),
				None => {
					return Err(Error::InvalidSchema(format!(
						"field '{}' of layout '{}' has no match in layout '{}'",
						field.name, self.name, other.name
					)))
				}
			}
		}
		Ok(mapping)
	}
}

impl PartialEq for RowLayout {
	fn eq(&self, other: &Self) -> bool {
		self.fields.len() == other.fields.len()
			&& self
				.fields
				.iter()
				.zip(other.fields.iter())
				.all(|(a, b)| a.name == b.name && a.data_type == b.data_type && a.flags == b.flags)
	}
}
impl Eq for RowLayout {}

/// Filters a layout name down to the safe-identifier charset the invariant in §3 requires:
/// ASCII alphanumerics and underscore, must not start with a digit.
pub fn is_safe_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Explicit, code-first schema construction — the replacement for runtime attribute scanning
/// named in the "Reflection-heavy layout construction" design note (§9). `#[derive(TableRow)]`
/// expands to calls into this builder.
pub struct LayoutBuilder {
	name: String,
	fields: Vec<FieldProperties>,
	row_type: Option<TypeId>,
}

impl LayoutBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), fields: Vec::new(), row_type: None }
	}

	pub fn bind_record_type<T: 'static>(mut self) -> Self {
		self.row_type = Some(TypeId::of::<T>());
		self
	}

	pub fn field(mut self, mut field: FieldProperties) -> Self {
		field.index = self.fields.len();
		field.validate();
		self.fields.push(field);
		self
	}

	pub fn build(self) -> Result<RowLayout> {
		if !is_safe_identifier(&self.name) {
			return Err(Error::InvalidArgument(format!("layout name '{}' is not a safe identifier", self.name)));
		}
		let mut seen_indices = std::collections::HashSet::new();
		for field in &self.fields {
			if !seen_indices.insert(field.index) {
				return Err(Error::InvariantViolated(format!("duplicate field index {}", field.index)));
			}
		}
		Ok(RowLayout { name: self.name, fields: self.fields, row_type: self.row_type })
	}
}

/// Key for the process-global layout cache: `(typeFullName, nameOverride)` per §3/§5.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CacheKey {
	type_id: TypeId,
	name_override: Option<String>,
}

struct LayoutCache {
	enabled: bool,
	entries: HashMap<CacheKey, std::sync::Arc<RowLayout>>,
}

static CACHE: OnceLock<Mutex<LayoutCache>> = OnceLock::new();

fn cache() -> &'static Mutex<LayoutCache> {
	CACHE.get_or_init(|| Mutex::new(LayoutCache { enabled: true, entries: HashMap::new() }))
}

/// Looks up a cached layout for `T`, building it with `build` on a miss. Layouts are created
/// once per record type and live for the process (§3 "Lifecycle").
pub fn cached_layout<T: 'static>(name_override: Option<&str>, build: impl FnOnce() -> Result<RowLayout>) -> Result<std::sync::Arc<RowLayout>> {
	let key = CacheKey { type_id: TypeId::of::<T>(), name_override: name_override.map(str::to_string) };
	let mut guard = cache().lock().expect("layout cache mutex poisoned");
	if guard.enabled {
		if let Some(existing) = guard.entries.get(&key) {
			return Ok(existing.clone());
		}
	}
	let layout = std::sync::Arc::new(build()?);
	if guard.enabled {
		guard.entries.insert(key, layout.clone());
	}
	Ok(layout)
}

/// Disables the global layout cache; new lookups always rebuild. Mirrors the source design's
/// "cache can be disabled globally" (§3).
pub fn set_cache_enabled(enabled: bool) {
	let mut guard = cache().lock().expect("layout cache mutex poisoned");
	guard.enabled = enabled;
	if !enabled {
		guard.entries.clear();
	}
}

/// Drops every cached layout without disabling the cache (`ClearCache`, §9).
pub fn clear_cache() {
	let mut guard = cache().lock().expect("layout cache mutex poisoned");
	guard.entries.clear();
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::DataType;

	#[test]
	fn equal_layouts_ignore_row_type_binding() {
		let a = LayoutBuilder::new("Row")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
			.build()
			.unwrap();
		struct Marker;
		let b = LayoutBuilder::new("Row")
			.bind_record_type::<Marker>()
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
			.build()
			.unwrap();
		assert_eq!(a, b);
		assert!(!a.is_typed());
		assert!(b.is_typed());
	}

	#[test]
	fn rejects_unsafe_names() {
		let err = LayoutBuilder::new("1row").build().unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}
}
