//! The tagged-sum cell value every [`crate::row::Row`] is built from (design note "Untagged
//! `object` values", §9). Materializing a record-type field is a per-field switch on
//! [`DataType`]; the `#[derive(TableRow)]` macro in `tablekit-derive` generates exactly that
//! switch.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::types::DataType;

/// A single column value. `Null` is only constructible for fields carrying the `Nullable`
/// flag; non-nullable fields always hold a concrete variant, even their type's default.
#[derive(Debug, Clone)]
pub enum Value {
	Null,
	Binary(Vec<u8>),
	Bool(bool),
	Char(char),
	Int8(i8),
	Int16(i16),
	Int32(i32),
	Int64(i64),
	UInt8(u8),
	UInt16(u16),
	UInt32(u32),
	UInt64(u64),
	Single(f32),
	Double(f64),
	Decimal(Decimal),
	String(String),
	DateTime(DateTime<Utc>),
	TimeSpan(chrono::Duration),
	Enum(i64),
	Guid(Uuid),
	User(String),
}

impl Value {
	pub fn data_type(&self) -> Option<DataType> {
		Some(match self {
			Value::Null => return None,
			Value::Binary(_) => DataType::Binary,
			Value::Bool(_) => DataType::Bool,
			Value::Char(_) => DataType::Char,
			Value::Int8(_) => DataType::Int8,
			Value::Int16(_) => DataType::Int16,
			Value::Int32(_) => DataType::Int32,
			Value::Int64(_) => DataType::Int64,
			Value::UInt8(_) => DataType::UInt8,
			Value::UInt16(_) => DataType::UInt16,
			Value::UInt32(_) => DataType::UInt32,
			Value::UInt64(_) => DataType::UInt64,
			Value::Single(_) => DataType::Single,
			Value::Double(_) => DataType::Double,
			Value::Decimal(_) => DataType::Decimal,
			Value::String(_) => DataType::String,
			Value::DateTime(_) => DataType::DateTime,
			Value::TimeSpan(_) => DataType::TimeSpan,
			Value::Enum(_) => DataType::Enum,
			Value::Guid(_) => DataType::Guid,
			Value::User(_) => DataType::User,
		})
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	/// The zero/empty value for `data_type`, used by the CSV codec's `saveDefaultValues=false`
	/// path and by auto-increment seeding (`max(field) + 1` starts at 1, i.e. default is 0).
	pub fn default_for(data_type: DataType) -> Value {
		match data_type {
			DataType::Binary => Value::Binary(Vec::new()),
			DataType::Bool => Value::Bool(false),
			DataType::Char => Value::Char('\0'),
			DataType::Int8 => Value::Int8(0),
			DataType::Int16 => Value::Int16(0),
			DataType::Int32 => Value::Int32(0),
			DataType::Int64 => Value::Int64(0),
			DataType::UInt8 => Value::UInt8(0),
			DataType::UInt16 => Value::UInt16(0),
			DataType::UInt32 => Value::UInt32(0),
			DataType::UInt64 => Value::UInt64(0),
			DataType::Single => Value::Single(0.0),
			DataType::Double => Value::Double(0.0),
			DataType::Decimal => Value::Decimal(Decimal::ZERO),
			DataType::String => Value::String(String::new()),
			DataType::DateTime => Value::DateTime(DateTime::<Utc>::from_timestamp(0, 0).unwrap()),
			DataType::TimeSpan => Value::TimeSpan(chrono::Duration::zero()),
			DataType::Enum => Value::Enum(0),
			DataType::Guid => Value::Guid(Uuid::nil()),
			DataType::User => Value::User(String::new()),
		}
	}

	pub fn is_default(&self) -> bool {
		match self.data_type() {
			None => false,
			Some(dt) => {
				let default = Value::default_for(dt);
				self == &default
			}
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		use Value::*;
		match (self, other) {
			(Null, Null) => true,
			(Binary(a), Binary(b)) => a == b,
			(Bool(a), Bool(b)) => a == b,
			(Char(a), Char(b)) => a == b,
			(Int8(a), Int8(b)) => a == b,
			(Int16(a), Int16(b)) => a == b,
			(Int32(a), Int32(b)) => a == b,
			(Int64(a), Int64(b)) => a == b,
			(UInt8(a), UInt8(b)) => a == b,
			(UInt16(a), UInt16(b)) => a == b,
			(UInt32(a), UInt32(b)) => a == b,
			(UInt64(a), UInt64(b)) => a == b,
			(Single(a), Single(b)) => a.to_bits() == b.to_bits(),
			(Double(a), Double(b)) => a.to_bits() == b.to_bits(),
			(Decimal(a), Decimal(b)) => a == b,
			(String(a), String(b)) => a == b,
			(DateTime(a), DateTime(b)) => a == b,
			(TimeSpan(a), TimeSpan(b)) => a == b,
			(Enum(a), Enum(b)) => a == b,
			(Guid(a), Guid(b)) => a == b,
			(User(a), User(b)) => a == b,
			_ => false,
		}
	}
}

impl Eq for Value {}

impl Hash for Value {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
		use Value::*;
		match self {
			Null => {}
			Binary(v) => v.hash(state),
			Bool(v) => v.hash(state),
			Char(v) => v.hash(state),
			Int8(v) => v.hash(state),
			Int16(v) => v.hash(state),
			Int32(v) => v.hash(state),
			Int64(v) => v.hash(state),
			UInt8(v) => v.hash(state),
			UInt16(v) => v.hash(state),
			UInt32(v) => v.hash(state),
			UInt64(v) => v.hash(state),
			Single(v) => v.to_bits().hash(state),
			Double(v) => v.to_bits().hash(state),
			Decimal(v) => v.hash(state),
			String(v) => v.hash(state),
			DateTime(v) => v.hash(state),
			TimeSpan(v) => v.hash(state),
			Enum(v) => v.hash(state),
			Guid(v) => v.hash(state),
			User(v) => v.hash(state),
		}
	}
}

/// Used by range comparisons (`Greater`/`Smaller`/…) and by [`crate::memory::field_index`]'s
/// structurally-ordered bucket map. Cross-variant comparisons only happen for `Null`, which the
/// design note in §9 treats as ordering before every concrete value.
impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		use Value::*;
		match (self, other) {
			(Null, Null) => Some(Ordering::Equal),
			(Null, _) => Some(Ordering::Less),
			(_, Null) => Some(Ordering::Greater),
			(Binary(a), Binary(b)) => a.partial_cmp(b),
			(Bool(a), Bool(b)) => a.partial_cmp(b),
			(Char(a), Char(b)) => a.partial_cmp(b),
			(Int8(a), Int8(b)) => a.partial_cmp(b),
			(Int16(a), Int16(b)) => a.partial_cmp(b),
			(Int32(a), Int32(b)) => a.partial_cmp(b),
			(Int64(a), Int64(b)) => a.partial_cmp(b),
			(UInt8(a), UInt8(b)) => a.partial_cmp(b),
			(UInt16(a), UInt16(b)) => a.partial_cmp(b),
			(UInt32(a), UInt32(b)) => a.partial_cmp(b),
			(UInt64(a), UInt64(b)) => a.partial_cmp(b),
			(Single(a), Single(b)) => a.partial_cmp(b),
			(Double(a), Double(b)) => a.partial_cmp(b),
			(Decimal(a), Decimal(b)) => a.partial_cmp(b),
			(String(a), String(b)) => a.partial_cmp(b),
			(DateTime(a), DateTime(b)) => a.partial_cmp(b),
			(TimeSpan(a), TimeSpan(b)) => a.partial_cmp(b),
			(Enum(a), Enum(b)) => a.partial_cmp(b),
			(Guid(a), Guid(b)) => a.partial_cmp(b),
			(User(a), User(b)) => a.partial_cmp(b),
			_ => None,
		}
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		self.partial_cmp(other).unwrap_or_else(|| {
			// NaN or cross-variant comparison: fall back to a stable, arbitrary total order so
			// BTreeMap-backed field indices never panic.
			discriminant_index(self).cmp(&discriminant_index(other))
		})
	}
}

fn discriminant_index(value: &Value) -> u8 {
	use Value::*;
	match value {
		Null => 0,
		Binary(_) => 1,
		Bool(_) => 2,
		Char(_) => 3,
		Int8(_) => 4,
		Int16(_) => 5,
		Int32(_) => 6,
		Int64(_) => 7,
		UInt8(_) => 8,
		UInt16(_) => 9,
		UInt32(_) => 10,
		UInt64(_) => 11,
		Single(_) => 12,
		Double(_) => 13,
		Decimal(_) => 14,
		String(_) => 15,
		DateTime(_) => 16,
		TimeSpan(_) => 17,
		Enum(_) => 18,
		Guid(_) => 19,
		User(_) => 20,
	}
}
