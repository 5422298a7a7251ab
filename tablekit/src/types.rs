//! C1 — the closed catalog of scalar kinds a [`crate::field::FieldProperties`] can describe.

use std::fmt::{Display, Formatter};

/// The closed set of kinds the system distinguishes. `User` is an opaque, application-defined
/// type that round-trips through a string (see [`crate::field::FieldProperties::get_string`]).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(u8)]
pub enum DataType {
	Binary,
	Bool,
	Char,
	Int8,
	Int16,
	Int32,
	Int64,
	UInt8,
	UInt16,
	UInt32,
	UInt64,
	Single,
	Double,
	Decimal,
	String,
	DateTime,
	TimeSpan,
	Enum,
	Guid,
	User,
}

impl DataType {
	/// The canonical database kind a back-end should use to persist this kind when the field
	/// does not override `database_data_type` explicitly. Several kinds widen on the wire
	/// because not every back-end has an unsigned integer type (e.g. `UInt8` -> `Int16`).
	pub fn database_data_type(self) -> DataType {
		match self {
			DataType::UInt8 => DataType::Int16,
			DataType::UInt16 => DataType::Int32,
			DataType::UInt32 => DataType::Int64,
			DataType::UInt64 => DataType::Decimal,
			DataType::Enum => DataType::Int64,
			DataType::User => DataType::String,
			other => other,
		}
	}

	pub fn is_integer(self) -> bool {
		matches!(
			self,
			DataType::Int8
				| DataType::Int16 | DataType::Int32
				| DataType::Int64 | DataType::UInt8
				| DataType::UInt16 | DataType::UInt32
				| DataType::UInt64
		)
	}

	pub fn is_numeric(self) -> bool {
		self.is_integer() || matches!(self, DataType::Single | DataType::Double | DataType::Decimal)
	}
}

impl Display for DataType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Debug::fmt(self, f)
	}
}

use std::fmt::Debug;

/// How a `DateTime` field's wall-clock kind should be interpreted. Mirrors .NET's
/// `DateTimeKind` enum, which the field-attribute table in §4.1 is built around.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum DateTimeKind {
	#[default]
	Unspecified,
	Utc,
	Local,
}

/// The on-the-wire representation a `DateTime`/`TimeSpan` field encodes to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum DateTimeType {
	#[default]
	Native,
	BigIntTicks,
	BigIntMilliSeconds,
	BigIntSeconds,
	BigIntHumanReadable,
	BigIntEpoch,
	DoubleSeconds,
	DoubleEpoch,
	DecimalSeconds,
}

impl DateTimeType {
	/// The database kind a field with this encoding maps to, per the table in §4.1.
	pub fn database_data_type(self, native: DataType) -> DataType {
		match self {
			DateTimeType::BigIntTicks
			| DateTimeType::BigIntMilliSeconds
			| DateTimeType::BigIntSeconds
			| DateTimeType::BigIntHumanReadable
			| DateTimeType::BigIntEpoch => DataType::Int64,
			DateTimeType::DecimalSeconds => DataType::Decimal,
			DateTimeType::DoubleSeconds | DateTimeType::DoubleEpoch => DataType::Double,
			DateTimeType::Native => native,
		}
	}
}

/// The text encoding a `String`/`User` field is formatted/parsed with.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum StringEncoding {
	#[default]
	UTF8,
	UTF16,
	UTF32,
	ASCII,
}
