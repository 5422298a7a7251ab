//! C9 — the versioned binary (DAT) codec (§4.5).

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::field::{FieldFlags, FieldProperties};
use crate::layout::{LayoutBuilder, RowLayout};
use crate::row::Row;
use crate::types::{DataType, DateTimeKind, DateTimeType, StringEncoding};
use crate::value::Value;
use crate::varint::*;

const MAGIC: &[u8; 8] = b"DatTable";
/// The version this crate writes. Readers accept v1..=CURRENT_VERSION.
pub const CURRENT_VERSION: i64 = 5;
/// Bytes reserved past an entry's encoded payload so a future format extension can append
/// fields without breaking readers that only know the fields up to this version (§4.5).
const ENTRY_RESERVE: u64 = 10;

/// Writes `rows` under `layout` in the current (v5) wire format.
pub fn write_table<W: Write>(writer: &mut W, layout: &RowLayout, rows: &[Row]) -> Result<()> {
	write_header(writer, layout, CURRENT_VERSION)?;
	for row in rows {
		write_entry(writer, layout, row, CURRENT_VERSION)?;
	}
	Ok(())
}

/// Reads a layout and every entry from a DAT byte stream, dispatching per-field decoding on the
/// version recorded in the header.
pub fn read_table(bytes: &[u8]) -> Result<(Arc<RowLayout>, Vec<Row>)> {
	let mut cursor = Cursor::new(bytes);
	let (layout, version) = read_header(&mut cursor)?;
	let layout = Arc::new(layout);
	let mut rows = Vec::new();
	while (cursor.position() as usize) < bytes.len() {
		rows.push(read_entry(&mut cursor, &layout, version)?);
	}
	Ok((layout, rows))
}

fn read_entry(cursor: &mut Cursor<&[u8]>, layout: &Arc<RowLayout>, version: i64) -> Result<Row> {
	let start = cursor.position();
	let total_size = read_7bit_encoded_uint(cursor)?;
	let mut values = Vec::with_capacity(layout.field_count());
	for field in layout.fields() {
		values.push(read_value(cursor, field, version)?);
	}
	cursor.set_position(start + total_size);
	Row::new(layout.clone(), values)
}

fn write_header<W: Write>(writer: &mut W, layout: &RowLayout, version: i64) -> Result<()> {
	writer.write_all(MAGIC)?;
	write_7bit_encoded_int(writer, version)?;
	write_prefixed_string(writer, layout.name())?;
	write_7bit_encoded_int(writer, layout.field_count() as i64)?;
	for field in layout.fields() {
		write_prefixed_string(writer, &field.name)?;
		write_7bit_encoded_int(writer, field.data_type as i64)?;
		write_7bit_encoded_int(writer, field.flags.bits() as i64)?;
		if version > 2 && matches!(field.data_type, DataType::String | DataType::User) {
			write_7bit_encoded_int(writer, field.string_encoding as i64)?;
		}
		if version > 1 && field.data_type == DataType::DateTime {
			write_7bit_encoded_int(writer, field.date_time_kind as i64)?;
			write_7bit_encoded_int(writer, field.date_time_type as i64)?;
		}
		if version > 3 && field.data_type == DataType::TimeSpan {
			write_7bit_encoded_int(writer, field.date_time_type as i64)?;
		}
		if field.data_type == DataType::User {
			// No CLR assembly-qualified type name exists in a Rust crate; the user-type tag
			// rides in `description`, following the field that already carries free-form text.
			write_prefixed_string(writer, field.description.as_deref().unwrap_or(""))?;
		}
	}
	Ok(())
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<(RowLayout, i64)> {
	let mut magic = [0u8; 8];
	cursor.read_exact(&mut magic).map_err(Error::Io)?;
	if &magic != MAGIC {
		return Err(Error::MalformedInput("missing 'DatTable' magic".into()));
	}
	let version = read_7bit_encoded_int(cursor)?;
	if !(1..=CURRENT_VERSION).contains(&version) {
		return Err(Error::VersionUnsupported(version));
	}
	let name = read_prefixed_string(cursor)?;
	let field_count = read_7bit_encoded_int(cursor)?;
	if field_count < 0 {
		return Err(Error::MalformedInput("negative field count".into()));
	}
	let mut builder = LayoutBuilder::new(name);
	for index in 0..field_count {
		let name = read_prefixed_string(cursor)?;
		let data_type = data_type_from_discriminant(read_7bit_encoded_int(cursor)?)?;
		let flags = FieldFlags::from_bits_truncate(read_7bit_encoded_int(cursor)? as u8);
		let mut field = FieldProperties::new(index as usize, name, data_type, flags);
		if version > 2 && matches!(data_type, DataType::String | DataType::User) {
			field.string_encoding = string_encoding_from_discriminant(read_7bit_encoded_int(cursor)?)?;
		}
		if version > 1 && data_type == DataType::DateTime {
			field.date_time_kind = date_time_kind_from_discriminant(read_7bit_encoded_int(cursor)?)?;
			field.date_time_type = date_time_type_from_discriminant(read_7bit_encoded_int(cursor)?)?;
		}
		if version > 3 && data_type == DataType::TimeSpan {
			field.date_time_type = date_time_type_from_discriminant(read_7bit_encoded_int(cursor)?)?;
		}
		if data_type == DataType::User {
			let tag = read_prefixed_string(cursor)?;
			if !tag.is_empty() {
				field.description = Some(tag);
			}
		}
		field.validate();
		builder = builder.field(field);
	}
	Ok((builder.build()?, version))
}

fn write_entry<W: Write>(writer: &mut W, layout: &RowLayout, row: &Row, version: i64) -> Result<()> {
	let mut body = Vec::new();
	for field in layout.fields() {
		let value = row.get(field.index).cloned().unwrap_or(Value::Null);
		write_value(&mut body, field, &value, version)?;
	}
	let mut prefix_len = 1u64;
	let total_size = loop {
		let candidate = prefix_len + body.len() as u64 + ENTRY_RESERVE;
		let needed = varint_uint_len(candidate);
		if needed == prefix_len {
			break candidate;
		}
		prefix_len = needed;
	};
	write_7bit_encoded_uint(writer, total_size)?;
	writer.write_all(&body)?;
	let padding = total_size - prefix_len - body.len() as u64;
	writer.write_all(&vec![0u8; padding as usize])?;
	Ok(())
}

fn varint_uint_len(mut value: u64) -> u64 {
	let mut len = 1;
	value >>= 7;
	while value != 0 {
		len += 1;
		value >>= 7;
	}
	len
}

pub(crate) fn write_value<W: Write>(writer: &mut W, field: &FieldProperties, value: &Value, version: i64) -> Result<()> {
	let nullable = version >= 5 && field.is_nullable();
	match field.data_type {
		DataType::Bool => {
			let byte = match value {
				_ if nullable && value.is_null() => NullableEncoding::BOOL_NULL,
				Value::Bool(true) => 1,
				_ => 0,
			};
			write_u8(writer, byte)?;
		}
		DataType::Int8 | DataType::UInt8 => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			let byte = match value {
				Value::Int8(n) => *n as u8,
				Value::UInt8(n) => *n,
				_ => 0,
			};
			write_u8(writer, byte)?;
		}
		DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			write_integer(writer, field.data_type, value, version)?;
		}
		DataType::Binary => {
			let bytes: &[u8] = match value {
				Value::Binary(b) => b,
				_ => &[],
			};
			match version {
				1 | 2 => {
					write_i32_le(writer, bytes.len() as i32)?;
					writer.write_all(bytes)?;
				}
				3 | 4 => {
					write_7bit_encoded_uint(writer, bytes.len() as u64)?;
					writer.write_all(bytes)?;
				}
				_ => {
					if value.is_null() {
						write_7bit_encoded_int(writer, NullableEncoding::LENGTH_NULL)?;
					} else {
						write_7bit_encoded_int(writer, bytes.len() as i64)?;
						writer.write_all(bytes)?;
					}
				}
			}
		}
		DataType::DateTime | DataType::TimeSpan => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			let ticks = match (field.data_type, value) {
				(DataType::DateTime, Value::DateTime(dt)) => ticks_from_datetime(*dt),
				(DataType::TimeSpan, Value::TimeSpan(d)) => d.num_nanoseconds().unwrap_or(0) / 100,
				_ => 0,
			};
			write_i64_le(writer, ticks)?;
		}
		DataType::String | DataType::User | DataType::Guid => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			let text = match value {
				Value::String(s) | Value::User(s) => s.clone(),
				Value::Guid(g) => g.to_string(),
				_ => String::new(),
			};
			write_prefixed_string(writer, &text)?;
		}
		DataType::Enum => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			let discriminant = match value {
				Value::Enum(n) => *n,
				_ => 0,
			};
			write_7bit_encoded_int(writer, discriminant)?;
		}
		DataType::Char => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			let codepoint = match value {
				Value::Char(c) => *c as u32,
				_ => 0,
			};
			write_u32_le(writer, codepoint)?;
		}
		DataType::Single => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			write_f32_le(writer, match value { Value::Single(f) => *f, _ => 0.0 })?;
		}
		DataType::Double => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			write_f64_le(writer, match value { Value::Double(f) => *f, _ => 0.0 })?;
		}
		DataType::Decimal => {
			if nullable {
				NullableEncoding::write_prefix(writer, value.is_null())?;
				if value.is_null() {
					return Ok(());
				}
			}
			let text = match value { Value::Decimal(d) => d.to_string(), _ => "0".to_string() };
			write_prefixed_string(writer, &text)?;
		}
	}
	Ok(())
}

fn write_integer<W: Write>(writer: &mut W, data_type: DataType, value: &Value, version: i64) -> Result<()> {
	if version == 1 {
		return Ok(match (data_type, value) {
			(DataType::Int16, Value::Int16(n)) => write_i16_le(writer, *n)?,
			(DataType::UInt16, Value::UInt16(n)) => write_u16_le(writer, *n)?,
			(DataType::Int32, Value::Int32(n)) => write_i32_le(writer, *n)?,
			(DataType::UInt32, Value::UInt32(n)) => write_u32_le(writer, *n)?,
			(DataType::Int64, Value::Int64(n)) => write_i64_le(writer, *n)?,
			(DataType::UInt64, Value::UInt64(n)) => write_u64_le(writer, *n)?,
			_ => write_i64_le(writer, 0)?,
		});
	}
	match (data_type, value) {
		(DataType::Int16, Value::Int16(n)) => write_7bit_encoded_int(writer, *n as i64),
		(DataType::Int32, Value::Int32(n)) => write_7bit_encoded_int(writer, *n as i64),
		(DataType::Int64, Value::Int64(n)) => write_7bit_encoded_int(writer, *n),
		(DataType::UInt16, Value::UInt16(n)) => write_7bit_encoded_uint(writer, *n as u64),
		(DataType::UInt32, Value::UInt32(n)) => write_7bit_encoded_uint(writer, *n as u64),
		(DataType::UInt64, Value::UInt64(n)) => write_7bit_encoded_uint(writer, *n),
		_ => write_7bit_encoded_int(writer, 0),
	}
	.map_err(Error::Io)
}

pub(crate) fn read_value(cursor: &mut Cursor<&[u8]>, field: &FieldProperties, version: i64) -> Result<Value> {
	let nullable = version >= 5 && field.is_nullable();
	if nullable && field.data_type != DataType::Bool && field.data_type != DataType::Binary {
		if NullableEncoding::read_prefix(cursor)? {
			return Ok(Value::Null);
		}
	}
	Ok(match field.data_type {
		DataType::Bool => match read_u8(cursor)? {
			NullableEncoding::BOOL_NULL if nullable => Value::Null,
			0 => Value::Bool(false),
			_ => Value::Bool(true),
		},
		DataType::Int8 => Value::Int8(read_u8(cursor)? as i8),
		DataType::UInt8 => Value::UInt8(read_u8(cursor)?),
		DataType::Int16 => Value::Int16(read_integer(cursor, field.data_type, version)? as i16),
		DataType::Int32 => Value::Int32(read_integer(cursor, field.data_type, version)? as i32),
		DataType::Int64 => Value::Int64(read_integer(cursor, field.data_type, version)?),
		DataType::UInt16 => Value::UInt16(read_unsigned(cursor, field.data_type, version)? as u16),
		DataType::UInt32 => Value::UInt32(read_unsigned(cursor, field.data_type, version)? as u32),
		DataType::UInt64 => Value::UInt64(read_unsigned(cursor, field.data_type, version)?),
		DataType::Binary => {
			let len: i64 = match version {
				1 | 2 => read_i32_le(cursor)? as i64,
				3 | 4 => read_7bit_encoded_uint(cursor)? as i64,
				_ => read_7bit_encoded_int(cursor)?,
			};
			if len == NullableEncoding::LENGTH_NULL {
				Value::Null
			} else {
				let mut buf = vec![0u8; len as usize];
				cursor.read_exact(&mut buf).map_err(Error::Io)?;
				Value::Binary(buf)
			}
		}
		DataType::DateTime => {
			let ticks = read_i64_le(cursor)?;
			Value::DateTime(datetime_from_ticks(ticks))
		}
		DataType::TimeSpan => Value::TimeSpan(chrono::Duration::nanoseconds(read_i64_le(cursor)? * 100)),
		DataType::String => Value::String(read_prefixed_string(cursor)?),
		DataType::User => Value::User(read_prefixed_string(cursor)?),
		DataType::Guid => Value::Guid(Uuid::parse_str(&read_prefixed_string(cursor)?).map_err(|e| Error::MalformedInput(e.to_string()))?),
		DataType::Enum => Value::Enum(read_7bit_encoded_int(cursor)?),
		DataType::Char => char::from_u32(read_u32_le(cursor)?).map(Value::Char).unwrap_or(Value::Char('\0')),
		DataType::Single => Value::Single(read_f32_le(cursor)?),
		DataType::Double => Value::Double(read_f64_le(cursor)?),
		DataType::Decimal => Value::Decimal(read_prefixed_string(cursor)?.parse().map_err(|_| Error::MalformedInput("bad decimal".into()))?),
	})
}

fn read_integer(cursor: &mut Cursor<&[u8]>, data_type: DataType, version: i64) -> Result<i64> {
	if version == 1 {
		return Ok(match data_type {
			DataType::Int16 => read_i16_le(cursor)? as i64,
			DataType::Int32 => read_i32_le(cursor)? as i64,
			_ => read_i64_le(cursor)?,
		});
	}
	Ok(read_7bit_encoded_int(cursor)?)
}

fn read_unsigned(cursor: &mut Cursor<&[u8]>, data_type: DataType, version: i64) -> Result<u64> {
	if version == 1 {
		return Ok(match data_type {
			DataType::UInt16 => read_u16_le(cursor)? as u64,
			DataType::UInt32 => read_u32_le(cursor)? as u64,
			_ => read_u64_le(cursor)?,
		});
	}
	Ok(read_7bit_encoded_uint(cursor)?)
}

fn ticks_from_datetime(value: DateTime<Utc>) -> i64 {
	crate::field::TICKS_AT_UNIX_EPOCH + value.timestamp() * 10_000_000 + value.timestamp_subsec_nanos() as i64 / 100
}

fn datetime_from_ticks(ticks: i64) -> DateTime<Utc> {
	let since_epoch = ticks - crate::field::TICKS_AT_UNIX_EPOCH;
	let seconds = since_epoch.div_euclid(10_000_000);
	let sub_ticks = since_epoch.rem_euclid(10_000_000);
	DateTime::from_timestamp(seconds, (sub_ticks * 100) as u32).unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
}

pub(crate) fn data_type_from_discriminant(n: i64) -> Result<DataType> {
	use DataType::*;
	Ok(match n {
		0 => Binary,
		1 => Bool,
		2 => Char,
		3 => Int8,
		4 => Int16,
		5 => Int32,
		6 => Int64,
		7 => UInt8,
		8 => UInt16,
		9 => UInt32,
		10 => UInt64,
		11 => Single,
		12 => Double,
		13 => Decimal,
		14 => String,
		15 => DateTime,
		16 => TimeSpan,
		17 => Enum,
		18 => Guid,
		19 => User,
		other => return Err(Error::MalformedInput(format!("unknown data type discriminant {other}"))),
	})
}

fn string_encoding_from_discriminant(n: i64) -> Result<StringEncoding> {
	Ok(match n {
		0 => StringEncoding::UTF8,
		1 => StringEncoding::UTF16,
		2 => StringEncoding::UTF32,
		3 => StringEncoding::ASCII,
		other => return Err(Error::MalformedInput(format!("unknown string encoding discriminant {other}"))),
	})
}

fn date_time_kind_from_discriminant(n: i64) -> Result<DateTimeKind> {
	Ok(match n {
		0 => DateTimeKind::Unspecified,
		1 => DateTimeKind::Utc,
		2 => DateTimeKind::Local,
		other => return Err(Error::MalformedInput(format!("unknown datetime kind discriminant {other}"))),
	})
}

fn date_time_type_from_discriminant(n: i64) -> Result<DateTimeType> {
	Ok(match n {
		0 => DateTimeType::Native,
		1 => DateTimeType::BigIntTicks,
		2 => DateTimeType::BigIntMilliSeconds,
		3 => DateTimeType::BigIntSeconds,
		4 => DateTimeType::BigIntHumanReadable,
		5 => DateTimeType::BigIntEpoch,
		6 => DateTimeType::DoubleSeconds,
		7 => DateTimeType::DoubleEpoch,
		8 => DateTimeType::DecimalSeconds,
		other => return Err(Error::MalformedInput(format!("unknown datetime type discriminant {other}"))),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::layout::LayoutBuilder;

	fn layout() -> RowLayout {
		LayoutBuilder::new("Item")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
			.field(FieldProperties::new(1, "name", DataType::String, FieldFlags::NULLABLE))
			.field(FieldProperties::new(2, "amount", DataType::Double, FieldFlags::empty()))
			.build()
			.unwrap()
	}

	#[test]
	fn roundtrips_header_and_entries() {
		let layout = layout();
		let layout_arc = Arc::new(layout.clone());
		let rows = vec![
			Row::new(layout_arc.clone(), vec![Value::Int64(1), Value::String("a".into()), Value::Double(1.5)]).unwrap(),
			Row::new(layout_arc.clone(), vec![Value::Int64(2), Value::Null, Value::Double(2.5)]).unwrap(),
		];
		let mut buf = Vec::new();
		write_table(&mut buf, &layout, &rows).unwrap();
		let (read_layout, read_rows) = read_table(&buf).unwrap();
		assert_eq!(read_layout.as_ref(), &layout);
		assert_eq!(read_rows.len(), 2);
		assert_eq!(read_rows[0].get(0), Some(&Value::Int64(1)));
		assert_eq!(read_rows[1].get(1), Some(&Value::Null));
	}

	#[test]
	fn rejects_bad_magic() {
		let err = read_table(&[0u8; 16]).unwrap_err();
		assert!(matches!(err, Error::MalformedInput(_)));
	}

	#[test]
	fn v1_narrow_integers_roundtrip_at_their_declared_width() {
		let layout = LayoutBuilder::new("Narrow")
			.field(FieldProperties::new(0, "a", DataType::Int16, FieldFlags::empty()))
			.field(FieldProperties::new(1, "b", DataType::UInt16, FieldFlags::empty()))
			.field(FieldProperties::new(2, "c", DataType::Int32, FieldFlags::empty()))
			.field(FieldProperties::new(3, "d", DataType::Int64, FieldFlags::empty()))
			.build()
			.unwrap();
		let layout_arc = Arc::new(layout.clone());
		let rows = vec![Row::new(
			layout_arc.clone(),
			vec![Value::Int16(-7), Value::UInt16(65000), Value::Int32(-123456), Value::Int64(9_000_000_000)],
		)
		.unwrap()];

		let mut buf = Vec::new();
		write_header(&mut buf, &layout, 1).unwrap();
		for row in &rows {
			write_entry(&mut buf, &layout, row, 1).unwrap();
		}

		let mut cursor = Cursor::new(buf.as_slice());
		let (read_layout, version) = read_header(&mut cursor).unwrap();
		assert_eq!(version, 1);
		let read_layout = Arc::new(read_layout);
		let read_back = read_entry(&mut cursor, &read_layout, version).unwrap();

		assert_eq!(read_back.get(0), Some(&Value::Int16(-7)));
		assert_eq!(read_back.get(1), Some(&Value::UInt16(65000)));
		assert_eq!(read_back.get(2), Some(&Value::Int32(-123456)));
		assert_eq!(read_back.get(3), Some(&Value::Int64(9_000_000_000)));
	}
}
