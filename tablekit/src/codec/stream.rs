//! C11 — the compact row-level binary serializer for remoting rows/tables (§6 "Record-level
//! serializer"). Unlike the DAT codec, the layout is optional: a leading flags byte says whether
//! one travels with the payload.

use std::io::Write;
use std::sync::Arc;

use crate::codec::dat::{data_type_from_discriminant, read_value, write_value, CURRENT_VERSION};
use crate::error::{Error, Result};
use crate::layout::{LayoutBuilder, RowLayout};
use crate::row::Row;
use crate::value::Value;
use crate::varint::*;

const FLAG_WITH_LAYOUT: u8 = 0b0000_0001;

/// Writes `rows` using DAT-v5 per-field encoding, with `layout` embedded only when
/// `with_layout` is set (§6).
pub fn write_rows<W: Write>(writer: &mut W, layout: &RowLayout, rows: &[Row], with_layout: bool) -> Result<()> {
	let flags = if with_layout { FLAG_WITH_LAYOUT } else { 0 };
	write_7bit_encoded_uint(writer, flags as u64)?;
	if with_layout {
		write_embedded_layout(writer, layout)?;
	}
	write_7bit_encoded_int(writer, rows.len() as i64)?;
	for row in rows {
		for field in layout.fields() {
			let value = row.get(field.index).cloned().unwrap_or(Value::Null);
			write_value(writer, field, &value, CURRENT_VERSION)?;
		}
	}
	Ok(())
}

/// Reads a row stream written by [`write_rows`]. When the payload carries no embedded layout,
/// `fallback_layout` is used to decode it.
pub fn read_rows(bytes: &[u8], fallback_layout: Option<&Arc<RowLayout>>) -> Result<(Arc<RowLayout>, Vec<Row>)> {
	let mut cursor = std::io::Cursor::new(bytes);
	let flags = read_7bit_encoded_uint(&mut cursor)? as u8;
	let layout = if flags & FLAG_WITH_LAYOUT != 0 {
		Arc::new(read_embedded_layout(&mut cursor)?)
	} else {
		fallback_layout
			.cloned()
			.ok_or_else(|| Error::InvalidArgument("row stream has no embedded layout and none was supplied".into()))?
	};
	let count = read_7bit_encoded_int(&mut cursor)?;
	if count < 0 {
		return Err(Error::MalformedInput("negative row count in row stream".into()));
	}
	let mut rows = Vec::with_capacity(count as usize);
	for _ in 0..count {
		let mut values = Vec::with_capacity(layout.field_count());
		for field in layout.fields() {
			values.push(read_value(&mut cursor, field, CURRENT_VERSION)?);
		}
		rows.push(Row::new(layout.clone(), values)?);
	}
	Ok((layout, rows))
}

fn write_embedded_layout<W: Write>(writer: &mut W, layout: &RowLayout) -> Result<()> {
	write_prefixed_string(writer, layout.name())?;
	write_7bit_encoded_int(writer, layout.field_count() as i64)?;
	for field in layout.fields() {
		write_prefixed_string(writer, &field.name)?;
		write_7bit_encoded_int(writer, field.data_type as i64)?;
		write_7bit_encoded_int(writer, field.flags.bits() as i64)?;
	}
	Ok(())
}

fn read_embedded_layout(cursor: &mut std::io::Cursor<&[u8]>) -> Result<RowLayout> {
	let name = read_prefixed_string(cursor)?;
	let field_count = read_7bit_encoded_int(cursor)?;
	if field_count < 0 {
		return Err(Error::MalformedInput("negative field count in embedded layout".into()));
	}
	let mut builder = LayoutBuilder::new(name);
	for index in 0..field_count {
		let name = read_prefixed_string(cursor)?;
		let data_type = data_type_from_discriminant(read_7bit_encoded_int(cursor)?)?;
		let flags = crate::field::FieldFlags::from_bits_truncate(read_7bit_encoded_int(cursor)? as u8);
		builder = builder.field(crate::field::FieldProperties::new(index as usize, name, data_type, flags));
	}
	builder.build()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::types::DataType;

	fn layout() -> RowLayout {
		LayoutBuilder::new("Item")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
			.field(FieldProperties::new(1, "name", DataType::String, FieldFlags::NULLABLE))
			.build()
			.unwrap()
	}

	#[test]
	fn roundtrips_with_embedded_layout() {
		let layout = layout();
		let layout_arc = Arc::new(layout.clone());
		let rows = vec![
			Row::new(layout_arc.clone(), vec![Value::Int64(1), Value::Null]).unwrap(),
			Row::new(layout_arc.clone(), vec![Value::Int64(2), Value::String("b".into())]).unwrap(),
		];
		let mut buf = Vec::new();
		write_rows(&mut buf, &layout, &rows, true).unwrap();
		let (read_layout, read_rows) = read_rows(&buf, None).unwrap();
		assert_eq!(read_layout.as_ref(), &layout);
		assert_eq!(read_rows[0].get(1), Some(&Value::Null));
		assert_eq!(read_rows[1].get(1), Some(&Value::String("b".into())));
	}

	#[test]
	fn roundtrips_without_layout_using_fallback() {
		let layout = Arc::new(layout());
		let rows = vec![Row::new(layout.clone(), vec![Value::Int64(5), Value::Null]).unwrap()];
		let mut buf = Vec::new();
		write_rows(&mut buf, &layout, &rows, false).unwrap();
		let (_, read_rows) = read_rows(&buf, Some(&layout)).unwrap();
		assert_eq!(read_rows[0].get(0), Some(&Value::Int64(5)));
	}

	#[test]
	fn missing_layout_without_fallback_errors() {
		let layout = layout();
		let rows = vec![Row::new(Arc::new(layout.clone()), vec![Value::Int64(5), Value::Null]).unwrap()];
		let mut buf = Vec::new();
		write_rows(&mut buf, &layout, &rows, false).unwrap();
		assert!(read_rows(&buf, None).is_err());
	}
}
