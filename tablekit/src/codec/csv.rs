//! C10 — the human-readable CSV codec (§4.6).

use std::io::Write;

use crate::error::{Error, Result};
use crate::layout::RowLayout;
use crate::row::Row;
use crate::value::Value;

/// Row terminator written between CSV records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewLineMode {
	Lf,
	CrLf,
}

impl NewLineMode {
	fn as_str(self) -> &'static str {
		match self {
			NewLineMode::Lf => "\n",
			NewLineMode::CrLf => "\r\n",
		}
	}
}

/// Configures how a layout's rows are rendered to and parsed from CSV text (§4.6). Encoding is
/// always UTF-8 and formatting always uses each field's own `dateTimeType`/`stringEncoding`
/// rules; this crate has no locale-aware culture to plug into `GetString`, so the source's
/// `format: culture` knob is dropped rather than faked (documented in DESIGN.md).
#[derive(Debug, Clone)]
pub struct CsvProperties {
	pub separator: char,
	pub string_marker: Option<char>,
	pub newline: NewLineMode,
	pub no_header: bool,
	pub allow_field_matching: bool,
	pub save_default_values: bool,
}

impl Default for CsvProperties {
	fn default() -> Self {
		Self {
			separator: ',',
			string_marker: Some('"'),
			newline: NewLineMode::Lf,
			no_header: false,
			allow_field_matching: false,
			save_default_values: true,
		}
	}
}

/// Writes `rows` as CSV under `layout` following `properties` (§4.6).
pub fn write_csv<W: Write>(writer: &mut W, layout: &RowLayout, rows: &[Row], properties: &CsvProperties) -> Result<()> {
	let mut out = String::new();
	if !properties.no_header {
		let names: Vec<&str> = layout.fields().iter().map(|f| f.name_at_database.as_str()).collect();
		out.push_str(&names.join(&properties.separator.to_string()));
		out.push_str(properties.newline.as_str());
	}
	for row in rows {
		let mut cells = Vec::with_capacity(layout.field_count());
		for field in layout.fields() {
			let value = row.get(field.index).cloned().unwrap_or(Value::Null);
			let text = if !properties.save_default_values && !value.is_null() && value.is_default() {
				String::new()
			} else {
				field.get_string(&value, properties.string_marker)?
			};
			cells.push(text);
		}
		out.push_str(&cells.join(&properties.separator.to_string()));
		out.push_str(properties.newline.as_str());
	}
	writer.write_all(out.as_bytes()).map_err(Error::Io)
}

/// Reads CSV text into rows shaped by `layout` (§4.6). When `allow_field_matching` is set, header
/// columns are matched against `layout` by `nameAtDatabase`/`name` (`-1`/`None` for columns the
/// layout lacks, which are then skipped); otherwise the header (or column position, if
/// `no_header`) must align 1:1 with `layout`'s field count.
pub fn read_csv(text: &str, layout: &RowLayout, properties: &CsvProperties) -> Result<Vec<Row>> {
	let mut lines = text.lines();
	let mapping: Vec<Option<usize>> = if properties.no_header {
		(0..layout.field_count()).map(Some).collect()
	} else {
		let header = lines.next().unwrap_or("");
		let columns = split_csv_line(header, properties.separator, properties.string_marker)?;
		if properties.allow_field_matching {
			columns
				.iter()
				.map(|name| {
					let name = name.trim();
					layout.fields().iter().find(|f| f.name_at_database == name || f.name == name).map(|f| f.index)
				})
				.collect()
		} else {
			if columns.len() != layout.field_count() {
				return Err(Error::InvalidSchema(format!(
					"csv header has {} columns, layout '{}' has {}",
					columns.len(),
					layout.name(),
					layout.field_count()
				)));
			}
			(0..layout.field_count()).map(Some).collect()
		}
	};

	let mut rows = Vec::new();
	for line in lines {
		if line.is_empty() {
			continue;
		}
		let columns = split_csv_line(line, properties.separator, properties.string_marker)?;
		if columns.len() != mapping.len() {
			return Err(Error::MalformedInput(format!("csv row has {} columns, expected {}", columns.len(), mapping.len())));
		}
		let mut values = vec![Value::Null; layout.field_count()];
		for (index, _) in layout.fields().iter().enumerate() {
			values[index] = Value::default_for(layout.field(index).unwrap().data_type);
		}
		for (column, target) in columns.iter().zip(mapping.iter()) {
			let Some(field_index) = target else { continue };
			let field = &layout.fields()[*field_index];
			if column.is_empty() && !field.is_nullable() {
				values[*field_index] = field.default_value.clone().unwrap_or_else(|| Value::default_for(field.data_type));
				continue;
			}
			values[*field_index] = field.parse_value(column, properties.string_marker)?;
		}
		rows.push(Row::new(std::sync::Arc::new(layout.clone()), values)?);
	}
	Ok(rows)
}

/// Splits one CSV line into raw (still marker-wrapped) field strings, tracking quote depth so a
/// separator inside a marker-quoted field does not split it. An odd marker count at end-of-line
/// is `MalformedInput` (§4.6).
fn split_csv_line(line: &str, separator: char, marker: Option<char>) -> Result<Vec<String>> {
	let mut fields = Vec::new();
	let mut current = String::new();
	let mut in_quotes = false;
	let mut quote_count = 0u32;
	for c in line.chars() {
		if Some(c) == marker {
			quote_count += 1;
			in_quotes = !in_quotes;
			current.push(c);
			continue;
		}
		if c == separator && !in_quotes {
			fields.push(std::mem::take(&mut current));
			continue;
		}
		current.push(c);
	}
	fields.push(current);
	if quote_count % 2 != 0 {
		return Err(Error::MalformedInput("unbalanced string marker in CSV row".into()));
	}
	Ok(fields)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::layout::LayoutBuilder;
	use crate::types::DataType;

	fn layout() -> RowLayout {
		LayoutBuilder::new("Item")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
			.field(FieldProperties::new(1, "name", DataType::String, FieldFlags::empty()))
			.build()
			.unwrap()
	}

	#[test]
	fn roundtrips_marker_escaped_values() {
		let layout = layout();
		let layout_arc = std::sync::Arc::new(layout.clone());
		let rows = vec![Row::new(layout_arc, vec![Value::Int64(1), Value::String("a,b\"c".into())]).unwrap()];
		let properties = CsvProperties::default();
		let mut buf = Vec::new();
		write_csv(&mut buf, &layout, &rows, &properties).unwrap();
		let text = String::from_utf8(buf).unwrap();
		let read = read_csv(&text, &layout, &properties).unwrap();
		assert_eq!(read.len(), 1);
		assert_eq!(read[0].get(1), Some(&Value::String("a,b\"c".into())));
	}

	#[test]
	fn unbalanced_marker_is_malformed() {
		let layout = layout();
		let properties = CsvProperties::default();
		let text = "id,name\n1,\"unterminated\n";
		let err = read_csv(text, &layout, &properties).unwrap_err();
		assert!(matches!(err, Error::MalformedInput(_)));
	}

	#[test]
	fn default_values_are_suppressed_when_disabled() {
		let layout = layout();
		let layout_arc = std::sync::Arc::new(layout.clone());
		let rows = vec![Row::new(layout_arc, vec![Value::Int64(1), Value::String(String::new())]).unwrap()];
		let mut properties = CsvProperties::default();
		properties.save_default_values = false;
		let mut buf = Vec::new();
		write_csv(&mut buf, &layout, &rows, &properties).unwrap();
		let text = String::from_utf8(buf).unwrap();
		assert!(text.contains("1,\n") || text.ends_with("1,"));
	}

	#[test]
	fn suppressed_default_on_non_nullable_numeric_field_reads_back() {
		let layout = LayoutBuilder::new("Counter")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
			.field(FieldProperties::new(1, "amount", DataType::Int64, FieldFlags::empty()))
			.build()
			.unwrap();
		let layout_arc = std::sync::Arc::new(layout.clone());
		let rows = vec![Row::new(layout_arc, vec![Value::Int64(1), Value::Int64(0)]).unwrap()];
		let mut properties = CsvProperties::default();
		properties.save_default_values = false;

		let mut buf = Vec::new();
		write_csv(&mut buf, &layout, &rows, &properties).unwrap();
		let text = String::from_utf8(buf).unwrap();
		let read_back = read_csv(&text, &layout, &properties).unwrap();
		assert_eq!(read_back.len(), 1);
		assert_eq!(read_back[0].get(1), Some(&Value::Int64(0)));
	}
}
