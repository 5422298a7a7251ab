//! C2 — field properties: the reflective description of one column.

use bitflags::bitflags;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{DataType, DateTimeKind, DateTimeType, StringEncoding};
use crate::value::Value;

bitflags! {
	/// Subset of flags a field may carry. `ID` marks identifier fields (§3, C4); a layout's
	/// identifier set is every field with this flag.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct FieldFlags: u8 {
		const ID             = 0b0000_0001;
		const INDEX          = 0b0000_0010;
		const UNIQUE         = 0b0000_0100;
		const AUTO_INCREMENT = 0b0000_1000;
		const NULLABLE       = 0b0001_0000;
	}
}

/// Per-column metadata: name, type, flags, defaults and the parse/format behavior described in
/// §4.1. Field properties are immutable once built by [`crate::layout::LayoutBuilder`] or the
/// `#[derive(TableRow)]` macro.
#[derive(Debug, Clone)]
pub struct FieldProperties {
	pub index: usize,
	pub name: String,
	pub name_at_database: String,
	pub alternative_names: Vec<String>,
	pub data_type: DataType,
	pub database_data_type: DataType,
	pub flags: FieldFlags,
	pub maximum_length: Option<f64>,
	pub date_time_kind: DateTimeKind,
	pub date_time_type: DateTimeType,
	pub string_encoding: StringEncoding,
	pub default_value: Option<Value>,
	pub description: Option<String>,
	pub display_format: Option<String>,
}

impl FieldProperties {
	/// Builds a field from the minimum required shape and applies the defaulting rules the
	/// invariant in §3 calls `Validate()`: strings default to UTF-8, date/time kinds default to
	/// `Native`, enums store as `Int64`, `User` round-trips through UTF-8 `String`.
	pub fn new(index: usize, name: impl Into<String>, data_type: DataType, flags: FieldFlags) -> Self {
		let name = name.into();
		let mut field = Self {
			index,
			name_at_database: name.clone(),
			name,
			alternative_names: Vec::new(),
			data_type,
			database_data_type: data_type.database_data_type(),
			flags,
			maximum_length: None,
			date_time_kind: DateTimeKind::default(),
			date_time_type: DateTimeType::default(),
			string_encoding: StringEncoding::default(),
			default_value: None,
			description: None,
			display_format: None,
		};
		field.validate();
		field
	}

	/// Re-applies the defaulting rules from §4.1. Called by the derive macro and by
	/// `LayoutBuilder::build` after every attribute override has been applied.
	pub fn validate(&mut self) {
		match self.data_type {
			DataType::String => {
				// stringEncoding already defaults to UTF8 via `StringEncoding::default()`.
			}
			DataType::DateTime | DataType::TimeSpan => {
				self.database_data_type = self.date_time_type.database_data_type(self.data_type);
			}
			DataType::Enum => self.database_data_type = DataType::Int64,
			DataType::User => {
				self.database_data_type = DataType::String;
			}
			_ => {}
		}
		if self.default_value.is_none() && !self.flags.contains(FieldFlags::NULLABLE) {
			self.default_value = Some(Value::default_for(self.data_type));
		}
	}

	pub fn is_nullable(&self) -> bool {
		self.flags.contains(FieldFlags::NULLABLE)
	}

	/// Formats a value as text per the rules in §4.1: dates/time-spans use the selected
	/// representation, binary is unpadded base64, bools are `True`/`False`, strings are
	/// escape-encoded and optionally wrapped in `marker` with internal markers doubled.
	pub fn get_string(&self, value: &Value, marker: Option<char>) -> Result<String> {
		if value.is_null() {
			return Ok(String::new());
		}
		let raw = match (self.data_type, value) {
			(DataType::Binary, Value::Binary(bytes)) => {
				use base64::Engine;
				base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes)
			}
			(DataType::Bool, Value::Bool(b)) => b.to_string(),
			(DataType::Char, Value::Char(c)) => c.to_string(),
			(DataType::Int8, Value::Int8(v)) => v.to_string(),
			(DataType::Int16, Value::Int16(v)) => v.to_string(),
			(DataType::Int32, Value::Int32(v)) => v.to_string(),
			(DataType::Int64, Value::Int64(v)) => v.to_string(),
			(DataType::UInt8, Value::UInt8(v)) => v.to_string(),
			(DataType::UInt16, Value::UInt16(v)) => v.to_string(),
			(DataType::UInt32, Value::UInt32(v)) => v.to_string(),
			(DataType::UInt64, Value::UInt64(v)) => v.to_string(),
			(DataType::Single, Value::Single(v)) => v.to_string(),
			(DataType::Double, Value::Double(v)) => v.to_string(),
			(DataType::Decimal, Value::Decimal(v)) => v.to_string(),
			(DataType::Enum, Value::Enum(v)) => v.to_string(),
			(DataType::Guid, Value::Guid(v)) => v.to_string(),
			(DataType::DateTime, Value::DateTime(v)) => self.format_date_time(*v),
			(DataType::TimeSpan, Value::TimeSpan(v)) => self.format_time_span(*v),
			(DataType::String, Value::String(s)) => escape_string(s),
			(DataType::User, Value::User(s)) => escape_string(s),
			(dt, v) => {
				return Err(Error::InvalidSchema(format!(
					"value {v:?} does not match declared data type {dt:?} of field '{}'",
					self.name
				)))
			}
		};
		Ok(match marker {
			Some(m) if matches!(self.data_type, DataType::String | DataType::User) => wrap_with_marker(&raw, m),
			_ => raw,
		})
	}

	fn format_date_time(&self, value: DateTime<Utc>) -> String {
		match self.date_time_type {
			DateTimeType::Native => value.to_rfc3339(),
			DateTimeType::BigIntTicks => (ticks_from_datetime(value)).to_string(),
			DateTimeType::BigIntMilliSeconds => value.timestamp_millis().to_string(),
			DateTimeType::BigIntSeconds => value.timestamp().to_string(),
			DateTimeType::BigIntEpoch => value.timestamp().to_string(),
			DateTimeType::BigIntHumanReadable => format!(
				"{:04}{:02}{:02}{:02}{:02}{:02}{:03}",
				value.year(),
				value.month(),
				value.day(),
				value.hour(),
				value.minute(),
				value.second(),
				value.timestamp_subsec_millis()
			),
			DateTimeType::DoubleSeconds | DateTimeType::DoubleEpoch => {
				(value.timestamp() as f64 + value.timestamp_subsec_nanos() as f64 / 1e9).to_string()
			}
			DateTimeType::DecimalSeconds => {
				Decimal::from(value.timestamp()).to_string()
			}
		}
	}

	fn format_time_span(&self, value: chrono::Duration) -> String {
		match self.date_time_type {
			DateTimeType::Native => value.to_string(),
			DateTimeType::BigIntTicks => (value.num_nanoseconds().unwrap_or(0) / 100).to_string(),
			DateTimeType::BigIntMilliSeconds => value.num_milliseconds().to_string(),
			DateTimeType::BigIntSeconds | DateTimeType::BigIntEpoch => value.num_seconds().to_string(),
			DateTimeType::BigIntHumanReadable => value.num_milliseconds().to_string(),
			DateTimeType::DoubleSeconds | DateTimeType::DoubleEpoch => {
				(value.num_milliseconds() as f64 / 1000.0).to_string()
			}
			DateTimeType::DecimalSeconds => Decimal::from(value.num_seconds()).to_string(),
		}
	}

	/// Parses text back into a [`Value`] of this field's declared type (`ParseValue`, §4.1/§4.2).
	pub fn parse_value(&self, text: &str, marker: Option<char>) -> Result<Value> {
		let text = match marker {
			Some(m) if matches!(self.data_type, DataType::String | DataType::User) => unwrap_marker(text, m),
			_ => text.to_string(),
		};
		if text.is_empty() && self.is_nullable() {
			return Ok(Value::Null);
		}
		let invalid = |e: std::fmt::Arguments| Error::InvalidSchema(e.to_string());
		Ok(match self.data_type {
			DataType::Binary => {
				use base64::Engine;
				Value::Binary(
					base64::engine::general_purpose::STANDARD_NO_PAD
						.decode(text.as_bytes())
						.map_err(|e| invalid(format_args!("invalid base64 in field '{}': {e}", self.name)))?,
				)
			}
			DataType::Bool => Value::Bool(parse_bool(&text)),
			DataType::Char => Value::Char(text.chars().next().unwrap_or('\0')),
			DataType::Int8 => Value::Int8(text.parse().map_err(|_| invalid(format_args!("bad int8: {text}")))?),
			DataType::Int16 => Value::Int16(text.parse().map_err(|_| invalid(format_args!("bad int16: {text}")))?),
			DataType::Int32 => Value::Int32(text.parse().map_err(|_| invalid(format_args!("bad int32: {text}")))?),
			DataType::Int64 => Value::Int64(text.parse().map_err(|_| invalid(format_args!("bad int64: {text}")))?),
			DataType::UInt8 => Value::UInt8(text.parse().map_err(|_| invalid(format_args!("bad uint8: {text}")))?),
			DataType::UInt16 => Value::UInt16(text.parse().map_err(|_| invalid(format_args!("bad uint16: {text}")))?),
			DataType::UInt32 => Value::UInt32(text.parse().map_err(|_| invalid(format_args!("bad uint32: {text}")))?),
			DataType::UInt64 => Value::UInt64(text.parse().map_err(|_| invalid(format_args!("bad uint64: {text}")))?),
			DataType::Single => Value::Single(text.parse().map_err(|_| invalid(format_args!("bad f32: {text}")))?),
			DataType::Double => Value::Double(text.parse().map_err(|_| invalid(format_args!("bad f64: {text}")))?),
			DataType::Decimal => Value::Decimal(Decimal::from_str(&text).map_err(|_| invalid(format_args!("bad decimal: {text}")))?),
			DataType::String => Value::String(unescape_string(&text)),
			DataType::User => Value::User(unescape_string(&text)),
			DataType::Enum => Value::Enum(text.parse().map_err(|_| invalid(format_args!("bad enum discriminant: {text}")))?),
			DataType::Guid => Value::Guid(Uuid::parse_str(&text).map_err(|_| invalid(format_args!("bad guid: {text}")))?),
			DataType::DateTime => Value::DateTime(self.parse_date_time(&text)?),
			DataType::TimeSpan => Value::TimeSpan(self.parse_time_span(&text)?),
		})
	}

	fn parse_date_time(&self, text: &str) -> Result<DateTime<Utc>> {
		let bad = || Error::InvalidSchema(format!("bad datetime in field '{}': {text}", self.name));
		Ok(match self.date_time_type {
			DateTimeType::Native => DateTime::parse_from_rfc3339(text).map_err(|_| bad())?.with_timezone(&Utc),
			DateTimeType::BigIntTicks => datetime_from_ticks(text.parse().map_err(|_| bad())?),
			DateTimeType::BigIntMilliSeconds => {
				DateTime::from_timestamp_millis(text.parse().map_err(|_| bad())?).ok_or_else(bad)?
			}
			DateTimeType::BigIntSeconds | DateTimeType::BigIntEpoch => {
				DateTime::from_timestamp(text.parse().map_err(|_| bad())?, 0).ok_or_else(bad)?
			}
			DateTimeType::BigIntHumanReadable => parse_human_readable(text).ok_or_else(bad)?,
			DateTimeType::DoubleSeconds | DateTimeType::DoubleEpoch => {
				let seconds: f64 = text.parse().map_err(|_| bad())?;
				DateTime::from_timestamp(seconds.trunc() as i64, ((seconds.fract()) * 1e9) as u32).ok_or_else(bad)?
			}
			DateTimeType::DecimalSeconds => {
				let seconds: Decimal = Decimal::from_str(text).map_err(|_| bad())?;
				DateTime::from_timestamp(seconds.trunc().try_into().unwrap_or(0), 0).ok_or_else(bad)?
			}
		})
	}

	fn parse_time_span(&self, text: &str) -> Result<chrono::Duration> {
		let bad = || Error::InvalidSchema(format!("bad timespan in field '{}': {text}", self.name));
		Ok(match self.date_time_type {
			DateTimeType::BigIntTicks => chrono::Duration::nanoseconds(text.parse::<i64>().map_err(|_| bad())? * 100),
			DateTimeType::BigIntMilliSeconds | DateTimeType::BigIntHumanReadable => {
				chrono::Duration::milliseconds(text.parse().map_err(|_| bad())?)
			}
			DateTimeType::BigIntSeconds | DateTimeType::BigIntEpoch => {
				chrono::Duration::seconds(text.parse().map_err(|_| bad())?)
			}
			DateTimeType::DoubleSeconds | DateTimeType::DoubleEpoch => {
				chrono::Duration::milliseconds((text.parse::<f64>().map_err(|_| bad())? * 1000.0) as i64)
			}
			DateTimeType::DecimalSeconds => {
				chrono::Duration::milliseconds((Decimal::from_str(text).map_err(|_| bad())? * Decimal::from(1000)).try_into().unwrap_or(0))
			}
			DateTimeType::Native => parse_native_timespan(text).ok_or_else(bad)?,
		})
	}
}

fn parse_bool(text: &str) -> bool {
	matches!(text.to_ascii_lowercase().as_str(), "true" | "on" | "yes" | "1")
}

/// `.NET` ticks are 100ns units since `0001-01-01`. The Unix epoch sits at tick `621_355_968_000_000_000`.
/// Shared with the DAT codec (§4.5), whose `BigIntTicks`-independent `DateTime`/`TimeSpan` wire
/// format always stores ticks regardless of a field's declared [`DateTimeType`].
pub(crate) const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

fn ticks_from_datetime(value: DateTime<Utc>) -> i64 {
	TICKS_AT_UNIX_EPOCH + value.timestamp() * 10_000_000 + (value.timestamp_subsec_nanos() as i64) / 100
}

fn datetime_from_ticks(ticks: i64) -> DateTime<Utc> {
	let since_epoch = ticks - TICKS_AT_UNIX_EPOCH;
	let seconds = since_epoch.div_euclid(10_000_000);
	let sub_ticks = since_epoch.rem_euclid(10_000_000);
	DateTime::from_timestamp(seconds, (sub_ticks * 100) as u32).unwrap_or(DateTime::<Utc>::from_timestamp(0, 0).unwrap())
}

fn parse_human_readable(text: &str) -> Option<DateTime<Utc>> {
	// "yyyyMMddHHmmssfff"
	if text.len() != 17 {
		return None;
	}
	let get = |range: std::ops::Range<usize>| text.get(range)?.parse::<u32>().ok();
	let year = get(0..4)? as i32;
	let month = get(4..6)?;
	let day = get(6..8)?;
	let hour = get(8..10)?;
	let minute = get(10..12)?;
	let second = get(12..14)?;
	let millis = get(14..17)?;
	chrono::NaiveDate::from_ymd_opt(year, month, day)?
		.and_hms_milli_opt(hour, minute, second, millis)
		.map(|naive| naive.and_utc())
}

fn parse_native_timespan(text: &str) -> Option<chrono::Duration> {
	// `d.hh:mm:ss.fff` or `hh:mm:ss.fff`, the .NET `TimeSpan.ToString()` default format.
	let negative = text.starts_with('-');
	let text = text.trim_start_matches('-');
	let (days, rest) = match text.split_once('.') {
		Some((d, rest)) if rest.contains(':') => (d.parse().ok()?, rest),
		_ => (0i64, text),
	};
	let mut parts = rest.splitn(3, ':');
	let hours: i64 = parts.next()?.parse().ok()?;
	let minutes: i64 = parts.next()?.parse().ok()?;
	let (seconds, millis) = match parts.next()?.split_once('.') {
		Some((s, ms)) => (s.parse().ok()?, format!("{ms:0<3}").parse().ok()?),
		None => (parts.next().unwrap_or("0").parse().ok()?, 0i64),
	};
	let total = chrono::Duration::days(days)
		+ chrono::Duration::hours(hours)
		+ chrono::Duration::minutes(minutes)
		+ chrono::Duration::seconds(seconds)
		+ chrono::Duration::milliseconds(millis);
	Some(if negative { -total } else { total })
}

/// Escapes control characters the way §4.1 requires for plain-text representations.
fn escape_string(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			'\\' => out.push_str("\\\\"),
			'\0' => out.push_str("\\0"),
			c => out.push(c),
		}
	}
	out
}

fn unescape_string(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	let mut chars = value.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);
			continue;
		}
		match chars.next() {
			Some('n') => out.push('\n'),
			Some('r') => out.push('\r'),
			Some('t') => out.push('\t'),
			Some('0') => out.push('\0'),
			Some('\\') => out.push('\\'),
			Some(other) => {
				out.push('\\');
				out.push(other);
			}
			None => out.push('\\'),
		}
	}
	out
}

fn wrap_with_marker(value: &str, marker: char) -> String {
	let doubled = value.replace(marker, &format!("{marker}{marker}"));
	// A leading/trailing marker inside the (already escaped) payload would be ambiguous with the
	// wrapping marker on read; pad with a single space as the CSV writer does (§4.6, §9 open
	// question — kept as documented behavior rather than silently dropped).
	let doubled = if doubled.starts_with(marker) {
		format!(" {doubled}")
	} else {
		doubled
	};
	let doubled = if doubled.ends_with(marker) {
		format!("{doubled} ")
	} else {
		doubled
	};
	format!("{marker}{doubled}{marker}")
}

fn unwrap_marker(text: &str, marker: char) -> String {
	let mut chars = text.chars();
	let Some(first) = chars.next() else { return String::new() };
	if first != marker || !text.ends_with(marker) || text.len() < 2 {
		return text.to_string();
	}
	let inner = &text[marker.len_utf8()..text.len() - marker.len_utf8()];
	let inner = inner.trim_matches(' ');
	inner.replace(&format!("{marker}{marker}"), &marker.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn string_field() -> FieldProperties {
		FieldProperties::new(0, "name", DataType::String, FieldFlags::empty())
	}

	#[test]
	fn escapes_and_wraps_strings() {
		let field = string_field();
		let value = Value::String("a,b\"c".to_string());
		let text = field.get_string(&value, Some('"')).unwrap();
		assert_eq!(field.parse_value(&text, Some('"')).unwrap(), value);
	}

	#[test]
	fn parses_bool_variants() {
		assert!(parse_bool("yes"));
		assert!(parse_bool("1"));
		assert!(parse_bool("On"));
		assert!(!parse_bool("nope"));
	}

	#[test]
	fn ticks_roundtrip() {
		let now = DateTime::from_timestamp(1_700_000_000, 123_400_00).unwrap();
		let ticks = ticks_from_datetime(now);
		let back = datetime_from_ticks(ticks);
		assert_eq!(now.timestamp(), back.timestamp());
	}
}
