//! Owned primitive I/O used by the binary codecs (§4.5, §4.6 of the design doc).
//!
//! The source ecosystem this crate is adapted from treats `DataReader`/`DataWriter` 7-bit
//! varints as an external collaborator; a standalone crate has no such collaborator, so the
//! continuation-bit varint and the little-endian fixed-width helpers are implemented here once
//! and shared by the DAT codec and the row-level stream serializer.

use std::io::{Error, ErrorKind, Read, Result, Write};

/// Reads a signed 7-bit encoded integer (continuation-bit varint, little-endian payload).
pub fn read_7bit_encoded_int(stream: &mut impl Read) -> Result<i64> {
	read_7bit_encoded_uint(stream).map(zigzag_decode)
}

/// Writes a signed 7-bit encoded integer.
pub fn write_7bit_encoded_int(stream: &mut impl Write, value: i64) -> Result<()> {
	write_7bit_encoded_uint(stream, zigzag_encode(value))
}

/// Reads an unsigned 7-bit encoded integer. The high bit of each byte marks "more bytes follow".
pub fn read_7bit_encoded_uint(stream: &mut impl Read) -> Result<u64> {
	let mut result: u64 = 0;
	let mut shift = 0u32;
	loop {
		if shift >= 70 {
			return Err(Error::from(ErrorKind::InvalidData));
		}
		let mut byte = [0u8; 1];
		stream.read_exact(&mut byte)?;
		result |= ((byte[0] & 0x7F) as u64) << shift;
		if byte[0] & 0x80 == 0 {
			return Ok(result);
		}
		shift += 7;
	}
}

/// Writes an unsigned 7-bit encoded integer.
pub fn write_7bit_encoded_uint(stream: &mut impl Write, mut value: u64) -> Result<()> {
	loop {
		let byte = (value & 0x7F) as u8;
		value >>= 7;
		if value == 0 {
			stream.write_all(&[byte])?;
			return Ok(());
		}
		stream.write_all(&[byte | 0x80])?;
	}
}

#[inline]
fn zigzag_encode(value: i64) -> u64 {
	((value << 1) ^ (value >> 63)) as u64
}

#[inline]
fn zigzag_decode(value: u64) -> i64 {
	((value >> 1) as i64) ^ -((value & 1) as i64)
}

macro_rules! le_primitive {
	($read:ident, $write:ident, $ty:ty) => {
		pub fn $read(stream: &mut impl Read) -> Result<$ty> {
			let mut bytes = [0u8; std::mem::size_of::<$ty>()];
			stream.read_exact(&mut bytes)?;
			Ok(<$ty>::from_le_bytes(bytes))
		}

		pub fn $write(stream: &mut impl Write, value: $ty) -> Result<()> {
			stream.write_all(&value.to_le_bytes())
		}
	};
}

le_primitive!(read_i16_le, write_i16_le, i16);
le_primitive!(read_u16_le, write_u16_le, u16);
le_primitive!(read_i32_le, write_i32_le, i32);
le_primitive!(read_u32_le, write_u32_le, u32);
le_primitive!(read_i64_le, write_i64_le, i64);
le_primitive!(read_u64_le, write_u64_le, u64);
le_primitive!(read_f32_le, write_f32_le, f32);
le_primitive!(read_f64_le, write_f64_le, f64);

pub fn read_u8(stream: &mut impl Read) -> Result<u8> {
	let mut byte = [0u8; 1];
	stream.read_exact(&mut byte)?;
	Ok(byte[0])
}

pub fn write_u8(stream: &mut impl Write, value: u8) -> Result<()> {
	stream.write_all(&[value])
}

/// A length-prefixed (7-bit) UTF-8 string, used for layout/field names and DAT v1..v4 strings.
pub fn read_prefixed_string(stream: &mut impl Read) -> Result<String> {
	let len = read_7bit_encoded_uint(stream)? as usize;
	let mut buf = vec![0u8; len];
	stream.read_exact(&mut buf)?;
	String::from_utf8(buf).map_err(|_| Error::from(ErrorKind::InvalidData))
}

pub fn write_prefixed_string(stream: &mut impl Write, value: &str) -> Result<()> {
	write_7bit_encoded_uint(stream, value.len() as u64)?;
	stream.write_all(value.as_bytes())
}

/// Centralizes the v5 "nullable prefix" convention so the DAT codec and the row-level
/// serializer (C11) implement nullability once instead of duplicating it per data type.
pub struct NullableEncoding;

impl NullableEncoding {
	pub const PRESENT: u8 = 0x00;
	pub const NULL: u8 = 0x01;
	/// Sentinel used for `Bool`, which only has two payload values and needs a distinct marker.
	pub const BOOL_NULL: u8 = 0xFF;
	/// Sentinel length used for `Binary`/`String` values encoded with a signed length prefix.
	pub const LENGTH_NULL: i64 = -1;

	pub fn write_prefix(stream: &mut impl Write, is_null: bool) -> Result<()> {
		write_u8(stream, if is_null { Self::NULL } else { Self::PRESENT })
	}

	pub fn read_prefix(stream: &mut impl Read) -> Result<bool> {
		Ok(read_u8(stream)? == Self::NULL)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn roundtrips_small_and_large_uints() {
		for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
			let mut buf = Vec::new();
			write_7bit_encoded_uint(&mut buf, value).unwrap();
			let mut cursor = Cursor::new(buf);
			assert_eq!(read_7bit_encoded_uint(&mut cursor).unwrap(), value);
		}
	}

	#[test]
	fn roundtrips_negative_ints() {
		for value in [0i64, -1, 1, -128, 128, i64::MIN, i64::MAX] {
			let mut buf = Vec::new();
			write_7bit_encoded_int(&mut buf, value).unwrap();
			let mut cursor = Cursor::new(buf);
			assert_eq!(read_7bit_encoded_int(&mut cursor).unwrap(), value);
		}
	}

	#[test]
	fn roundtrips_prefixed_string() {
		let mut buf = Vec::new();
		write_prefixed_string(&mut buf, "héllo").unwrap();
		let mut cursor = Cursor::new(buf);
		assert_eq!(read_prefixed_string(&mut cursor).unwrap(), "héllo");
	}
}
