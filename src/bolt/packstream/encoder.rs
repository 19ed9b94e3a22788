//! PackStream encoder.

use bytes::BufMut;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue, ValueMap};
use super::PackStreamError;

/// Writes PackStream values straight into a caller-owned buffer.
///
/// The encoder borrows the destination so the framing codec can serialize a
/// message into its own scratch buffer without an intermediate allocation.
pub struct PackStreamEncoder<'a, B: BufMut> {
    buffer: &'a mut B,
}

impl<'a, B: BufMut> PackStreamEncoder<'a, B> {
    /// Create an encoder writing into `buffer`.
    pub fn new(buffer: &'a mut B) -> Self {
        Self { buffer }
    }

    /// Encode any value.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.buffer.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => {
                self.buffer.put_u8(FLOAT_64);
                self.buffer.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => self.encode_bytes(b)?,
            PackStreamValue::String(s) => self.encode_string(s)?,
            PackStreamValue::List(l) => self.encode_list(l)?,
            PackStreamValue::Map(m) => self.encode_map(m)?,
            PackStreamValue::Structure(s) => self.encode_structure(s.tag, &s.fields)?,
        }
        Ok(())
    }

    /// Encode an integer using the smallest representation.
    pub fn encode_int(&mut self, value: i64) {
        if fits_tiny_int(value) {
            self.buffer.put_i8(value as i8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(v);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    /// Encode a byte array.
    pub fn encode_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        self.write_size("bytes", value.len(), None, [BYTES_8, BYTES_16, BYTES_32])?;
        self.buffer.put_slice(value);
        Ok(())
    }

    /// Encode a string.
    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        let bytes = value.as_bytes();
        self.write_size(
            "string",
            bytes.len(),
            Some(TINY_STRING),
            [STRING_8, STRING_16, STRING_32],
        )?;
        self.buffer.put_slice(bytes);
        Ok(())
    }

    /// Encode a list.
    pub fn encode_list(&mut self, values: &[PackStreamValue]) -> Result<(), PackStreamError> {
        self.write_size("list", values.len(), Some(TINY_LIST), [LIST_8, LIST_16, LIST_32])?;
        for value in values {
            self.encode(value)?;
        }
        Ok(())
    }

    /// Encode a map.
    pub fn encode_map(&mut self, map: &ValueMap) -> Result<(), PackStreamError> {
        self.write_size("map", map.len(), Some(TINY_MAP), [MAP_8, MAP_16, MAP_32])?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    /// Encode a structure header followed by its fields.
    pub fn encode_structure(
        &mut self,
        tag: u8,
        fields: &[PackStreamValue],
    ) -> Result<(), PackStreamError> {
        let len = fields.len();
        if len <= TINY_MAX {
            self.buffer.put_u8(TINY_STRUCT | len as u8);
        } else if let Ok(n) = u8::try_from(len) {
            self.buffer.put_u8(STRUCT_8);
            self.buffer.put_u8(n);
        } else if let Ok(n) = u16::try_from(len) {
            self.buffer.put_u8(STRUCT_16);
            self.buffer.put_u16(n);
        } else {
            return Err(PackStreamError::ValueTooLarge("structure", len));
        }
        self.buffer.put_u8(tag);
        for field in fields {
            self.encode(field)?;
        }
        Ok(())
    }

    fn write_size(
        &mut self,
        what: &'static str,
        len: usize,
        tiny: Option<u8>,
        sized: [u8; 3],
    ) -> Result<(), PackStreamError> {
        match tiny {
            Some(base) if len <= TINY_MAX => self.buffer.put_u8(base | len as u8),
            _ => {
                if let Ok(n) = u8::try_from(len) {
                    self.buffer.put_u8(sized[0]);
                    self.buffer.put_u8(n);
                } else if let Ok(n) = u16::try_from(len) {
                    self.buffer.put_u8(sized[1]);
                    self.buffer.put_u16(n);
                } else if let Ok(n) = u32::try_from(len) {
                    self.buffer.put_u8(sized[2]);
                    self.buffer.put_u32(n);
                } else {
                    return Err(PackStreamError::ValueTooLarge(what, len));
                }
            }
        }
        Ok(())
    }
}

/// Encode a structure into a fresh buffer.
pub fn encode_structure(s: &PackStreamStructure) -> Result<Vec<u8>, PackStreamError> {
    let mut buf = Vec::with_capacity(64);
    PackStreamEncoder::new(&mut buf).encode_structure(s.tag, &s.fields)?;
    Ok(buf)
}

/// Encode a single value into a fresh buffer.
pub fn encode(value: &PackStreamValue) -> Result<Vec<u8>, PackStreamError> {
    let mut buf = Vec::with_capacity(64);
    PackStreamEncoder::new(&mut buf).encode(value)?;
    Ok(buf)
}
