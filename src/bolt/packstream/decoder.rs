//! PackStream decoder.

use bytes::Buf;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue, ValueMap};
use super::PackStreamError;

/// Default limit on how deeply lists, maps and structures may nest.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Reads PackStream values from a byte slice.
///
/// Declared collection sizes are checked against the bytes actually left in
/// the slice before anything is allocated, so a hostile length prefix cannot
/// force a large allocation.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> PackStreamDecoder<'a> {
    /// Create a decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_max_depth(data, DEFAULT_MAX_DEPTH)
    }

    /// Create a decoder with a custom nesting limit.
    pub fn with_max_depth(data: &'a [u8], max_depth: usize) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Get the current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get remaining bytes count.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a structure header, returning `(field_count, tag)`.
    ///
    /// Fields are left unread so the caller can pick a decoder by tag first.
    pub fn read_struct_header(&mut self) -> Result<(usize, u8), PackStreamError> {
        let marker = self.read_u8()?;
        let fields = match classify(marker) {
            MarkerClass::TinyStruct(n) => n,
            MarkerClass::Sized(STRUCT_8) => self.read_u8()? as usize,
            MarkerClass::Sized(STRUCT_16) => self.read_u16()? as usize,
            _ => {
                return Err(PackStreamError::InvalidStructure(format!(
                    "expected a structure, found marker 0x{:02X}",
                    marker
                )))
            }
        };
        let tag = self.read_u8()?;
        Ok((fields, tag))
    }

    /// Decode `count` consecutive values.
    pub fn decode_fields(&mut self, count: usize) -> Result<Vec<PackStreamValue>, PackStreamError> {
        self.ensure_items(count, 1)?;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            fields.push(self.decode()?);
        }
        Ok(fields)
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.read_u8()?;
        match classify(marker) {
            MarkerClass::TinyInt(v) => Ok(PackStreamValue::Integer(v as i64)),
            MarkerClass::TinyString(len) => self.read_string(len),
            MarkerClass::TinyList(len) => self.nested(|d| d.read_list(len)),
            MarkerClass::TinyMap(len) => self.nested(|d| d.read_map(len)),
            MarkerClass::TinyStruct(len) => self.nested(|d| d.read_struct(len)),
            MarkerClass::Sized(marker) => self.decode_sized(marker),
            MarkerClass::Reserved(marker) => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    fn decode_sized(&mut self, marker: u8) -> Result<PackStreamValue, PackStreamError> {
        match marker {
            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => Ok(PackStreamValue::Float(self.read_fixed(8)?.get_f64())),

            INT_8 => Ok(PackStreamValue::Integer(self.read_u8()? as i8 as i64)),
            INT_16 => Ok(PackStreamValue::Integer(self.read_fixed(2)?.get_i16() as i64)),
            INT_32 => Ok(PackStreamValue::Integer(self.read_fixed(4)?.get_i32() as i64)),
            INT_64 => Ok(PackStreamValue::Integer(self.read_fixed(8)?.get_i64())),

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_size(marker - BYTES_8)?;
                Ok(PackStreamValue::Bytes(self.read_fixed(len)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_size(marker - STRING_8)?;
                self.read_string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_size(marker - LIST_8)?;
                self.nested(|d| d.read_list(len))
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_size(marker - MAP_8)?;
                self.nested(|d| d.read_map(len))
            }
            STRUCT_8 | STRUCT_16 => {
                let len = self.read_size(marker - STRUCT_8)?;
                self.nested(|d| d.read_struct(len))
            }
            other => Err(PackStreamError::UnknownMarker(other)),
        }
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, PackStreamError>,
    ) -> Result<T, PackStreamError> {
        if self.depth >= self.max_depth {
            return Err(PackStreamError::NestingTooDeep(self.max_depth));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.read_fixed(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(PackStreamValue::String(s.to_string()))
    }

    fn read_list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        Ok(PackStreamValue::List(self.decode_fields(len)?))
    }

    fn read_map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.ensure_items(len, 2)?;
        let mut map = ValueMap::with_capacity(len);
        for _ in 0..len {
            let key = match self.decode()? {
                PackStreamValue::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode()?;
            map.insert(key, value);
        }
        Ok(PackStreamValue::Map(map))
    }

    fn read_struct(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let tag = self.read_u8()?;
        let fields = self.decode_fields(len)?;
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }

    // Each item takes at least `min_bytes` on the wire.
    fn ensure_items(&self, count: usize, min_bytes: usize) -> Result<(), PackStreamError> {
        if count.saturating_mul(min_bytes) > self.remaining() {
            return Err(PackStreamError::UnexpectedEof);
        }
        Ok(())
    }

    // `width` is 0, 1 or 2 for an 8, 16 or 32-bit size prefix.
    fn read_size(&mut self, width: u8) -> Result<usize, PackStreamError> {
        Ok(match width {
            0 => self.read_u8()? as usize,
            1 => self.read_u16()? as usize,
            _ => self.read_fixed(4)?.get_u32() as usize,
        })
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        Ok(self.read_fixed(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        Ok(self.read_fixed(2)?.get_u16())
    }

    fn read_fixed(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.remaining() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Decode a single value from bytes.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    PackStreamDecoder::new(data).decode()
}
