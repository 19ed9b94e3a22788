//! PackStream marker bytes.
//!
//! Every PackStream value starts with a marker byte. Small collections and
//! integers pack their size or value into the low nibble of the marker; the
//! rest carry an explicit big-endian size after it.

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// High nibble of tiny string markers (0x80-0x8F)
pub const TINY_STRING: u8 = 0x80;
/// High nibble of tiny list markers (0x90-0x9F)
pub const TINY_LIST: u8 = 0x90;
/// High nibble of tiny map markers (0xA0-0xAF)
pub const TINY_MAP: u8 = 0xA0;
/// High nibble of tiny struct markers (0xB0-0xBF)
pub const TINY_STRUCT: u8 = 0xB0;

/// Largest size that fits in a tiny marker's low nibble.
pub const TINY_MAX: usize = 0x0F;

/// Smallest value encodable as a tiny int.
pub const TINY_INT_MIN: i64 = -16;
/// Largest value encodable as a tiny int.
pub const TINY_INT_MAX: i64 = 127;

/// What a marker byte announces, with the inline size when it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerClass {
    /// Integer packed into the marker itself
    TinyInt(i8),
    /// String whose byte length is in the low nibble
    TinyString(usize),
    /// List whose element count is in the low nibble
    TinyList(usize),
    /// Map whose entry count is in the low nibble
    TinyMap(usize),
    /// Structure whose field count is in the low nibble
    TinyStruct(usize),
    /// Any marker followed by a payload or explicit size
    Sized(u8),
    /// Reserved byte with no meaning in PackStream
    Reserved(u8),
}

/// Classify a marker byte.
#[inline]
pub fn classify(marker: u8) -> MarkerClass {
    match marker {
        0x00..=0x7F | 0xF0..=0xFF => MarkerClass::TinyInt(marker as i8),
        0x80..=0x8F => MarkerClass::TinyString(low_nibble(marker)),
        0x90..=0x9F => MarkerClass::TinyList(low_nibble(marker)),
        0xA0..=0xAF => MarkerClass::TinyMap(low_nibble(marker)),
        0xB0..=0xBF => MarkerClass::TinyStruct(low_nibble(marker)),
        NULL | FLOAT_64 | FALSE | TRUE
        | INT_8..=INT_64
        | BYTES_8..=BYTES_32
        | STRING_8..=STRING_32
        | LIST_8..=LIST_32
        | MAP_8..=MAP_32
        | STRUCT_8
        | STRUCT_16 => MarkerClass::Sized(marker),
        _ => MarkerClass::Reserved(marker),
    }
}

#[inline]
fn low_nibble(marker: u8) -> usize {
    (marker & 0x0F) as usize
}

/// Whether `value` fits in a single tiny int marker.
#[inline]
pub fn fits_tiny_int(value: i64) -> bool {
    (TINY_INT_MIN..=TINY_INT_MAX).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_tiny_ints() {
        assert_eq!(classify(0x00), MarkerClass::TinyInt(0));
        assert_eq!(classify(0x7F), MarkerClass::TinyInt(127));
        assert_eq!(classify(0xF0), MarkerClass::TinyInt(-16));
        assert_eq!(classify(0xFF), MarkerClass::TinyInt(-1));
    }

    #[test]
    fn test_classify_tiny_collections() {
        assert_eq!(classify(0x85), MarkerClass::TinyString(5));
        assert_eq!(classify(0x90), MarkerClass::TinyList(0));
        assert_eq!(classify(0xAF), MarkerClass::TinyMap(15));
        assert_eq!(classify(0xB3), MarkerClass::TinyStruct(3));
    }

    #[test]
    fn test_classify_sized_and_reserved() {
        assert_eq!(classify(NULL), MarkerClass::Sized(NULL));
        assert_eq!(classify(STRUCT_16), MarkerClass::Sized(STRUCT_16));
        assert_eq!(classify(0xC4), MarkerClass::Reserved(0xC4));
        assert_eq!(classify(0xDE), MarkerClass::Reserved(0xDE));
        assert_eq!(classify(0xE7), MarkerClass::Reserved(0xE7));
    }

    #[test]
    fn test_fits_tiny_int() {
        assert!(fits_tiny_int(-16));
        assert!(fits_tiny_int(127));
        assert!(!fits_tiny_int(128));
        assert!(!fits_tiny_int(-17));
    }
}
