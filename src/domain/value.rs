//! Registry value codec.
//!
//! Converts between the raw `(type, bytes)` pairs the OS stores and the typed
//! [`RegistryValue`] the rest of the crate works with. Strings are UTF-16LE on
//! disk.

use crate::domain::{CasementError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const REG_NONE: u32 = 0;
pub const REG_SZ: u32 = 1;
pub const REG_EXPAND_SZ: u32 = 2;
pub const REG_BINARY: u32 = 3;
pub const REG_DWORD: u32 = 4;
pub const REG_DWORD_BIG_ENDIAN: u32 = 5;
pub const REG_LINK: u32 = 6;
pub const REG_MULTI_SZ: u32 = 7;
pub const REG_RESOURCE_LIST: u32 = 8;
pub const REG_QWORD: u32 = 11;

/// A value exactly as the OS hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawValue {
    pub raw_type: u32,
    pub bytes: Vec<u8>,
}

impl RawValue {
    pub fn new(raw_type: u32, bytes: Vec<u8>) -> Self {
        Self { raw_type, bytes }
    }
}

/// Typed registry data. The tag decides both the storage format and how the
/// value may be coerced on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryValue {
    String(String),
    /// Contains `%VAR%` tokens; only expanded through [`RegistryValue::expand`].
    ExpandString(String),
    Dword(u32),
    Qword(u64),
    MultiString(Vec<String>),
    Binary(Vec<u8>),
}

impl RegistryValue {
    pub fn raw_type(&self) -> u32 {
        match self {
            RegistryValue::String(_) => REG_SZ,
            RegistryValue::ExpandString(_) => REG_EXPAND_SZ,
            RegistryValue::Dword(_) => REG_DWORD,
            RegistryValue::Qword(_) => REG_QWORD,
            RegistryValue::MultiString(_) => REG_MULTI_SZ,
            RegistryValue::Binary(_) => REG_BINARY,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RegistryValue::String(_) => "REG_SZ",
            RegistryValue::ExpandString(_) => "REG_EXPAND_SZ",
            RegistryValue::Dword(_) => "REG_DWORD",
            RegistryValue::Qword(_) => "REG_QWORD",
            RegistryValue::MultiString(_) => "REG_MULTI_SZ",
            RegistryValue::Binary(_) => "REG_BINARY",
        }
    }

    /// Text of a `String` or `ExpandString`, unexpanded.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RegistryValue::String(s) | RegistryValue::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            RegistryValue::Dword(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RegistryValue::Dword(v) => Some(u64::from(*v)),
            RegistryValue::Qword(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            RegistryValue::MultiString(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_expandable(&self) -> bool {
        matches!(self, RegistryValue::ExpandString(_))
    }

    /// Expand `%VAR%` tokens against the process environment.
    ///
    /// Only `ExpandString` changes (into a `String`); every other tag is
    /// returned as is.
    pub fn expand(&self) -> RegistryValue {
        self.expand_with(|name| std::env::var(name).ok())
    }

    pub fn expand_with<F>(&self, lookup: F) -> RegistryValue
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            RegistryValue::ExpandString(s) => RegistryValue::String(expand_vars(s, lookup)),
            other => other.clone(),
        }
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryValue::String(s) | RegistryValue::ExpandString(s) => f.write_str(s),
            RegistryValue::Dword(v) => write!(f, "{}", v),
            RegistryValue::Qword(v) => write!(f, "{}", v),
            RegistryValue::MultiString(items) => f.write_str(&items.join("\n")),
            RegistryValue::Binary(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for RegistryValue {
    fn from(s: &str) -> Self {
        RegistryValue::String(s.to_owned())
    }
}

impl From<String> for RegistryValue {
    fn from(s: String) -> Self {
        RegistryValue::String(s)
    }
}

impl From<u32> for RegistryValue {
    fn from(v: u32) -> Self {
        RegistryValue::Dword(v)
    }
}

impl From<u64> for RegistryValue {
    fn from(v: u64) -> Self {
        RegistryValue::Qword(v)
    }
}

impl From<Vec<String>> for RegistryValue {
    fn from(items: Vec<String>) -> Self {
        RegistryValue::MultiString(items)
    }
}

// =============================================================================
// Codec
// =============================================================================

pub fn decode(raw_type: u32, bytes: &[u8]) -> Result<RegistryValue> {
    match raw_type {
        REG_SZ => Ok(RegistryValue::String(decode_utf16(raw_type, bytes)?)),
        REG_EXPAND_SZ => Ok(RegistryValue::ExpandString(decode_utf16(raw_type, bytes)?)),
        REG_DWORD => {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| malformed(raw_type, bytes, 4))?;
            Ok(RegistryValue::Dword(u32::from_le_bytes(arr)))
        }
        REG_QWORD => {
            let arr: [u8; 8] = bytes.try_into().map_err(|_| malformed(raw_type, bytes, 8))?;
            Ok(RegistryValue::Qword(u64::from_le_bytes(arr)))
        }
        REG_MULTI_SZ => {
            let text = decode_utf16(raw_type, bytes)?;
            if text.is_empty() {
                return Ok(RegistryValue::MultiString(Vec::new()));
            }
            Ok(RegistryValue::MultiString(
                text.split('\0').map(str::to_owned).collect(),
            ))
        }
        REG_BINARY => Ok(RegistryValue::Binary(bytes.to_vec())),
        other => Err(CasementError::UnsupportedValueType(other)),
    }
}

pub fn decode_raw(raw: &RawValue) -> Result<RegistryValue> {
    decode(raw.raw_type, &raw.bytes)
}

pub fn encode(value: &RegistryValue) -> RawValue {
    let bytes = match value {
        RegistryValue::String(s) | RegistryValue::ExpandString(s) => encode_utf16(s, 1),
        RegistryValue::Dword(v) => v.to_le_bytes().to_vec(),
        RegistryValue::Qword(v) => v.to_le_bytes().to_vec(),
        RegistryValue::MultiString(items) if items.is_empty() => encode_utf16("", 1),
        RegistryValue::MultiString(items) => encode_utf16(&items.join("\0"), 2),
        RegistryValue::Binary(bytes) => bytes.clone(),
    };
    RawValue::new(value.raw_type(), bytes)
}

/// Substitute `%NAME%` tokens. Unknown names stay in place untouched, like
/// the shell does.
pub fn expand_vars<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            Some(_) => {
                // "%%" is not a token
                out.push_str("%%");
                rest = &after[1..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_utf16(raw_type: u32, bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(CasementError::MalformedValue {
            raw_type,
            reason: format!("odd byte length {} for UTF-16 data", bytes.len()),
        });
    }
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|e| CasementError::MalformedValue {
        raw_type,
        reason: e.to_string(),
    })
}

fn encode_utf16(s: &str, terminators: usize) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::repeat(0).take(terminators))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn malformed(raw_type: u32, bytes: &[u8], expected: usize) -> CasementError {
    CasementError::MalformedValue {
        raw_type,
        reason: format!("expected {} bytes, found {}", expected, bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn test_decode_string_strips_terminator() {
        let value = decode(REG_SZ, &utf16("File Folder\0")).unwrap();
        assert_eq!(value, RegistryValue::String("File Folder".into()));
    }

    #[test]
    fn test_decode_multi_string_keeps_order() {
        let value = decode(REG_MULTI_SZ, &utf16("b\0a\0c\0\0")).unwrap();
        assert_eq!(
            value,
            RegistryValue::MultiString(vec!["b".into(), "a".into(), "c".into()])
        );
        assert_eq!(
            decode(REG_MULTI_SZ, &utf16("\0")).unwrap(),
            RegistryValue::MultiString(vec![])
        );
    }

    #[test]
    fn test_encode_multi_string_layout() {
        let raw = encode(&RegistryValue::MultiString(vec![
            r"C:\bin".into(),
            r"D:\tools".into(),
        ]));
        assert_eq!(raw.raw_type, REG_MULTI_SZ);
        assert_eq!(raw.bytes, utf16("C:\\bin\0D:\\tools\0\0"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            decode(REG_DWORD, &[0xd2, 0x01, 0x00, 0x00]).unwrap(),
            RegistryValue::Dword(0x1d2)
        );
        assert_eq!(encode(&RegistryValue::Qword(7)).bytes, 7u64.to_le_bytes());
        assert!(matches!(
            decode(REG_DWORD, &[1, 2]),
            Err(CasementError::MalformedValue { raw_type: REG_DWORD, .. })
        ));
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(
            decode(REG_LINK, &[]),
            Err(CasementError::UnsupportedValueType(REG_LINK))
        );
        assert_eq!(
            decode(REG_RESOURCE_LIST, &[0; 4]),
            Err(CasementError::UnsupportedValueType(REG_RESOURCE_LIST))
        );
    }

    #[test]
    fn test_binary_passthrough() {
        let raw = encode(&RegistryValue::Binary(vec![0xd2, 0x01, 0, 0]));
        assert_eq!(raw.raw_type, REG_BINARY);
        assert_eq!(decode_raw(&raw).unwrap().to_string(), "d2 01 00 00");
    }

    #[test]
    fn test_expand_vars() {
        let lookup = |name: &str| match name {
            "HOME" => Some(r"C:\Users\me".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        };
        assert_eq!(expand_vars(r"%HOME%\bin", lookup), r"C:\Users\me\bin");
        assert_eq!(expand_vars("%MISSING%/x", lookup), "%MISSING%/x");
        assert_eq!(expand_vars("a%EMPTY%b", lookup), "ab");
        assert_eq!(expand_vars("100%", lookup), "100%");
        assert_eq!(expand_vars("%%HOME%", lookup), "%%HOME%");
    }

    #[test]
    fn test_expand_only_touches_expandable() {
        let lookup = |_: &str| Some("X".to_string());
        let plain = RegistryValue::String("%A%".into());
        assert_eq!(plain.expand_with(lookup), plain);
        let expandable = RegistryValue::ExpandString("%A%".into());
        assert_eq!(expandable.expand_with(lookup), RegistryValue::String("X".into()));
    }
}
