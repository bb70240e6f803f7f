//! Identifier and index types shared by every component.

use crate::error::{Result, ShellError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Index into the process-wide system icon list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemIconIndex(pub i32);

/// Index into an image list owned by one UI surface.
///
/// Only meaningful while the list that produced it is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrivateIconIndex(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconSize {
    pub width: i32,
    pub height: i32,
}

impl Default for IconSize {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Opaque shell namespace identifier in ITEMIDLIST layout.
///
/// Each segment is a little-endian `u16` byte count (which includes the two
/// count bytes) followed by its payload; a zero count terminates the list.
/// The bytes always end with the terminator.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShellItemId {
    bytes: Vec<u8>,
}

impl ShellItemId {
    /// The empty list, which names the desktop.
    pub fn root() -> Self {
        Self { bytes: vec![0, 0] }
    }

    /// Parses an identifier produced by the shell. Anything after the
    /// terminator is ignored.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let mut offset = 0usize;
        loop {
            let header = raw.get(offset..offset + 2).ok_or_else(|| {
                ShellError::MalformedItemId(format!("missing terminator at offset {}", offset))
            })?;
            let cb = u16::from_le_bytes([header[0], header[1]]) as usize;
            if cb == 0 {
                return Ok(Self {
                    bytes: raw[..offset + 2].to_vec(),
                });
            }
            if cb < 2 || offset + cb > raw.len() {
                return Err(ShellError::MalformedItemId(format!(
                    "segment at offset {} claims {} bytes, {} available",
                    offset,
                    cb,
                    raw.len() - offset
                )));
            }
            offset += cb;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Each segment including its count prefix.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            bytes: &self.bytes,
            offset: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.bytes.len() <= 2
    }

    /// The containing item, or `None` for the desktop.
    pub fn parent(&self) -> Option<ShellItemId> {
        let last = self.segments().last()?;
        let cut = self.bytes.len() - 2 - last.len();
        let mut bytes = self.bytes[..cut].to_vec();
        bytes.extend_from_slice(&[0, 0]);
        Some(Self { bytes })
    }

    /// The final segment as a single-level (child) identifier.
    pub fn last_segment(&self) -> Option<ShellItemId> {
        let last = self.segments().last()?;
        let mut bytes = last.to_vec();
        bytes.extend_from_slice(&[0, 0]);
        Some(Self { bytes })
    }

    /// Appends the segments of `child` (cf. ILCombine).
    pub fn join(&self, child: &ShellItemId) -> ShellItemId {
        let mut bytes = self.bytes[..self.bytes.len() - 2].to_vec();
        bytes.extend_from_slice(&child.bytes);
        Self { bytes }
    }
}

impl fmt::Debug for ShellItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShellItemId[{} segments, {} bytes]", self.segments().count(), self.bytes.len())
    }
}

pub struct Segments<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.bytes.get(self.offset..self.offset + 2)?;
        let cb = u16::from_le_bytes([header[0], header[1]]) as usize;
        if cb == 0 {
            return None;
        }
        let segment = &self.bytes[self.offset..self.offset + cb];
        self.offset += cb;
        Some(segment)
    }
}

/// COM class identifier, written in registry form as
/// `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Clsid(Uuid);

impl Clsid {
    pub const fn from_u128(value: u128) -> Self {
        Clsid(Uuid::from_u128(value))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl FromStr for Clsid {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Clsid)
            .map_err(|source| ShellError::InvalidClsid {
                value: s.to_string(),
                source,
            })
    }
}

impl TryFrom<String> for Clsid {
    type Error = ShellError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Clsid> for String {
    fn from(value: Clsid) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Clsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.hyphenated().to_string().to_uppercase())
    }
}
