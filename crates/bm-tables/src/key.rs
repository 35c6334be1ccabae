//! Match key schema and match key parameters.
//!
//! A table declares an ordered key schema ([`KeySchema`]); every control
//! request supplies one [`MatchKeyParam`] per schema field. The data plane
//! looks entries up with a packed byte key: the concatenation of every field
//! value in schema order, each exactly `width_bytes` long.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MatchError, MatchResult};

/// How a key field is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Lpm,
    Ternary,
    Range,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchKind::Exact => "exact",
            MatchKind::Lpm => "lpm",
            MatchKind::Ternary => "ternary",
            MatchKind::Range => "range",
        };
        write!(f, "{}", s)
    }
}

/// One field of a table's key schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchKeyField {
    pub name: String,
    pub kind: MatchKind,
    pub width_bytes: usize,
}

impl MatchKeyField {
    pub fn new(name: impl Into<String>, kind: MatchKind, width_bytes: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            width_bytes,
        }
    }
}

/// Caller-supplied value for one key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKeyParam {
    Exact(Vec<u8>),
    Lpm { key: Vec<u8>, prefix_length: u32 },
    Ternary { key: Vec<u8>, mask: Vec<u8> },
    Range { start: Vec<u8>, end: Vec<u8> },
}

impl MatchKeyParam {
    pub fn exact(key: impl Into<Vec<u8>>) -> Self {
        MatchKeyParam::Exact(key.into())
    }

    pub fn lpm(key: impl Into<Vec<u8>>, prefix_length: u32) -> Self {
        MatchKeyParam::Lpm {
            key: key.into(),
            prefix_length,
        }
    }

    pub fn ternary(key: impl Into<Vec<u8>>, mask: impl Into<Vec<u8>>) -> Self {
        MatchKeyParam::Ternary {
            key: key.into(),
            mask: mask.into(),
        }
    }

    pub fn range(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        MatchKeyParam::Range {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Returns the match kind this parameter is valid for.
    pub fn kind(&self) -> MatchKind {
        match self {
            MatchKeyParam::Exact(_) => MatchKind::Exact,
            MatchKeyParam::Lpm { .. } => MatchKind::Lpm,
            MatchKeyParam::Ternary { .. } => MatchKind::Ternary,
            MatchKeyParam::Range { .. } => MatchKind::Range,
        }
    }
}

/// Ordered key schema of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    fields: Vec<MatchKeyField>,
    key_width: usize,
}

impl KeySchema {
    pub fn new(fields: Vec<MatchKeyField>) -> Self {
        let key_width = fields.iter().map(|f| f.width_bytes).sum();
        Self { fields, key_width }
    }

    pub fn fields(&self) -> &[MatchKeyField] {
        &self.fields
    }

    /// Returns the length of a packed lookup key.
    pub fn key_width(&self) -> usize {
        self.key_width
    }

    /// Returns true if every field is matched exactly.
    pub fn is_exact_only(&self) -> bool {
        self.fields.iter().all(|f| f.kind == MatchKind::Exact)
    }

    /// Returns true if entries need a priority to break ties.
    pub fn needs_priority(&self) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f.kind, MatchKind::Ternary | MatchKind::Range))
    }

    /// Validates `params` against the schema and normalizes them for storage.
    pub(crate) fn compile(&self, params: &[MatchKeyParam]) -> MatchResult<CompiledKey> {
        if params.len() != self.fields.len() {
            return Err(MatchError::bad_key(format!(
                "expected {} key fields, got {}",
                self.fields.len(),
                params.len()
            )));
        }

        let mut fields = Vec::with_capacity(params.len());
        let mut prefix_length = 0;
        for (field, param) in self.fields.iter().zip(params) {
            if field.kind != param.kind() {
                return Err(MatchError::bad_key(format!(
                    "field {} is {}, got {} parameter",
                    field.name,
                    field.kind,
                    param.kind()
                )));
            }
            let compiled = match param {
                MatchKeyParam::Exact(key) => {
                    check_width(field, key)?;
                    FieldMatch::Masked {
                        value: key.clone(),
                        mask: vec![0xff; field.width_bytes],
                    }
                }
                MatchKeyParam::Lpm {
                    key,
                    prefix_length: plen,
                } => {
                    check_width(field, key)?;
                    if *plen as usize > field.width_bytes * 8 {
                        return Err(MatchError::bad_key(format!(
                            "prefix length {} too long for field {}",
                            plen, field.name
                        )));
                    }
                    prefix_length += plen;
                    let mask = prefix_mask(*plen, field.width_bytes);
                    FieldMatch::Masked {
                        value: apply_mask(key, &mask),
                        mask,
                    }
                }
                MatchKeyParam::Ternary { key, mask } => {
                    check_width(field, key)?;
                    check_width(field, mask)?;
                    FieldMatch::Masked {
                        value: apply_mask(key, mask),
                        mask: mask.clone(),
                    }
                }
                MatchKeyParam::Range { start, end } => {
                    check_width(field, start)?;
                    check_width(field, end)?;
                    // Same-width big-endian values compare lexicographically.
                    if start > end {
                        return Err(MatchError::bad_key(format!(
                            "empty range for field {}",
                            field.name
                        )));
                    }
                    FieldMatch::Range {
                        start: start.clone(),
                        end: end.clone(),
                    }
                }
            };
            fields.push(compiled);
        }

        Ok(CompiledKey {
            fields,
            prefix_length,
        })
    }
}

fn check_width(field: &MatchKeyField, bytes: &[u8]) -> MatchResult<()> {
    if bytes.len() != field.width_bytes {
        return Err(MatchError::bad_key(format!(
            "field {} expects {} bytes, got {}",
            field.name,
            field.width_bytes,
            bytes.len()
        )));
    }
    Ok(())
}

fn prefix_mask(prefix_length: u32, width_bytes: usize) -> Vec<u8> {
    let mut mask = vec![0u8; width_bytes];
    let mut remaining = prefix_length as usize;
    for byte in mask.iter_mut() {
        if remaining >= 8 {
            *byte = 0xff;
            remaining -= 8;
        } else {
            *byte = !(0xffu8 >> remaining);
            break;
        }
    }
    mask
}

fn apply_mask(value: &[u8], mask: &[u8]) -> Vec<u8> {
    value.iter().zip(mask).map(|(v, m)| v & m).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FieldMatch {
    Masked { value: Vec<u8>, mask: Vec<u8> },
    Range { start: Vec<u8>, end: Vec<u8> },
}

impl FieldMatch {
    fn matches(&self, bytes: &[u8]) -> bool {
        match self {
            FieldMatch::Masked { value, mask } => bytes
                .iter()
                .zip(mask)
                .zip(value)
                .all(|((b, m), v)| b & m == *v),
            FieldMatch::Range { start, end } => {
                start.as_slice() <= bytes && bytes <= end.as_slice()
            }
        }
    }
}

/// A validated, normalized match key as stored in a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CompiledKey {
    fields: Vec<FieldMatch>,
    prefix_length: u32,
}

impl CompiledKey {
    /// Total LPM prefix length, used to rank LPM matches.
    pub(crate) fn prefix_length(&self) -> u32 {
        self.prefix_length
    }

    /// Returns true if the packed lookup key matches.
    pub(crate) fn matches(&self, schema: &KeySchema, key: &[u8]) -> bool {
        if key.len() != schema.key_width() {
            return false;
        }
        let mut offset = 0;
        for (field, m) in schema.fields().iter().zip(&self.fields) {
            let end = offset + field.width_bytes;
            if !m.matches(&key[offset..end]) {
                return false;
            }
            offset = end;
        }
        true
    }

    /// Packed form of an exact-only key, equal to the lookup key it matches.
    pub(crate) fn exact_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for m in &self.fields {
            if let FieldMatch::Masked { value, .. } = m {
                bytes.extend_from_slice(value);
            }
        }
        bytes
    }
}
