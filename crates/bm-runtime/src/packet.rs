//! Packets and the packet header vector (PHV).
//!
//! A [`PhvFactory`] describes the header layout of one configuration
//! generation and builds empty [`Phv`]s for it. The controller owns a
//! [`PhvSource`] slot holding the factory of the active generation; every
//! [`Packet`] is built from whatever factory that slot holds at the time, and
//! the slot is switched at cutover together with the active generation.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("No program installed")]
    NoProgram,

    #[error("Packet truncated in header {header}: need {needed} bytes, {available} left")]
    Truncated {
        header: String,
        needed: usize,
        available: usize,
    },

    #[error("Parser {parser} exceeded {limit} state transitions")]
    ParserLoop { parser: String, limit: usize },

    #[error("Unknown {kind} '{name}'")]
    UnknownObject { kind: &'static str, name: String },

    #[error("Packet laid out for generation {packet}, program is generation {program}")]
    GenerationMismatch { packet: u64, program: u64 },
}

/// One field of a header type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub bitwidth: u32,
}

impl FieldLayout {
    /// Bytes needed to hold the field value, right-aligned.
    pub fn width_bytes(&self) -> usize {
        (self.bitwidth as usize + 7) / 8
    }
}

/// Layout of one header instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    pub metadata: bool,
}

impl HeaderLayout {
    pub fn bit_len(&self) -> usize {
        self.fields.iter().map(|f| f.bitwidth as usize).sum()
    }

    pub fn byte_len(&self) -> usize {
        (self.bit_len() + 7) / 8
    }
}

/// Position of a field in a [`Phv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId {
    pub header: usize,
    pub field: usize,
}

/// Builds PHVs for one configuration generation.
#[derive(Debug)]
pub struct PhvFactory {
    generation: u64,
    headers: Vec<HeaderLayout>,
    index: HashMap<String, usize>,
}

impl PhvFactory {
    pub fn new(generation: u64, headers: Vec<HeaderLayout>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.name.clone(), i))
            .collect();
        Self {
            generation,
            headers,
            index,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn headers(&self) -> &[HeaderLayout] {
        &self.headers
    }

    pub fn header_id(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn header(&self, id: usize) -> Option<&HeaderLayout> {
        self.headers.get(id)
    }

    pub fn field_id(&self, header: &str, field: &str) -> Option<FieldId> {
        let h = self.header_id(header)?;
        let f = self.headers[h].fields.iter().position(|f| f.name == field)?;
        Some(FieldId { header: h, field: f })
    }

    pub fn field_width_bytes(&self, id: FieldId) -> Option<usize> {
        self.headers
            .get(id.header)?
            .fields
            .get(id.field)
            .map(FieldLayout::width_bytes)
    }

    /// Creates a PHV with every field zeroed. Metadata headers start valid,
    /// packet headers start invalid.
    pub fn create(&self) -> Phv {
        let headers = self
            .headers
            .iter()
            .map(|layout| HeaderInstance {
                valid: layout.metadata,
                fields: layout.fields.iter().map(|f| vec![0; f.width_bytes()]).collect(),
            })
            .collect();
        Phv {
            generation: self.generation,
            headers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInstance {
    pub valid: bool,
    pub fields: Vec<Vec<u8>>,
}

/// Parsed header state of one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phv {
    generation: u64,
    headers: Vec<HeaderInstance>,
}

impl Phv {
    /// Generation whose layout this PHV follows.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn header(&self, id: usize) -> Option<&HeaderInstance> {
        self.headers.get(id)
    }

    pub fn header_mut(&mut self, id: usize) -> Option<&mut HeaderInstance> {
        self.headers.get_mut(id)
    }

    pub fn is_valid(&self, header: usize) -> bool {
        self.headers.get(header).is_some_and(|h| h.valid)
    }

    pub fn field(&self, id: FieldId) -> Option<&[u8]> {
        self.headers
            .get(id.header)?
            .fields
            .get(id.field)
            .map(|v| v.as_slice())
    }

    /// Overwrites a field value. Returns false if `id` is out of range or
    /// `value` is not exactly as wide as the field.
    pub fn set_field(&mut self, id: FieldId, value: Vec<u8>) -> bool {
        match self
            .headers
            .get_mut(id.header)
            .and_then(|h| h.fields.get_mut(id.field))
        {
            Some(slot) if slot.len() == value.len() => {
                *slot = value;
                true
            }
            _ => false,
        }
    }
}

/// Controller-owned slot holding the PHV factory new packets are built from.
#[derive(Debug, Default)]
pub struct PhvSource {
    slot: RwLock<Option<Arc<PhvFactory>>>,
}

impl PhvSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `factory`, returning the previous one.
    pub fn install(&self, factory: Arc<PhvFactory>) -> Option<Arc<PhvFactory>> {
        self.slot.write().replace(factory)
    }

    pub fn current(&self) -> Option<Arc<PhvFactory>> {
        self.slot.read().clone()
    }

    pub fn create(&self) -> Result<Phv, PacketError> {
        self.slot
            .read()
            .as_ref()
            .map(|f| f.create())
            .ok_or(PacketError::NoProgram)
    }
}

/// An action applied to a packet while walking a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedAction {
    pub table: String,
    pub action: String,
    pub hit: bool,
}

/// A packet in flight through the data plane.
#[derive(Debug, Clone)]
pub struct Packet {
    id: u64,
    ingress_port: u32,
    data: Vec<u8>,
    /// Offset of the first byte not consumed by the parser
    payload_offset: usize,
    phv: Phv,
    trace: Vec<AppliedAction>,
}

impl Packet {
    /// Builds a packet around `data` with a fresh PHV from `source`.
    pub fn new(source: &PhvSource, id: u64, ingress_port: u32, data: Vec<u8>) -> Result<Self, PacketError> {
        Ok(Self {
            id,
            ingress_port,
            data,
            payload_offset: 0,
            phv: source.create()?,
            trace: Vec::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ingress_port(&self) -> u32 {
        self.ingress_port
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    pub(crate) fn set_payload_offset(&mut self, offset: usize) {
        self.payload_offset = offset;
    }

    pub fn phv(&self) -> &Phv {
        &self.phv
    }

    pub fn phv_mut(&mut self) -> &mut Phv {
        &mut self.phv
    }

    pub fn trace(&self) -> &[AppliedAction] {
        &self.trace
    }

    pub(crate) fn record(&mut self, applied: AppliedAction) {
        self.trace.push(applied);
    }
}

/// Reads `width` bits starting at bit `offset` of `src`, right-aligned into
/// `(width + 7) / 8` bytes.
pub(crate) fn extract_bits(src: &[u8], offset: usize, width: usize) -> Vec<u8> {
    let nbytes = (width + 7) / 8;
    let pad = nbytes * 8 - width;
    let mut out = vec![0u8; nbytes];
    for i in 0..width {
        let pos = offset + i;
        let bit = (src[pos / 8] >> (7 - pos % 8)) & 1;
        let out_pos = pad + i;
        out[out_pos / 8] |= bit << (7 - out_pos % 8);
    }
    out
}

/// Inverse of [`extract_bits`]: writes the low `width` bits of `value` at bit
/// `offset` of `dst`. `value` is right-aligned; missing high bits are zero.
pub(crate) fn deposit_bits(dst: &mut [u8], offset: usize, width: usize, value: &[u8]) {
    let value_bits = value.len() * 8;
    for i in 0..width {
        // Bit i counted from the low end of the field.
        let low = width - 1 - i;
        let bit = if low < value_bits {
            let in_pos = value_bits - 1 - low;
            (value[in_pos / 8] >> (7 - in_pos % 8)) & 1
        } else {
            0
        };
        let pos = offset + i;
        let mask = 1u8 << (7 - pos % 8);
        if bit == 1 {
            dst[pos / 8] |= mask;
        } else {
            dst[pos / 8] &= !mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layouts() -> Vec<HeaderLayout> {
        vec![
            HeaderLayout {
                name: "ethernet".to_string(),
                fields: vec![
                    FieldLayout {
                        name: "dstAddr".to_string(),
                        bitwidth: 48,
                    },
                    FieldLayout {
                        name: "etherType".to_string(),
                        bitwidth: 16,
                    },
                ],
                metadata: false,
            },
            HeaderLayout {
                name: "standard_metadata".to_string(),
                fields: vec![FieldLayout {
                    name: "egress_spec".to_string(),
                    bitwidth: 9,
                }],
                metadata: true,
            },
        ]
    }

    #[test]
    fn test_factory_creates_zeroed_phv() {
        let factory = PhvFactory::new(3, layouts());
        let phv = factory.create();

        assert_eq!(phv.generation(), 3);
        assert!(!phv.is_valid(0));
        assert!(phv.is_valid(1));
        let egress = factory.field_id("standard_metadata", "egress_spec").unwrap();
        assert_eq!(phv.field(egress), Some(&[0u8, 0][..]));
        assert_eq!(factory.field_width_bytes(egress), Some(2));
        assert!(factory.field_id("ethernet", "srcAddr").is_none());
    }

    #[test]
    fn test_phv_source_swaps_factory() {
        let source = PhvSource::new();
        assert_eq!(
            Packet::new(&source, 0, 1, vec![]).unwrap_err(),
            PacketError::NoProgram
        );

        assert!(source.install(Arc::new(PhvFactory::new(1, layouts()))).is_none());
        let old = source.install(Arc::new(PhvFactory::new(2, layouts()))).unwrap();
        assert_eq!(old.generation(), 1);

        let pkt = Packet::new(&source, 7, 1, vec![1, 2, 3]).unwrap();
        assert_eq!(pkt.phv().generation(), 2);
        assert_eq!(pkt.len(), 3);
    }

    #[test]
    fn test_bit_extract_and_deposit() {
        // 9-bit field starting at bit 3: 0b1_0000_0011
        let src = [0b0001_0000, 0b0011_0000];
        assert_eq!(extract_bits(&src, 3, 9), vec![0x01, 0x03]);

        let mut dst = [0u8; 2];
        deposit_bits(&mut dst, 3, 9, &[0x01, 0x03]);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_set_field() {
        let factory = PhvFactory::new(1, layouts());
        let mut phv = factory.create();
        let et = factory.field_id("ethernet", "etherType").unwrap();
        assert!(phv.set_field(et, vec![0x08, 0x00]));
        assert_eq!(phv.field(et), Some(&[0x08u8, 0x00][..]));
        assert!(!phv.set_field(FieldId { header: 9, field: 0 }, vec![]));

        assert!(!phv.set_field(et, vec![0x08]));
        assert!(!phv.set_field(et, vec![0x00, 0x08, 0x00]));
        assert_eq!(phv.field(et), Some(&[0x08u8, 0x00][..]));
    }

    #[test]
    fn test_deposit_short_and_long_values() {
        let mut dst = [0xffu8; 2];
        deposit_bits(&mut dst, 0, 16, &[0x06]);
        assert_eq!(dst, [0x00, 0x06]);

        // Only the low 9 bits of a wider value land in the field.
        let mut dst = [0u8; 2];
        deposit_bits(&mut dst, 3, 9, &[0xff, 0x01, 0x03]);
        assert_eq!(dst, [0b0001_0000, 0b0011_0000]);

        let mut dst = [0xffu8; 1];
        deposit_bits(&mut dst, 0, 8, &[]);
        assert_eq!(dst, [0x00]);
    }
}
