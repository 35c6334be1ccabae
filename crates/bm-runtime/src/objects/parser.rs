//! Reference parser and deparser.
//!
//! The parser walks a state graph from its init state. Each state extracts
//! headers in order from the packet bytes, then selects the next state by
//! comparing the concatenated transition key fields against each
//! transition's value under its mask. The first match wins and a transition
//! without a value matches anything.

use crate::packet::{deposit_bits, extract_bits, FieldId, Packet, PacketError, Phv, PhvFactory};

// Upper bound on state visits for one packet.
const MAX_PARSE_STEPS: usize = 256;

#[derive(Debug, Clone)]
pub(crate) struct Transition {
    pub(crate) value: Option<Vec<u8>>,
    pub(crate) mask: Option<Vec<u8>>,
    pub(crate) next: Option<usize>,
}

impl Transition {
    fn matches(&self, key: &[u8]) -> bool {
        let Some(value) = &self.value else {
            return true;
        };
        if value.len() != key.len() {
            return false;
        }
        match &self.mask {
            Some(mask) => key
                .iter()
                .zip(value)
                .zip(mask)
                .all(|((k, v), m)| k & m == v & m),
            None => key == value.as_slice(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ParseState {
    pub(crate) name: String,
    pub(crate) extracts: Vec<usize>,
    pub(crate) key: Vec<FieldId>,
    pub(crate) transitions: Vec<Transition>,
}

#[derive(Debug, Clone)]
pub struct Parser {
    name: String,
    init_state: usize,
    states: Vec<ParseState>,
}

impl Parser {
    pub(crate) fn new(name: String, init_state: usize, states: Vec<ParseState>) -> Self {
        Self {
            name,
            init_state,
            states,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }

    /// Extracts headers from `packet` into its PHV and records where the
    /// unparsed payload starts.
    pub fn parse(&self, factory: &PhvFactory, packet: &mut Packet) -> Result<(), PacketError> {
        let mut offset = packet.payload_offset();
        let mut current = Some(self.init_state);
        let mut steps = 0;

        while let Some(idx) = current {
            steps += 1;
            if steps > MAX_PARSE_STEPS {
                return Err(PacketError::ParserLoop {
                    parser: self.name.clone(),
                    limit: MAX_PARSE_STEPS,
                });
            }
            let state = &self.states[idx];
            for &header in &state.extracts {
                offset = extract_header(factory, packet, header, offset)?;
            }
            current = select(state, packet.phv());
        }

        packet.set_payload_offset(offset);
        Ok(())
    }
}

fn extract_header(
    factory: &PhvFactory,
    packet: &mut Packet,
    header: usize,
    offset: usize,
) -> Result<usize, PacketError> {
    let layout = factory.header(header).ok_or_else(|| PacketError::UnknownObject {
        kind: "header",
        name: header.to_string(),
    })?;
    let len = layout.byte_len();
    let available = packet.len().saturating_sub(offset);
    if len > available {
        return Err(PacketError::Truncated {
            header: layout.name.clone(),
            needed: len,
            available,
        });
    }

    let bytes = &packet.data()[offset..offset + len];
    let mut bit = 0;
    let fields: Vec<Vec<u8>> = layout
        .fields
        .iter()
        .map(|f| {
            let width = f.bitwidth as usize;
            let value = extract_bits(bytes, bit, width);
            bit += width;
            value
        })
        .collect();

    if let Some(instance) = packet.phv_mut().header_mut(header) {
        instance.fields = fields;
        instance.valid = true;
    }
    Ok(offset + len)
}

fn select(state: &ParseState, phv: &Phv) -> Option<usize> {
    let key: Vec<u8> = state
        .key
        .iter()
        .filter_map(|id| phv.field(*id))
        .flatten()
        .copied()
        .collect();
    state
        .transitions
        .iter()
        .find(|t| t.matches(&key))
        .and_then(|t| t.next)
}

/// Serializes valid headers in a fixed order, followed by the unparsed
/// payload.
#[derive(Debug, Clone)]
pub struct Deparser {
    name: String,
    order: Vec<usize>,
}

impl Deparser {
    pub(crate) fn new(name: String, order: Vec<usize>) -> Self {
        Self { name, order }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deparse(&self, factory: &PhvFactory, packet: &Packet) -> Vec<u8> {
        let mut out = Vec::with_capacity(packet.len());
        for &header in &self.order {
            let (Some(layout), Some(instance)) = (factory.header(header), packet.phv().header(header)) else {
                continue;
            };
            if !instance.valid {
                continue;
            }
            let mut bytes = vec![0u8; layout.byte_len()];
            let mut bit = 0;
            for (f, value) in layout.fields.iter().zip(&instance.fields) {
                let width = f.bitwidth as usize;
                deposit_bits(&mut bytes, bit, width, value);
                bit += width;
            }
            out.extend_from_slice(&bytes);
        }
        out.extend_from_slice(&packet.data()[packet.payload_offset().min(packet.len())..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FieldLayout, HeaderLayout, PhvSource};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn field(name: &str, bitwidth: u32) -> FieldLayout {
        FieldLayout {
            name: name.to_string(),
            bitwidth,
        }
    }

    fn factory() -> Arc<PhvFactory> {
        Arc::new(PhvFactory::new(
            1,
            vec![
                HeaderLayout {
                    name: "ethernet".to_string(),
                    fields: vec![field("dstAddr", 48), field("srcAddr", 48), field("etherType", 16)],
                    metadata: false,
                },
                HeaderLayout {
                    name: "vlan".to_string(),
                    fields: vec![field("pcp", 3), field("cfi", 1), field("vid", 12), field("etherType", 16)],
                    metadata: false,
                },
            ],
        ))
    }

    // start: extract ethernet, select on etherType; 0x8100 -> vlan, else done.
    fn parser(factory: &PhvFactory) -> Parser {
        let ether_type = factory.field_id("ethernet", "etherType").unwrap();
        Parser::new(
            "parser".to_string(),
            0,
            vec![
                ParseState {
                    name: "start".to_string(),
                    extracts: vec![0],
                    key: vec![ether_type],
                    transitions: vec![
                        Transition {
                            value: Some(vec![0x81, 0x00]),
                            mask: None,
                            next: Some(1),
                        },
                        Transition {
                            value: None,
                            mask: None,
                            next: None,
                        },
                    ],
                },
                ParseState {
                    name: "parse_vlan".to_string(),
                    extracts: vec![1],
                    key: vec![],
                    transitions: vec![],
                },
            ],
        )
    }

    fn frame(ether_type: [u8; 2], tail: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 1];
        bytes.extend_from_slice(&ether_type);
        bytes.extend_from_slice(tail);
        bytes
    }

    #[test]
    fn test_parse_vlan_and_deparse() {
        let factory = factory();
        let source = PhvSource::new();
        source.install(Arc::clone(&factory));

        // vlan: pcp=5, cfi=0, vid=0x00a, etherType=0x0800, then payload
        let data = frame([0x81, 0x00], &[0xa0, 0x0a, 0x08, 0x00, 0xde, 0xad]);
        let mut pkt = Packet::new(&source, 1, 0, data.clone()).unwrap();
        parser(&factory).parse(&factory, &mut pkt).unwrap();

        assert_eq!(pkt.payload_offset(), 18);
        let vid = factory.field_id("vlan", "vid").unwrap();
        let pcp = factory.field_id("vlan", "pcp").unwrap();
        assert_eq!(pkt.phv().field(vid), Some(&[0x00u8, 0x0a][..]));
        assert_eq!(pkt.phv().field(pcp), Some(&[0x05u8][..]));

        let deparser = Deparser::new("deparser".to_string(), vec![0, 1]);
        assert_eq!(deparser.deparse(&factory, &pkt), data);
    }

    #[test]
    fn test_parse_stops_on_default() {
        let factory = factory();
        let source = PhvSource::new();
        source.install(Arc::clone(&factory));

        let mut pkt = Packet::new(&source, 1, 0, frame([0x08, 0x00], &[1, 2, 3])).unwrap();
        parser(&factory).parse(&factory, &mut pkt).unwrap();
        assert!(pkt.phv().is_valid(0));
        assert!(!pkt.phv().is_valid(1));
        assert_eq!(pkt.payload_offset(), 14);
    }

    #[test]
    fn test_truncated_packet() {
        let factory = factory();
        let source = PhvSource::new();
        source.install(Arc::clone(&factory));

        let mut pkt = Packet::new(&source, 1, 0, vec![0; 10]).unwrap();
        let err = parser(&factory).parse(&factory, &mut pkt).unwrap_err();
        assert_eq!(
            err,
            PacketError::Truncated {
                header: "ethernet".to_string(),
                needed: 14,
                available: 10
            }
        );
    }

    #[test]
    fn test_deparse_after_field_edits() {
        let factory = factory();
        let source = PhvSource::new();
        source.install(Arc::clone(&factory));

        let mut pkt = Packet::new(&source, 1, 0, frame([0x08, 0x00], &[0xaa])).unwrap();
        parser(&factory).parse(&factory, &mut pkt).unwrap();
        let ether_type = factory.field_id("ethernet", "etherType").unwrap();
        assert!(!pkt.phv_mut().set_field(ether_type, vec![0x06]));
        assert!(pkt.phv_mut().set_field(ether_type, vec![0x08, 0x06]));

        // A value narrower than its field is written right-aligned.
        let dst = factory.field_id("ethernet", "dstAddr").unwrap();
        pkt.phv_mut().header_mut(dst.header).unwrap().fields[dst.field] = vec![0x09];

        let deparser = Deparser::new("deparser".to_string(), vec![0, 1]);
        let mut expected = vec![0, 0, 0, 0, 0, 9, 0, 0, 0, 0, 0, 1, 0x08, 0x06];
        expected.push(0xaa);
        assert_eq!(deparser.deparse(&factory, &pkt), expected);
    }

    #[test]
    fn test_masked_transition() {
        let t = Transition {
            value: Some(vec![0x08, 0x00]),
            mask: Some(vec![0xff, 0x00]),
            next: Some(3),
        };
        assert!(t.matches(&[0x08, 0x06]));
        assert!(!t.matches(&[0x86, 0xdd]));
        assert!(!t.matches(&[0x08]));
    }
}
