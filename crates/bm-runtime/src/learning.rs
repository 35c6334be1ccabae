//! Learning (digest) engine.
//!
//! Each learn list buffers samples built from PHV fields until the control
//! plane drains them. A drained buffer stays outstanding until it is acked;
//! samples that are buffered or outstanding are not learned again, so a
//! control plane sees each new sample once.

use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::packet::{FieldId, Phv};

pub type LearnListId = u32;
pub type BufferId = u64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LearnError {
    #[error("Invalid learn list id {0}")]
    InvalidListId(LearnListId),

    #[error("Invalid buffer id {buffer} for learn list {list}")]
    InvalidBufferId { list: LearnListId, buffer: BufferId },

    #[error("Learn list {0} already exists")]
    DuplicateList(LearnListId),
}

/// Samples handed to the control plane by [`LearnEngine::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnBatch {
    pub list_id: LearnListId,
    pub buffer_id: BufferId,
    pub samples: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct LearnList {
    name: String,
    elements: Vec<FieldId>,
    max_samples: usize,
    buffer: Vec<Vec<u8>>,
    next_buffer_id: BufferId,
    outstanding: BTreeMap<BufferId, Vec<Vec<u8>>>,
    filter: HashSet<Vec<u8>>,
    dropped: u64,
}

/// Per-generation learning engine.
#[derive(Debug, Default)]
pub struct LearnEngine {
    lists: HashMap<LearnListId, Mutex<LearnList>>,
}

impl LearnEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a list sampling `elements`. Only called while a generation
    /// is being built.
    pub fn add_list(
        &mut self,
        list_id: LearnListId,
        name: impl Into<String>,
        elements: Vec<FieldId>,
        max_samples: usize,
    ) -> Result<(), LearnError> {
        if self.lists.contains_key(&list_id) {
            return Err(LearnError::DuplicateList(list_id));
        }
        self.lists.insert(
            list_id,
            Mutex::new(LearnList {
                name: name.into(),
                elements,
                max_samples,
                buffer: Vec::new(),
                next_buffer_id: 0,
                outstanding: BTreeMap::new(),
                filter: HashSet::new(),
                dropped: 0,
            }),
        );
        Ok(())
    }

    pub fn list_ids(&self) -> Vec<LearnListId> {
        let mut ids: Vec<_> = self.lists.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn list_name(&self, list_id: LearnListId) -> Option<String> {
        self.lists.get(&list_id).map(|l| l.lock().name.clone())
    }

    /// Buffers `sample`. Returns `false` if it was filtered as a duplicate or
    /// dropped because the buffer is full.
    pub fn learn(&self, list_id: LearnListId, sample: Vec<u8>) -> Result<bool, LearnError> {
        let mut list = self.list(list_id)?.lock();
        if list.filter.contains(&sample) {
            return Ok(false);
        }
        if list.buffer.len() >= list.max_samples {
            list.dropped += 1;
            warn!("Learn list {} full, dropping sample", list.name);
            return Ok(false);
        }
        list.filter.insert(sample.clone());
        list.buffer.push(sample);
        Ok(true)
    }

    /// Builds a sample from the list's fields in `phv` and learns it.
    pub fn learn_phv(&self, list_id: LearnListId, phv: &Phv) -> Result<bool, LearnError> {
        let sample = {
            let list = self.list(list_id)?.lock();
            let sample: Vec<u8> = list
                .elements
                .iter()
                .filter_map(|id| phv.field(*id))
                .flatten()
                .copied()
                .collect();
            sample
        };
        self.learn(list_id, sample)
    }

    /// Hands out every buffered sample. Returns `None` if nothing is buffered.
    pub fn drain(&self, list_id: LearnListId) -> Result<Option<LearnBatch>, LearnError> {
        let mut list = self.list(list_id)?.lock();
        if list.buffer.is_empty() {
            return Ok(None);
        }
        let buffer_id = list.next_buffer_id;
        list.next_buffer_id += 1;
        let samples = std::mem::take(&mut list.buffer);
        list.outstanding.insert(buffer_id, samples.clone());
        debug!("Learn list {}: drained {} samples as buffer {}", list.name, samples.len(), buffer_id);
        Ok(Some(LearnBatch {
            list_id,
            buffer_id,
            samples,
        }))
    }

    /// Acknowledges a drained buffer; its samples may be learned again.
    pub fn ack(&self, list_id: LearnListId, buffer_id: BufferId) -> Result<(), LearnError> {
        let mut list = self.list(list_id)?.lock();
        let samples = list
            .outstanding
            .remove(&buffer_id)
            .ok_or(LearnError::InvalidBufferId {
                list: list_id,
                buffer: buffer_id,
            })?;
        for sample in samples {
            list.filter.remove(&sample);
        }
        Ok(())
    }

    /// Number of samples dropped because the buffer was full.
    pub fn dropped(&self, list_id: LearnListId) -> Result<u64, LearnError> {
        Ok(self.list(list_id)?.lock().dropped)
    }

    fn list(&self, list_id: LearnListId) -> Result<&Mutex<LearnList>, LearnError> {
        self.lists.get(&list_id).ok_or(LearnError::InvalidListId(list_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FieldLayout, HeaderLayout, PhvFactory};
    use pretty_assertions::assert_eq;

    fn engine(max_samples: usize) -> LearnEngine {
        let mut engine = LearnEngine::new();
        engine
            .add_list(1, "mac_learn", vec![FieldId { header: 0, field: 0 }], max_samples)
            .unwrap();
        engine
    }

    #[test]
    fn test_learn_drain_ack() {
        let e = engine(8);
        assert!(e.learn(1, vec![1]).unwrap());
        assert!(e.learn(1, vec![2]).unwrap());
        assert!(!e.learn(1, vec![1]).unwrap());

        let batch = e.drain(1).unwrap().unwrap();
        assert_eq!(batch.samples, vec![vec![1], vec![2]]);
        assert_eq!(e.drain(1).unwrap(), None);

        // Still outstanding, so filtered.
        assert!(!e.learn(1, vec![1]).unwrap());
        e.ack(1, batch.buffer_id).unwrap();
        assert!(e.learn(1, vec![1]).unwrap());

        assert_eq!(
            e.ack(1, batch.buffer_id).unwrap_err(),
            LearnError::InvalidBufferId {
                list: 1,
                buffer: batch.buffer_id
            }
        );
    }

    #[test]
    fn test_full_buffer_drops() {
        let e = engine(1);
        assert!(e.learn(1, vec![1]).unwrap());
        assert!(!e.learn(1, vec![2]).unwrap());
        assert_eq!(e.dropped(1).unwrap(), 1);
    }

    #[test]
    fn test_unknown_list() {
        let e = engine(1);
        assert_eq!(e.learn(9, vec![]).unwrap_err(), LearnError::InvalidListId(9));
        assert_eq!(e.list_ids(), vec![1]);
        assert_eq!(e.list_name(1).as_deref(), Some("mac_learn"));
    }

    #[test]
    fn test_duplicate_list() {
        let mut e = engine(1);
        assert_eq!(e.add_list(1, "again", vec![], 1).unwrap_err(), LearnError::DuplicateList(1));
    }

    #[test]
    fn test_learn_from_phv() {
        let factory = PhvFactory::new(
            1,
            vec![HeaderLayout {
                name: "ethernet".to_string(),
                fields: vec![FieldLayout {
                    name: "srcAddr".to_string(),
                    bitwidth: 48,
                }],
                metadata: false,
            }],
        );
        let mut phv = factory.create();
        phv.set_field(FieldId { header: 0, field: 0 }, vec![0, 0, 0, 0, 0, 7]);

        let e = engine(4);
        assert!(e.learn_phv(1, &phv).unwrap());
        let batch = e.drain(1).unwrap().unwrap();
        assert_eq!(batch.samples, vec![vec![0, 0, 0, 0, 0, 7]]);
    }
}
