//! Multicast packet replication engine (PRE).
//!
//! Two-level replication: a multicast group (identified by its `mgid`) lists
//! L1 nodes, and each node carries a replication id (`rid`) and the egress
//! ports its copies go to. A node belongs to at most one group at a time.
//!
//! The PRE is owned by the controller for the lifetime of the process and is
//! not replaced by a configuration swap.

use bm_common::{HandleMap, HandleMapError};
use bm_tables::{Handle, HandleKind};
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

pub struct MgrpKind;

impl HandleKind for MgrpKind {
    fn kind_name() -> &'static str {
        "Mgrp"
    }
}

pub struct L1Kind;

impl HandleKind for L1Kind {
    fn kind_name() -> &'static str {
        "L1"
    }
}

pub type MgrpHandle = Handle<MgrpKind>;
pub type L1Handle = Handle<L1Kind>;

pub type Mgid = u16;
pub type Rid = u16;
pub type EgressPort = u32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum McError {
    #[error("Multicast group {0} already exists")]
    DuplicateMgid(Mgid),

    #[error("Invalid multicast group handle {0}")]
    InvalidMgrpHandle(MgrpHandle),

    #[error("Invalid L1 node handle {0}")]
    InvalidL1Handle(L1Handle),

    #[error("L1 node {0} is already associated with a group")]
    L1AlreadyAssociated(L1Handle),

    #[error("L1 node {node} is not associated with group {mgrp}")]
    L1NotAssociated { node: L1Handle, mgrp: MgrpHandle },

    #[error("L1 node {0} is still associated with a group")]
    L1StillAssociated(L1Handle),
}

/// One packet copy produced by [`McPre::replicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Replica {
    pub rid: Rid,
    pub egress_port: EgressPort,
}

#[derive(Debug)]
struct McGroup {
    mgid: Mgid,
    nodes: Vec<L1Handle>,
}

#[derive(Debug)]
struct L1Node {
    rid: Rid,
    ports: BTreeSet<EgressPort>,
    mgrp: Option<MgrpHandle>,
}

#[derive(Debug, Default)]
struct PreState {
    groups: HandleMap<McGroup>,
    nodes: HandleMap<L1Node>,
    by_mgid: HashMap<Mgid, MgrpHandle>,
}

#[derive(Debug, Default)]
pub struct McPre {
    state: RwLock<PreState>,
}

impl McPre {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mc_mgrp_create(&self, mgid: Mgid) -> Result<MgrpHandle, McError> {
        let mut state = self.state.write();
        if state.by_mgid.contains_key(&mgid) {
            return Err(McError::DuplicateMgid(mgid));
        }
        let mgrp = MgrpHandle::new(state.groups.insert(McGroup {
            mgid,
            nodes: Vec::new(),
        }));
        state.by_mgid.insert(mgid, mgrp);
        debug!("PRE: created group {} (mgid {})", mgrp, mgid);
        Ok(mgrp)
    }

    /// Destroys a group, dissociating its nodes first.
    pub fn mc_mgrp_destroy(&self, mgrp: MgrpHandle) -> Result<(), McError> {
        let mut state = self.state.write();
        let group = state
            .groups
            .remove(mgrp.as_raw())
            .ok_or(McError::InvalidMgrpHandle(mgrp))?;
        state.by_mgid.remove(&group.mgid);
        for node in group.nodes {
            if let Some(n) = state.nodes.get_mut(node.as_raw()) {
                n.mgrp = None;
            }
            if let Err(e) = state.nodes.decrement_ref(node.as_raw()) {
                warn!("PRE: node {} reference count out of sync: {}", node, e);
            }
        }
        debug!("PRE: destroyed group {}", mgrp);
        Ok(())
    }

    pub fn mc_node_create(&self, rid: Rid, ports: &[EgressPort]) -> L1Handle {
        let node = L1Handle::new(self.state.write().nodes.insert(L1Node {
            rid,
            ports: ports.iter().copied().collect(),
            mgrp: None,
        }));
        debug!("PRE: created node {} (rid {})", node, rid);
        node
    }

    pub fn mc_node_update(&self, node: L1Handle, ports: &[EgressPort]) -> Result<(), McError> {
        let mut state = self.state.write();
        let n = state
            .nodes
            .get_mut(node.as_raw())
            .ok_or(McError::InvalidL1Handle(node))?;
        n.ports = ports.iter().copied().collect();
        Ok(())
    }

    pub fn mc_node_destroy(&self, node: L1Handle) -> Result<(), McError> {
        self.state
            .write()
            .nodes
            .remove_unreferenced(node.as_raw())
            .map_err(|e| match e {
                HandleMapError::StillReferenced { .. } => McError::L1StillAssociated(node),
                _ => McError::InvalidL1Handle(node),
            })?;
        Ok(())
    }

    pub fn mc_node_associate(&self, mgrp: MgrpHandle, node: L1Handle) -> Result<(), McError> {
        let mut state = self.state.write();
        if !state.groups.contains(mgrp.as_raw()) {
            return Err(McError::InvalidMgrpHandle(mgrp));
        }
        let n = state
            .nodes
            .get_mut(node.as_raw())
            .ok_or(McError::InvalidL1Handle(node))?;
        if n.mgrp.is_some() {
            return Err(McError::L1AlreadyAssociated(node));
        }
        n.mgrp = Some(mgrp);
        state
            .nodes
            .increment_ref(node.as_raw())
            .map_err(|_| McError::InvalidL1Handle(node))?;
        if let Some(g) = state.groups.get_mut(mgrp.as_raw()) {
            g.nodes.push(node);
        }
        Ok(())
    }

    pub fn mc_node_dissociate(&self, mgrp: MgrpHandle, node: L1Handle) -> Result<(), McError> {
        let mut state = self.state.write();
        let group = state
            .groups
            .get_mut(mgrp.as_raw())
            .ok_or(McError::InvalidMgrpHandle(mgrp))?;
        let pos = group
            .nodes
            .iter()
            .position(|n| *n == node)
            .ok_or(McError::L1NotAssociated { node, mgrp })?;
        group.nodes.remove(pos);
        if let Some(n) = state.nodes.get_mut(node.as_raw()) {
            n.mgrp = None;
        }
        state
            .nodes
            .decrement_ref(node.as_raw())
            .map_err(|_| McError::InvalidL1Handle(node))?;
        Ok(())
    }

    /// Copies to emit for a packet sent to `mgid`, in node order. An unknown
    /// `mgid` replicates to nothing.
    pub fn replicate(&self, mgid: Mgid) -> Vec<Replica> {
        let state = self.state.read();
        let Some(group) = state
            .by_mgid
            .get(&mgid)
            .and_then(|h| state.groups.get(h.as_raw()))
        else {
            return Vec::new();
        };
        group
            .nodes
            .iter()
            .filter_map(|h| state.nodes.get(h.as_raw()))
            .flat_map(|n| {
                n.ports.iter().map(move |&egress_port| Replica {
                    rid: n.rid,
                    egress_port,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_replicate() {
        let pre = McPre::new();
        let g = pre.mc_mgrp_create(1).unwrap();
        let n1 = pre.mc_node_create(10, &[2, 1]);
        let n2 = pre.mc_node_create(20, &[3]);
        pre.mc_node_associate(g, n1).unwrap();
        pre.mc_node_associate(g, n2).unwrap();

        assert_eq!(
            pre.replicate(1),
            vec![
                Replica { rid: 10, egress_port: 1 },
                Replica { rid: 10, egress_port: 2 },
                Replica { rid: 20, egress_port: 3 },
            ]
        );
        assert!(pre.replicate(2).is_empty());
    }

    #[test]
    fn test_node_lifecycle() {
        let pre = McPre::new();
        let g = pre.mc_mgrp_create(1).unwrap();
        let n = pre.mc_node_create(1, &[1]);

        pre.mc_node_associate(g, n).unwrap();
        assert_eq!(pre.mc_node_associate(g, n).unwrap_err(), McError::L1AlreadyAssociated(n));
        assert_eq!(pre.mc_node_destroy(n).unwrap_err(), McError::L1StillAssociated(n));

        pre.mc_node_update(n, &[4, 5]).unwrap();
        assert_eq!(pre.replicate(1).len(), 2);

        pre.mc_node_dissociate(g, n).unwrap();
        assert_eq!(
            pre.mc_node_dissociate(g, n).unwrap_err(),
            McError::L1NotAssociated { node: n, mgrp: g }
        );
        pre.mc_node_destroy(n).unwrap();
        assert_eq!(pre.mc_node_update(n, &[1]).unwrap_err(), McError::InvalidL1Handle(n));
    }

    #[test]
    fn test_destroy_group_releases_nodes() {
        let pre = McPre::new();
        let g = pre.mc_mgrp_create(7).unwrap();
        assert_eq!(pre.mc_mgrp_create(7).unwrap_err(), McError::DuplicateMgid(7));
        let n = pre.mc_node_create(1, &[1]);
        pre.mc_node_associate(g, n).unwrap();

        pre.mc_mgrp_destroy(g).unwrap();
        assert_eq!(pre.mc_mgrp_destroy(g).unwrap_err(), McError::InvalidMgrpHandle(g));
        pre.mc_node_destroy(n).unwrap();
        assert!(pre.mc_mgrp_create(7).is_ok());
    }
}
