//! Data-plane driver.
//!
//! The driver owns the only call site of [`Switch::do_swap`]. Each scheduling
//! quantum it first runs the cutover safe point, then drains up to
//! `batch_size` packets from its queue. Every packet is processed against one
//! snapshot of the active generation, so a cutover never splits a packet
//! across two programs.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::objects::ConfigGeneration;
use crate::packet::{AppliedAction, Packet, PacketError};
use crate::switch::Switch;

/// Driver tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Length of one scheduling quantum in milliseconds
    pub quantum_ms: u64,
    /// Packets processed per quantum at most
    pub batch_size: usize,
    /// Capacity of the ingress queue
    pub queue_depth: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            quantum_ms: 10,
            batch_size: 64,
            queue_depth: 1024,
        }
    }
}

/// A packet as received on an ingress port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub ingress_port: u32,
    pub data: Vec<u8>,
}

/// A packet after the processor ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPacket {
    pub id: u64,
    pub ingress_port: u32,
    /// Generation the packet was processed with
    pub generation: u64,
    /// Generation whose PHV layout the packet was built with
    pub layout_generation: u64,
    pub data: Vec<u8>,
    pub trace: Vec<AppliedAction>,
}

/// Runs one packet through a generation's program and returns the egress
/// bytes.
pub trait PacketProcessor: Send + Sync {
    fn process(&self, generation: &ConfigGeneration, packet: &mut Packet) -> Result<Vec<u8>, PacketError>;
}

/// Reference processor: parse, look up each table of one pipeline following
/// its control flow, deparse. Packets whose PHV was built for another
/// generation are refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWalker {
    pub parser: String,
    pub pipeline: String,
    pub deparser: String,
}

impl Default for TableWalker {
    fn default() -> Self {
        Self {
            parser: "parser".to_string(),
            pipeline: "ingress".to_string(),
            deparser: "deparser".to_string(),
        }
    }
}

fn unknown(kind: &'static str, name: &str) -> PacketError {
    PacketError::UnknownObject {
        kind,
        name: name.to_string(),
    }
}

impl PacketProcessor for TableWalker {
    fn process(&self, generation: &ConfigGeneration, packet: &mut Packet) -> Result<Vec<u8>, PacketError> {
        let factory = generation.phv_factory();
        if packet.phv().generation() != factory.generation() {
            return Err(PacketError::GenerationMismatch {
                packet: packet.phv().generation(),
                program: factory.generation(),
            });
        }
        let parser = generation
            .get_parser(&self.parser)
            .ok_or_else(|| unknown("parser", &self.parser))?;
        parser.parse(factory, packet)?;

        let pipeline = generation
            .get_pipeline(&self.pipeline)
            .ok_or_else(|| unknown("pipeline", &self.pipeline))?;
        let mut next = pipeline.init_table().map(str::to_string);
        // Control flow in a valid program is acyclic.
        let mut remaining = pipeline.num_tables();
        while let Some(name) = next.take() {
            if remaining == 0 {
                warn!("Pipeline '{}' revisits table '{}', stopping", pipeline.name(), name);
                break;
            }
            remaining -= 1;

            let flow = pipeline.table(&name).ok_or_else(|| unknown("table", &name))?;
            let table = generation.get_table(&name).ok_or_else(|| unknown("table", &name))?;
            let key = flow.build_key(packet.phv());
            let result = table.lookup(&key, packet.len());
            let action = result.action().map(|a| a.action.name().to_string());

            next = flow.next_table(action.as_deref()).map(str::to_string);
            packet.record(AppliedAction {
                table: name,
                action: action.unwrap_or_default(),
                hit: result.is_hit(),
            });
        }

        let deparser = generation
            .get_deparser(&self.deparser)
            .ok_or_else(|| unknown("deparser", &self.deparser))?;
        Ok(deparser.deparse(factory, packet))
    }
}

/// Counters maintained by a running driver.
#[derive(Debug, Default)]
pub struct DriverStats {
    processed: AtomicU64,
    dropped: AtomicU64,
    swaps: AtomicU64,
}

impl DriverStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Packets dropped because no program was installed or processing
    /// failed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Cutovers performed.
    pub fn swaps(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }
}

pub struct DataPlaneDriver {
    switch: Arc<Switch>,
    processor: Arc<dyn PacketProcessor>,
    config: DriverConfig,
    rx: mpsc::Receiver<RawPacket>,
    output: Option<mpsc::Sender<ProcessedPacket>>,
    cancel: CancellationToken,
    stats: Arc<DriverStats>,
    next_packet_id: u64,
}

impl DataPlaneDriver {
    /// Creates a driver and the sender feeding its ingress queue.
    pub fn new(
        switch: Arc<Switch>,
        processor: Arc<dyn PacketProcessor>,
        config: DriverConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<RawPacket>) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let driver = Self {
            switch,
            processor,
            config,
            rx,
            output: None,
            cancel,
            stats: Arc::new(DriverStats::default()),
            next_packet_id: 0,
        };
        (driver, tx)
    }

    /// Forwards processed packets to `output`.
    pub fn with_output(mut self, output: mpsc::Sender<ProcessedPacket>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until cancelled or until every ingress sender is gone and the
    /// queue is drained.
    pub async fn run(mut self) {
        info!(
            "Data plane started: quantum {}ms, batch {}",
            self.config.quantum_ms, self.config.batch_size
        );
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "DataPlaneDriver", "start")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "quantum_ms": self.config.quantum_ms,
                "batch_size": self.config.batch_size,
                "queue_depth": self.config.queue_depth,
            })));

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.quantum_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.switch.do_swap() {
                        self.stats.swaps.fetch_add(1, Ordering::Relaxed);
                    }
                    if !self.run_quantum().await {
                        info!("Ingress queue closed");
                        break;
                    }
                }
            }
        }

        info!(
            "Data plane stopped: {} processed, {} dropped, {} swaps",
            self.stats.processed(),
            self.stats.dropped(),
            self.stats.swaps()
        );
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "DataPlaneDriver", "stop")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "processed": self.stats.processed(),
                "dropped": self.stats.dropped(),
                "swaps": self.stats.swaps(),
            })));
    }

    /// Processes one batch. Returns false once the queue is closed and empty.
    async fn run_quantum(&mut self) -> bool {
        for _ in 0..self.config.batch_size {
            match self.rx.try_recv() {
                Ok(raw) => {
                    if let Some(processed) = self.handle(raw) {
                        self.emit(processed).await;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
        true
    }

    fn handle(&mut self, raw: RawPacket) -> Option<ProcessedPacket> {
        let id = self.next_packet_id;
        self.next_packet_id += 1;

        let Some(generation) = self.switch.active_generation() else {
            debug!("Dropping packet {}: no program installed", id);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let result = Packet::new(self.switch.phv_source(), id, raw.ingress_port, raw.data).and_then(|mut packet| {
            let data = self.processor.process(&generation, &mut packet)?;
            Ok(ProcessedPacket {
                id,
                ingress_port: packet.ingress_port(),
                generation: generation.id(),
                layout_generation: packet.phv().generation(),
                data,
                trace: packet.trace().to_vec(),
            })
        });

        match result {
            Ok(processed) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                Some(processed)
            }
            Err(e) => {
                debug!("Dropping packet {}: {}", id, e);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn emit(&mut self, processed: ProcessedPacket) {
        let Some(output) = &self.output else {
            return;
        };
        if output.send(processed).await.is_err() {
            warn!("Output receiver dropped, discarding further packets");
            self.output = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{build_generation, ProgramDescription};
    use crate::packet::PhvSource;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.quantum_ms, 10);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.queue_depth, 1024);

        let parsed: DriverConfig = serde_json::from_str(r#"{ "batch_size": 8 }"#).unwrap();
        assert_eq!(parsed.batch_size, 8);
        assert_eq!(parsed.quantum_ms, 10);
    }

    #[test]
    fn test_default_walker_names() {
        let walker = TableWalker::default();
        assert_eq!(walker.parser, "parser");
        assert_eq!(walker.pipeline, "ingress");
        assert_eq!(walker.deparser, "deparser");
    }

    fn program() -> ProgramDescription {
        serde_json::from_value(serde_json::json!({
            "header_types": [{ "name": "ethernet_t", "fields": [["dstAddr", 48], ["srcAddr", 48], ["etherType", 16]] }],
            "headers": [{ "name": "ethernet", "header_type": "ethernet_t" }],
            "parsers": [{
                "name": "parser",
                "init_state": "start",
                "parse_states": [{ "name": "start", "extracts": ["ethernet"] }]
            }],
            "deparsers": [{ "name": "deparser", "order": ["ethernet"] }],
            "pipelines": [{ "name": "ingress" }]
        }))
        .unwrap()
    }

    #[test]
    fn test_walker_refuses_foreign_layout() {
        let desc = program();
        let old = build_generation(1, &desc).unwrap();
        let new = build_generation(2, &desc).unwrap();
        let source = PhvSource::new();
        source.install(Arc::clone(new.phv_factory()));

        let walker = TableWalker::default();
        let mut packet = Packet::new(&source, 0, 1, vec![0; 14]).unwrap();
        assert_eq!(
            walker.process(&old, &mut packet).unwrap_err(),
            PacketError::GenerationMismatch { packet: 2, program: 1 }
        );

        let mut packet = Packet::new(&source, 1, 1, vec![0; 14]).unwrap();
        assert_eq!(walker.process(&new, &mut packet).unwrap(), vec![0; 14]);
        assert!(packet.trace().is_empty());
    }

    #[tokio::test]
    async fn test_driver_drops_without_program() {
        let switch = Arc::new(Switch::new(Default::default()));
        let (driver, tx) = DataPlaneDriver::new(
            switch,
            Arc::new(TableWalker::default()),
            DriverConfig {
                quantum_ms: 1,
                ..Default::default()
            },
            CancellationToken::new(),
        );
        let stats = driver.stats();

        tx.send(RawPacket {
            ingress_port: 1,
            data: vec![0; 14],
        })
        .await
        .unwrap();
        drop(tx);
        driver.run().await;

        assert_eq!(stats.processed(), 0);
        assert_eq!(stats.dropped(), 1);
    }
}
