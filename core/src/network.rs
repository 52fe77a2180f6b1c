use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, trace};

use crate::Cycle;
use crate::core::latency::LIMB_BYTES;
use crate::core::stats::NetworkStats;

/// The collective classes the network implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectiveKind {
    /// One chiplet distributes a value to every other participant.
    Broadcast,
    /// Every other participant contributes a value to one chiplet.
    Aggregate,
}

/// Barrier state for one synchronization id.
#[derive(Debug)]
struct SyncOperation {
    sync_size: u64,
    kind: CollectiveKind,
    ready_count: u64,
    inputs_pending: i32,
    outputs_pending: i32,
    aggregation_destination: Option<usize>,
    broadcast_destinations: Vec<usize>,
    min_participant: usize,
    max_participant: usize,
}

impl SyncOperation {
    fn new(sync_size: u64, kind: CollectiveKind) -> Self {
        Self {
            sync_size,
            kind,
            ready_count: 0,
            inputs_pending: 0,
            outputs_pending: 0,
            aggregation_destination: None,
            broadcast_destinations: Vec::new(),
            min_participant: usize::MAX,
            max_participant: 0,
        }
    }

    fn register_participant(&mut self, chiplet: usize) {
        self.ready_count += 1;
        self.min_participant = self.min_participant.min(chiplet);
        self.max_participant = self.max_participant.max(chiplet);
    }

    fn is_ready(&self) -> bool {
        self.ready_count == self.sync_size
    }

    /// Topology hop count across the span of participating chiplets.
    fn hop_count(&self) -> u32 {
        let span = self.max_participant.saturating_sub(self.min_participant);
        if span == 0 { 0 } else { span.ilog2() }
    }
}

/// An outbound transfer sitting in a per-destination bandwidth buffer.
#[derive(Debug)]
struct OutputBwEntry {
    sync_id: u64,
    #[allow(dead_code)]
    bytes: usize,
    in_flight: bool,
}

/// Delivery queue from the network to one chiplet's collective queue.
/// Entries carry the cycle at which they become visible.
#[derive(Debug, Default)]
pub struct ChipletPort {
    events: Mutex<VecDeque<(Cycle, u64)>>,
}

impl ChipletPort {
    fn deliver(&self, due: Cycle, sync_id: u64) {
        self.events.lock().expect("port lock poisoned").push_back((due, sync_id));
    }

    /// Removes and returns one due event, if any.
    pub fn pop_due(&self, cycle: Cycle) -> Option<u64> {
        let mut events = self.events.lock().expect("port lock poisoned");
        let idx = events.iter().position(|&(due, _)| due <= cycle)?;
        events.remove(idx).map(|(_, sync_id)| sync_id)
    }
}

/// The inter-chiplet collective engine.
///
/// Shared by every chiplet: barrier registration and completion take the
/// writer lock, readiness polling takes the reader lock. Outbound traffic
/// is serialized through one bandwidth buffer per destination; each packet
/// occupies the link for `limb / link_bw` worth of core cycles, then lands
/// with a topology-dependent hop latency.
pub struct Network {
    num_chiplets: usize,
    sync_ops: RwLock<HashMap<u64, SyncOperation>>,
    /// Packets sent by chiplets this cycle; ingested at the network tick,
    /// one cycle of link transit after the send.
    inbound: Mutex<Vec<(usize, u64)>>,
    buffers: Mutex<Vec<VecDeque<OutputBwEntry>>>,
    in_flight: Mutex<Vec<(Cycle, usize, u64)>>,
    ports: Vec<Arc<ChipletPort>>,
    cycles_per_packet: Cycle,
    stats: Mutex<NetworkStats>,
}

impl Network {
    pub fn new(num_chiplets: usize, clock_hz: u64, link_bw: u64) -> Self {
        let cycles_per_packet = (LIMB_BYTES as u64 * clock_hz).div_ceil(link_bw).max(1);
        Self {
            num_chiplets,
            sync_ops: RwLock::new(HashMap::new()),
            inbound: Mutex::new(Vec::new()),
            buffers: Mutex::new((0..num_chiplets).map(|_| VecDeque::new()).collect()),
            in_flight: Mutex::new(Vec::new()),
            ports: (0..num_chiplets).map(|_| Arc::new(ChipletPort::default())).collect(),
            cycles_per_packet,
            stats: Mutex::new(NetworkStats::default()),
        }
    }

    pub fn num_chiplets(&self) -> usize {
        self.num_chiplets
    }

    pub fn port(&self, chiplet: usize) -> Arc<ChipletPort> {
        self.ports[chiplet].clone()
    }

    /// Registers one chiplet's arrival at the barrier for `sync_id`.
    ///
    /// `send_reply` marks this chiplet as a value destination;
    /// `recv_value` marks it as a value contributor. Must be called
    /// exactly once per collective instruction.
    ///
    /// # Panics
    ///
    /// Panics if the operation kind or size disagrees with an existing
    /// record for the same id (a network protocol error).
    pub fn try_register_sync(
        &self,
        chiplet: usize,
        sync_id: u64,
        sync_size: u64,
        kind: CollectiveKind,
        send_reply: bool,
        recv_value: bool,
    ) -> bool {
        let mut sync_ops = self.sync_ops.write().expect("network lock poisoned");
        let sync_op = sync_ops
            .entry(sync_id)
            .or_insert_with(|| SyncOperation::new(sync_size, kind));
        assert!(
            sync_op.kind == kind,
            "network: sync {sync_id} registered as {:?} but recorded as {:?}",
            kind,
            sync_op.kind
        );
        assert!(
            sync_op.sync_size == sync_size,
            "network: sync {sync_id} registered with size {sync_size} but recorded as {}",
            sync_op.sync_size
        );
        sync_op.register_participant(chiplet);
        if recv_value {
            sync_op.inputs_pending += 1;
        }
        if send_reply {
            sync_op.outputs_pending += 1;
            match kind {
                CollectiveKind::Aggregate => {
                    assert!(
                        sync_op.aggregation_destination.is_none(),
                        "network: sync {sync_id} has two aggregation destinations"
                    );
                    sync_op.aggregation_destination = Some(chiplet);
                }
                CollectiveKind::Broadcast => {
                    sync_op.broadcast_destinations.push(chiplet);
                }
            }
        }
        debug!(
            "network: sync {sync_id} ready count {} of {}",
            sync_op.ready_count, sync_op.sync_size
        );
        if sync_op.is_ready() {
            // The barrier just completed; the collective must be well
            // formed before any traffic moves.
            match sync_op.kind {
                CollectiveKind::Broadcast => assert!(
                    sync_op.inputs_pending == 1,
                    "network: broadcast {sync_id} completed with {} senders",
                    sync_op.inputs_pending
                ),
                CollectiveKind::Aggregate => assert!(
                    sync_op.outputs_pending == 1 && sync_op.aggregation_destination.is_some(),
                    "network: aggregation {sync_id} completed without exactly one destination"
                ),
            }
        }
        true
    }

    /// True once every participant named by `sync_size` has registered.
    pub fn network_ready(&self, sync_id: u64) -> bool {
        let sync_ops = self.sync_ops.read().expect("network lock poisoned");
        let Some(sync_op) = sync_ops.get(&sync_id) else {
            return false;
        };
        assert!(sync_op.inputs_pending >= 0);
        assert!(sync_op.outputs_pending >= 0);
        sync_op.is_ready()
    }

    /// Queues an inbound packet from `sender`; it reaches the switch at
    /// this cycle's network tick.
    pub fn send_packet(&self, sender: usize, sync_id: u64) {
        self.inbound
            .lock()
            .expect("network lock poisoned")
            .push((sender, sync_id));
    }

    /// Ingests an inbound packet. When the last contributor arrives, the
    /// value is queued on every destination's bandwidth buffer.
    ///
    /// # Panics
    ///
    /// Panics if no live sync record matches the packet.
    fn handle_input(&self, sender: usize, sync_id: u64) {
        let mut sync_ops = self.sync_ops.write().expect("network lock poisoned");
        let Some(sync_op) = sync_ops.get_mut(&sync_id) else {
            panic!("network: packet from chiplet {sender} for unknown sync {sync_id}");
        };
        sync_op.inputs_pending -= 1;
        assert!(sync_op.inputs_pending >= 0);
        trace!("network: packet from chiplet {sender} for sync {sync_id}");
        if sync_op.inputs_pending > 0 {
            return;
        }
        let mut buffers = self.buffers.lock().expect("network lock poisoned");
        match sync_op.kind {
            CollectiveKind::Broadcast => {
                for &dest in &sync_op.broadcast_destinations {
                    if dest == sender {
                        continue;
                    }
                    buffers[dest].push_back(OutputBwEntry {
                        sync_id,
                        bytes: LIMB_BYTES,
                        in_flight: false,
                    });
                }
            }
            CollectiveKind::Aggregate => {
                let dest = sync_op
                    .aggregation_destination
                    .unwrap_or_else(|| panic!("network: aggregation {sync_id} has no destination"));
                buffers[dest].push_back(OutputBwEntry {
                    sync_id,
                    bytes: LIMB_BYTES,
                    in_flight: false,
                });
            }
        }
    }

    pub fn tick(&self, cycle: Cycle) {
        {
            let mut stats = self.stats.lock().expect("network lock poisoned");
            stats.total_cycles += 1;
            let sync_ops = self.sync_ops.read().expect("network lock poisoned");
            if sync_ops.values().any(SyncOperation::is_ready) {
                stats.busy_cycles += 1;
            }
        }

        // Ingest this cycle's sends.
        let inbound: Vec<(usize, u64)> = {
            let mut pending = self.inbound.lock().expect("network lock poisoned");
            pending.drain(..).collect()
        };
        for (sender, sync_id) in inbound {
            self.handle_input(sender, sync_id);
        }

        // Land packets whose bandwidth slot has elapsed.
        let due: Vec<(usize, u64)> = {
            let mut in_flight = self.in_flight.lock().expect("network lock poisoned");
            let mut due = Vec::new();
            in_flight.retain(|&(ready_at, dest, sync_id)| {
                if ready_at <= cycle {
                    due.push((dest, sync_id));
                    false
                } else {
                    true
                }
            });
            due
        };
        for (dest, sync_id) in due {
            self.handle_output(cycle, dest, sync_id);
        }

        self.buffer_tick(cycle);
    }

    /// Starts the head entry of each bandwidth buffer down its link; one
    /// packet occupies a link for `cycles_per_packet`.
    fn buffer_tick(&self, cycle: Cycle) {
        let mut buffers = self.buffers.lock().expect("network lock poisoned");
        let mut in_flight = self.in_flight.lock().expect("network lock poisoned");
        for (dest, buffer) in buffers.iter_mut().enumerate() {
            let Some(entry) = buffer.front_mut() else {
                continue;
            };
            if entry.in_flight {
                continue;
            }
            entry.in_flight = true;
            in_flight.push((cycle + self.cycles_per_packet, dest, entry.sync_id));
        }
    }

    fn handle_output(&self, cycle: Cycle, dest: usize, sync_id: u64) {
        let mut sync_ops = self.sync_ops.write().expect("network lock poisoned");
        let Some(sync_op) = sync_ops.get_mut(&sync_id) else {
            panic!("network: output for unknown sync {sync_id}");
        };

        // The bandwidth slot already accounts for one hop of transit.
        let hop_latency = Cycle::from(sync_op.hop_count().saturating_sub(1));
        self.ports[dest].deliver(cycle + 1 + hop_latency, sync_id);
        debug!("network: {cycle} delivering sync {sync_id} to chiplet {dest} (+{hop_latency} hops)");
        sync_op.outputs_pending -= 1;
        assert!(sync_op.outputs_pending >= 0);

        let mut buffers = self.buffers.lock().expect("network lock poisoned");
        let entry = buffers[dest]
            .pop_front()
            .unwrap_or_else(|| panic!("network: output for sync {sync_id} without a buffer entry"));
        assert!(entry.in_flight);

        let drained = sync_op.inputs_pending == 0 && sync_op.outputs_pending == 0;
        if drained {
            debug!("network: sync {sync_id} complete");
            sync_ops.remove(&sync_id);
        }
    }

    /// Live barrier records; zero when every collective has drained.
    pub fn live_sync_count(&self) -> usize {
        self.sync_ops.read().expect("network lock poisoned").len()
    }

    pub fn stats(&self) -> NetworkStats {
        *self.stats.lock().expect("network lock poisoned")
    }
}
