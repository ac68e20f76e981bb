use crate::grid::Grid;
use crate::session::SessionRegistry;
use std::mem;
use std::net::SocketAddr;

/// A buffered claim attempt, stamped with its server arrival order.
#[derive(Debug, Clone, Copy)]
pub struct ClaimEvent {
    pub addr: SocketAddr,
    pub row: u16,
    pub col: u16,
    /// Client-reported event timestamp.
    pub timestamp_ms: u64,
    /// Monotonic arrival sequence assigned on reception.
    pub arrival: u64,
}

/// FIFO of claim attempts accumulated between ticks. Arrivals concurrent
/// with a tick land here and are arbitrated on the next one.
pub struct EventQueue {
    events: Vec<ClaimEvent>,
    arrival: u64,
}

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue {
            events: Vec::new(),
            arrival: 0,
        }
    }

    /// Buffers one claim, stamping the arrival sequence.
    pub fn push(&mut self, addr: SocketAddr, row: u16, col: u16, timestamp_ms: u64) {
        self.events.push(ClaimEvent {
            addr,
            row,
            col,
            timestamp_ms,
            arrival: self.arrival,
        });
        self.arrival += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Takes the tick's batch, leaving the queue empty for new arrivals.
    pub fn take(&mut self) -> Vec<ClaimEvent> {
        mem::replace(&mut self.events, Vec::new())
    }
}

/// Applies one tick's worth of claims against the grid. Claims are ordered
/// by (client timestamp, server arrival) so arbitration is deterministic
/// regardless of datagram arrival order; claims from unknown endpoints and
/// claims for owned or out-of-bounds cells fall away silently. Returns the
/// number of claims applied.
pub fn arbitrate(mut events: Vec<ClaimEvent>, grid: &mut Grid, registry: &SessionRegistry) -> usize {
    events.sort_by_key(|event| (event.timestamp_ms, event.arrival));

    let mut applied = 0;

    for event in events {
        let owner = match registry.lookup(&event.addr) {
            Some(session) => session.player_id,
            None => continue,
        };

        if grid.claim(event.row as usize, event.col as usize, owner) {
            applied += 1;
        }
    }

    applied
}
