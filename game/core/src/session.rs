use hashbrown::HashMap;
use pulse::PlayerId;
use std::net::SocketAddr;

/// Consecutive send failures after which a session is parked dormant.
const DORMANT_THRESHOLD: u32 = 3;

/// A registered player, keyed by the endpoint its datagrams arrive from.
pub struct Session {
    pub player_id: PlayerId,
    pub addr: SocketAddr,
    pub name: String,
    /// Highest snapshot id the client has acknowledged; -1 until the first ACK.
    pub last_ack: i64,
    /// Newest snapshot id sent to the client; -1 until the first fan-out.
    pub last_sent: i64,
    /// Wall clock of the last datagram seen from this endpoint.
    pub last_seen_ms: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    send_failures: u32,
}

impl Session {
    fn new(player_id: PlayerId, addr: SocketAddr, name: String, now_ms: u64) -> Session {
        Session {
            player_id,
            addr,
            name,
            last_ack: -1,
            last_sent: -1,
            last_seen_ms: now_ms,
            packets_sent: 0,
            packets_received: 0,
            send_failures: 0,
        }
    }

    /// Records a send outcome. Repeated failures park the session dormant;
    /// a success resets the streak.
    pub fn record_send(&mut self, ok: bool) {
        if ok {
            self.packets_sent += 1;
            self.send_failures = 0;
        } else {
            self.send_failures += 1;
        }
    }

    /// A dormant session is skipped during fan-out until it is heard from
    /// again. It never aborts the game for everyone else.
    #[inline]
    pub fn is_dormant(&self) -> bool {
        self.send_failures >= DORMANT_THRESHOLD
    }

    /// Marks the endpoint live after ingress.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = now_ms;
        self.packets_received += 1;
        self.send_failures = 0;
    }
}

/// Endpoint -> player mapping. Player ids are dense, assigned in
/// registration order starting at 1 and never reused within a game; the
/// endpoint mapping is unique at any instant.
pub struct SessionRegistry {
    sessions: Vec<Session>,
    by_addr: HashMap<SocketAddr, usize>,
    max_clients: usize,
}

impl SessionRegistry {
    pub fn new(max_clients: usize) -> SessionRegistry {
        SessionRegistry {
            sessions: Vec::with_capacity(max_clients),
            by_addr: HashMap::with_capacity(max_clients),
            max_clients,
        }
    }

    /// Registers the endpoint, or returns the existing id: INIT is
    /// idempotent so a client's handshake retries are harmless. Returns
    /// None when the table is full.
    pub fn register(&mut self, addr: SocketAddr, name: String, now_ms: u64) -> Option<PlayerId> {
        if let Some(&slot) = self.by_addr.get(&addr) {
            let session = &mut self.sessions[slot];
            session.touch(now_ms);
            return Some(session.player_id);
        }

        if self.sessions.len() >= self.max_clients {
            return None;
        }

        let player_id = (self.sessions.len() + 1) as PlayerId;
        self.by_addr.insert(addr, self.sessions.len());
        self.sessions.push(Session::new(player_id, addr, name, now_ms));

        Some(player_id)
    }

    #[inline]
    pub fn lookup(&self, addr: &SocketAddr) -> Option<&Session> {
        self.by_addr.get(addr).map(|&slot| &self.sessions[slot])
    }

    #[inline]
    pub fn lookup_mut(&mut self, addr: &SocketAddr) -> Option<&mut Session> {
        let sessions = &mut self.sessions;
        self.by_addr.get(addr).map(move |&slot| &mut sessions[slot])
    }

    /// Sessions in registration order; broadcast iterates this stably.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Monotonic update of the session's acknowledged snapshot.
    pub fn mark_ack(&mut self, addr: &SocketAddr, snapshot_id: u32) {
        if let Some(session) = self.lookup_mut(addr) {
            session.last_ack = session.last_ack.max(i64::from(snapshot_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_dense_distinct_ids() {
        let mut registry = SessionRegistry::new(4);

        assert_eq!(registry.register(addr(1000), "a".into(), 0), Some(1));
        assert_eq!(registry.register(addr(1001), "b".into(), 0), Some(2));
        assert_eq!(registry.register(addr(1002), "c".into(), 0), Some(3));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_idempotent_register() {
        let mut registry = SessionRegistry::new(4);

        assert_eq!(registry.register(addr(1000), "a".into(), 0), Some(1));
        // The client re-sends INIT when INIT_ACK is lost; the same id comes
        // back and no new session is created.
        assert_eq!(registry.register(addr(1000), "a".into(), 5), Some(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&addr(1000)).unwrap().last_seen_ms, 5);
    }

    #[test]
    fn test_table_full() {
        let mut registry = SessionRegistry::new(2);

        assert!(registry.register(addr(1000), "a".into(), 0).is_some());
        assert!(registry.register(addr(1001), "b".into(), 0).is_some());
        assert_eq!(registry.register(addr(1002), "c".into(), 0), None);

        // Existing endpoints still resolve once the table is full.
        assert_eq!(registry.register(addr(1001), "b".into(), 0), Some(2));
    }

    #[test]
    fn test_mark_ack_is_monotonic() {
        let mut registry = SessionRegistry::new(4);
        registry.register(addr(1000), "a".into(), 0);

        assert_eq!(registry.lookup(&addr(1000)).unwrap().last_ack, -1);

        registry.mark_ack(&addr(1000), 7);
        assert_eq!(registry.lookup(&addr(1000)).unwrap().last_ack, 7);

        // A late ACK for an older snapshot never regresses the watermark.
        registry.mark_ack(&addr(1000), 3);
        assert_eq!(registry.lookup(&addr(1000)).unwrap().last_ack, 7);
    }

    #[test]
    fn test_dormancy() {
        let mut registry = SessionRegistry::new(4);
        registry.register(addr(1000), "a".into(), 0);

        let session = registry.lookup_mut(&addr(1000)).unwrap();
        assert!(!session.is_dormant());

        for _ in 0..3 {
            session.record_send(false);
        }
        assert!(session.is_dormant());

        // Hearing from the endpoint revives it.
        session.touch(10);
        assert!(!session.is_dormant());
    }
}
