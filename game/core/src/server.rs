//! The authoritative game loop. One nonblocking UDP socket polled on a
//! single thread; the snapshot tick deadline doubles as the poll timeout, so
//! ingress between ticks only buffers and every state mutation happens on a
//! tick boundary. The arbiter therefore always observes a consistent batch
//! of the events arrived before its tick started.

use crate::config::ServerConfig;
use crate::events::{arbitrate, EventQueue};
use crate::grid::Grid;
use crate::session::SessionRegistry;
use crate::snapshot::SnapshotHistory;
use lattice::codec;
use lattice::message::{self, Message, SnapshotFrame};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use pulse::logging::{self, Logger};
use pulse::time::timestamp_ms;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SOCKET_TOKEN: Token = Token(0);
const RECV_BUF_SIZE: usize = 4096;

/// Pause before the final snapshot resend so clients can render the end state.
const FINAL_SNAPSHOT_GRACE: Duration = Duration::from_millis(100);
/// Spacing between the redundant GAME_OVER rounds.
const GAME_OVER_SPACING: Duration = Duration::from_millis(10);
/// Redundant GAME_OVER sends per session.
const GAME_OVER_REPEATS: usize = 3;
/// Drain period for in-flight deliveries before the loop stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Status log cadence, in ticks.
const STATUS_LOG_INTERVAL: u32 = 20;

pub struct GameServer {
    socket: UdpSocket,
    poll: Poll,
    poll_events: Events,
    config: ServerConfig,
    grid: Grid,
    registry: SessionRegistry,
    queue: EventQueue,
    history: SnapshotHistory,
    snapshot_id: u32,
    sequence: u32,
    events_applied: u64,
    packets_in: u64,
    packets_out: u64,
    started: Instant,
    accepting: bool,
    stop: Arc<AtomicBool>,
    recv_buf: [u8; RECV_BUF_SIZE],
    log: Logger,
}

impl GameServer {
    /// Binds the authoritative socket. A bind failure is fatal to the
    /// process and surfaces here as the error.
    pub fn bind(config: ServerConfig, log: &Logger) -> io::Result<GameServer> {
        let addr: SocketAddr = config.server.address.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unparseable bind address {}", config.server.address),
            )
        })?;

        let mut socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;

        logging::info!(log, "server listening";
                       "address" => %local_addr,
                       "grid_size" => config.game.grid_size,
                       "snapshot_rate_hz" => config.game.snapshot_rate_hz,
                       "redundancy" => config.game.redundancy,
                       "max_clients" => config.server.max_clients);

        Ok(GameServer {
            socket,
            poll,
            poll_events: Events::with_capacity(64),
            grid: Grid::new(config.game.grid_size as usize),
            registry: SessionRegistry::new(config.server.max_clients as usize),
            queue: EventQueue::new(),
            history: SnapshotHistory::new(config.game.redundancy as usize),
            snapshot_id: 0,
            sequence: 0,
            events_applied: 0,
            packets_in: 0,
            packets_out: 0,
            started: Instant::now(),
            accepting: true,
            stop: Arc::new(AtomicBool::new(false)),
            recv_buf: [0; RECV_BUF_SIZE],
            config,
            log: log.new(logging::o!()),
        })
    }

    /// Handle for requesting shutdown from another thread. The loop stops
    /// accepting INITs, completes one more tick and ceases.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Local address of the bound socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the loop until the grid is fully claimed or a stop is requested.
    pub fn run(&mut self) -> io::Result<()> {
        let interval = self.config.tick_interval();
        let mut deadline = Instant::now() + interval;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                logging::info!(self.log, "stop requested, ceasing after a final tick");
                self.accepting = false;
                self.tick();
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                deadline = now + interval;

                if self.tick() {
                    self.finish();
                    break;
                }
                continue;
            }

            if let Err(err) = self.poll.poll(&mut self.poll_events, Some(deadline - now)) {
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
            self.drain_socket();
        }

        self.log_summary();
        Ok(())
    }

    /// One tick: arbitrate buffered claims, produce the snapshot, fan out.
    /// Returns true once the grid is fully claimed.
    fn tick(&mut self) -> bool {
        let batch = self.queue.take();
        let buffered = batch.len();
        let applied = arbitrate(batch, &mut self.grid, &self.registry);
        self.events_applied += applied as u64;

        self.snapshot_id += 1;
        self.history.push(SnapshotFrame {
            id: self.snapshot_id,
            timestamp_ms: timestamp_ms(),
            grid: self.grid.as_bytes().to_vec(),
        });

        self.fan_out();

        if self.snapshot_id % STATUS_LOG_INTERVAL == 0 {
            logging::debug!(self.log, "tick";
                            "snapshot_id" => self.snapshot_id,
                            "buffered" => buffered,
                            "applied" => applied,
                            "sessions" => self.registry.len(),
                            "claimed_cells" => self.grid.claimed_cells());
        }

        self.grid.is_full()
    }

    /// Emits one SNAPSHOT datagram per live session, embedding the newest
    /// retained frames for in-band redundancy against datagram loss.
    fn fan_out(&mut self) {
        let budget = message::frames_per_datagram(self.grid.as_bytes().len())
            .min(self.config.game.redundancy as usize);
        let frames = self.history.embed(budget);
        let newest = match frames.first() {
            Some(frame) => frame.id,
            None => return,
        };
        let snapshot = Message::Snapshot { frames };

        let targets: Vec<SocketAddr> = self
            .registry
            .iter()
            .filter(|session| !session.is_dormant())
            .map(|session| session.addr)
            .collect();

        for addr in targets {
            let ok = self.send(addr, newest, &snapshot);
            if let Some(session) = self.registry.lookup_mut(&addr) {
                session.record_send(ok);
                if ok {
                    session.last_sent = i64::from(newest);
                }
            }
        }

        if self.config.game.session_resend {
            self.session_resend();
        }
    }

    /// Off-by-default reliability extra: re-sends retained frames a session
    /// has not acknowledged, one single-frame datagram each. Redundant with
    /// the embedded frames whenever the redundancy depth is at least 2.
    fn session_resend(&mut self) {
        let targets: Vec<(SocketAddr, i64)> = self
            .registry
            .iter()
            .filter(|session| !session.is_dormant())
            .map(|session| (session.addr, session.last_ack))
            .collect();

        for (addr, last_ack) in targets {
            let resends: Vec<SnapshotFrame> = self.history.stale(last_ack).cloned().collect();

            for frame in resends {
                let id = frame.id;
                let ok = self.send(addr, id, &Message::Snapshot { frames: vec![frame] });
                if let Some(session) = self.registry.lookup_mut(&addr) {
                    session.record_send(ok);
                }
            }
        }
    }

    /// Reads until the socket would block, buffering claims and updating
    /// session state. A datagram that fails validation or parsing is dropped
    /// without a response and without touching game state.
    fn drain_socket(&mut self) {
        loop {
            let (len, addr) = match self.socket.recv_from(&mut self.recv_buf) {
                Ok(pair) => pair,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    logging::warn!(self.log, "socket receive failed"; "error" => %err);
                    break;
                }
            };

            self.packets_in += 1;

            let message = match codec::decode(&self.recv_buf[..len])
                .and_then(|(header, payload)| Message::from_payload(header.kind, payload))
            {
                Ok(message) => message,
                Err(reason) => {
                    logging::trace!(self.log, "dropping datagram";
                                    "source" => %addr,
                                    "reason" => ?reason);
                    continue;
                }
            };

            self.dispatch(addr, message);
        }
    }

    fn dispatch(&mut self, addr: SocketAddr, message: Message) {
        let now_ms = timestamp_ms();

        match message {
            Message::Init { nonce, name } => self.handle_init(addr, nonce, &name, now_ms),
            Message::Event {
                timestamp_ms: event_ms,
                row,
                col,
            } => {
                if let Some(session) = self.registry.lookup_mut(&addr) {
                    session.touch(now_ms);
                }
                // Claims from endpoints without a session still queue; the
                // arbiter drops them unless an INIT lands before its tick.
                self.queue.push(addr, row, col, event_ms);
            }
            Message::Ack { snapshot_id } => {
                if let Some(session) = self.registry.lookup_mut(&addr) {
                    session.touch(now_ms);
                }
                self.registry.mark_ack(&addr, snapshot_id);
            }
            // Clients have no business sending the remaining kinds.
            other => {
                logging::debug!(self.log, "ignoring unexpected message";
                                "source" => %addr,
                                "kind" => ?other.kind());
            }
        }
    }

    fn handle_init(&mut self, addr: SocketAddr, nonce: u64, name: &[u8; 16], now_ms: u64) {
        if !self.accepting {
            return;
        }

        let name = message::unpack_name(name);
        let player_id = match self.registry.register(addr, name.clone(), now_ms) {
            Some(player_id) => player_id,
            None => {
                // No INIT_ACK: the client's own retry budget surfaces this
                // as a connection failure.
                logging::info!(self.log, "rejecting INIT, session table full"; "source" => %addr);
                return;
            }
        };

        logging::info!(self.log, "player registered";
                       "player_id" => player_id,
                       "name" => name,
                       "source" => %addr);

        let ack = Message::InitAck {
            nonce,
            player_id: u32::from(player_id),
            snapshot_id: self.snapshot_id,
            timestamp_ms: now_ms,
        };
        let ok = self.send(addr, 0, &ack);
        if let Some(session) = self.registry.lookup_mut(&addr) {
            session.record_send(ok);
        }
    }

    /// Termination sequence: grace pause, final snapshot resend, scoreboard
    /// computation, redundant GAME_OVER burst, then a drain period for
    /// in-flight deliveries.
    fn finish(&mut self) {
        logging::info!(self.log, "grid fully claimed"; "snapshot_id" => self.snapshot_id);

        thread::sleep(FINAL_SNAPSHOT_GRACE);
        self.fan_out();

        let scores = self.grid.scoreboard();
        for entry in &scores {
            logging::info!(self.log, "final score";
                           "player_id" => entry.player_id,
                           "cells" => entry.score);
        }
        if let Some(winner) = scores.first() {
            logging::info!(self.log, "winner";
                           "player_id" => winner.player_id,
                           "cells" => winner.score);
        }

        let game_over = Message::GameOver { scores };
        for round in 0..GAME_OVER_REPEATS {
            // Best effort: dormant sessions get their chance here too.
            let targets: Vec<SocketAddr> =
                self.registry.iter().map(|session| session.addr).collect();

            for addr in targets {
                let ok = self.send(addr, 0, &game_over);
                if let Some(session) = self.registry.lookup_mut(&addr) {
                    session.record_send(ok);
                }
            }

            if round + 1 < GAME_OVER_REPEATS {
                thread::sleep(GAME_OVER_SPACING);
            }
        }

        logging::info!(self.log, "draining before shutdown"; "grace" => ?SHUTDOWN_GRACE);
        thread::sleep(SHUTDOWN_GRACE);
    }

    /// Encodes and transmits one message. A send error on the unreliable
    /// transport is absorbed; snapshots re-send naturally on the next tick
    /// and repeated failures park the session dormant.
    fn send(&mut self, addr: SocketAddr, snapshot_id: u32, message: &Message) -> bool {
        self.sequence = self.sequence.wrapping_add(1);

        let payload = message.to_payload();
        let datagram = match codec::encode(
            message.kind(),
            snapshot_id,
            self.sequence,
            timestamp_ms(),
            &payload,
        ) {
            Ok(datagram) => datagram,
            Err(reason) => {
                // Only oversize payloads fail here; frame budgets keep
                // snapshots under the datagram lid.
                logging::error!(self.log, "encode failed";
                                "kind" => ?message.kind(),
                                "reason" => ?reason);
                return false;
            }
        };

        match self.socket.send_to(&datagram, addr) {
            Ok(_) => {
                self.packets_out += 1;
                true
            }
            Err(err) => {
                logging::warn!(self.log, "send failed"; "dest" => %addr, "error" => %err);
                false
            }
        }
    }

    fn log_summary(&self) {
        logging::info!(self.log, "server summary";
                       "uptime_ms" => self.started.elapsed().as_millis() as u64,
                       "snapshots" => self.snapshot_id,
                       "events_applied" => self.events_applied,
                       "packets_in" => self.packets_in,
                       "packets_out" => self.packets_out,
                       "sessions" => self.registry.len());
    }
}
