//! End-to-end exercises over localhost: a real `GameServer` on an ephemeral
//! port, with minimal scripted clients speaking the wire protocol.

use clashcore::config::{Game, Server, ServerConfig};
use clashcore::server::GameServer;
use lattice::codec::{self, Header};
use lattice::message::{self, Message};
use pulse::logging;
use pulse::time::timestamp_ms;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

fn test_config(grid_size: u16) -> ServerConfig {
    ServerConfig {
        server: Server {
            address: "127.0.0.1:0".to_string(),
            max_clients: 4,
        },
        game: Game {
            grid_size,
            snapshot_rate_hz: 50,
            redundancy: 2,
            session_resend: false,
        },
    }
}

/// Spawns a server on an ephemeral port, returning its address and stop
/// handle. The thread is left to drain on its own after the test.
fn spawn_server(grid_size: u16) -> (SocketAddr, std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let log = logging::test_root();
    let mut server = GameServer::bind(test_config(grid_size), &log).unwrap();
    let addr = server.local_addr().unwrap();
    let stop = server.stop_handle();

    thread::spawn(move || {
        let _ = server.run();
    });

    (addr, stop)
}

struct ScriptedClient {
    socket: UdpSocket,
    server: SocketAddr,
    sequence: u32,
    buf: [u8; 4096],
}

impl ScriptedClient {
    fn new(server: SocketAddr) -> ScriptedClient {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();

        ScriptedClient {
            socket,
            server,
            sequence: 0,
            buf: [0; 4096],
        }
    }

    fn send(&mut self, message: &Message) {
        self.sequence += 1;
        let payload = message.to_payload();
        let datagram = codec::encode(
            message.kind(),
            0,
            self.sequence,
            timestamp_ms(),
            &payload,
        )
        .unwrap();
        self.socket.send_to(&datagram, self.server).unwrap();
    }

    fn recv(&mut self) -> Option<(Header, Message)> {
        let (len, _) = match self.socket.recv_from(&mut self.buf) {
            Ok(pair) => pair,
            Err(_) => return None,
        };

        let (header, payload) = codec::decode(&self.buf[..len]).ok()?;
        let message = Message::from_payload(header.kind, payload).ok()?;
        Some((header, message))
    }

    fn connect(&mut self, nonce: u64, name: &str) -> u32 {
        for _ in 0..10 {
            self.send(&Message::Init {
                nonce,
                name: message::pack_name(name),
            });

            let deadline = Instant::now() + Duration::from_millis(300);
            while Instant::now() < deadline {
                if let Some((_, Message::InitAck {
                    nonce: echoed,
                    player_id,
                    ..
                })) = self.recv()
                {
                    if echoed == nonce {
                        return player_id;
                    }
                }
            }
        }

        panic!("handshake failed against the loopback server");
    }
}

#[test]
fn handshake_then_monotonic_snapshot_stream() {
    let (server, stop) = spawn_server(5);
    let mut client = ScriptedClient::new(server);

    assert_eq!(client.connect(7, "A"), 1);

    let mut last_newest: i64 = -1;
    let mut observed = 0;
    let deadline = Instant::now() + Duration::from_secs(5);

    while observed < 8 && Instant::now() < deadline {
        if let Some((header, Message::Snapshot { frames })) = client.recv() {
            assert!(!frames.is_empty());

            // The outer header advertises the newest embedded frame.
            let newest = frames.iter().map(|frame| frame.id).max().unwrap();
            assert_eq!(header.snapshot_id, newest);
            assert_eq!(frames[0].id, newest);

            // Embedded frames are consecutive: no server-side id is skipped.
            for pair in frames.windows(2) {
                assert_eq!(pair[0].id, pair[1].id + 1);
            }

            // Loopback delivery is in order; the stream never regresses.
            assert!(i64::from(newest) > last_newest);
            last_newest = i64::from(newest);
            observed += 1;

            for frame in &frames {
                assert_eq!(frame.grid.len(), 25);
            }
        }
    }

    assert!(observed >= 8, "no steady snapshot stream observed");
    stop.store(true, Ordering::Relaxed);
}

#[test]
fn idempotent_init_keeps_player_id() {
    let (server, stop) = spawn_server(5);
    let mut client = ScriptedClient::new(server);

    assert_eq!(client.connect(11, "A"), 1);
    // The INIT_ACK got "lost"; the client tries again with a fresh nonce.
    assert_eq!(client.connect(12, "A"), 1);

    // A second endpoint still gets the next dense id.
    let mut other = ScriptedClient::new(server);
    assert_eq!(other.connect(13, "B"), 2);

    stop.store(true, Ordering::Relaxed);
}

#[test]
fn full_game_reaches_game_over() {
    let (server, stop) = spawn_server(2);
    let mut alpha = ScriptedClient::new(server);
    let mut beta = ScriptedClient::new(server);

    let alpha_id = alpha.connect(21, "alpha");
    let beta_id = beta.connect(22, "beta");
    assert_ne!(alpha_id, beta_id);

    let alpha_cells = [(0u16, 0u16), (0, 1)];
    let beta_cells = [(1u16, 0u16), (1, 1)];

    let mut scoreboard = None;
    let mut last_send = Instant::now() - Duration::from_secs(1);
    let deadline = Instant::now() + Duration::from_secs(10);

    while Instant::now() < deadline {
        // At-least-once claims: keep re-sending until the state says owned.
        if last_send.elapsed() >= Duration::from_millis(100) {
            for &(row, col) in &alpha_cells {
                alpha.send(&Message::Event {
                    timestamp_ms: timestamp_ms(),
                    row,
                    col,
                });
            }
            for &(row, col) in &beta_cells {
                beta.send(&Message::Event {
                    timestamp_ms: timestamp_ms(),
                    row,
                    col,
                });
            }
            last_send = Instant::now();
        }

        match alpha.recv() {
            Some((_, Message::GameOver { scores })) => {
                scoreboard = Some(scores);
                break;
            }
            Some((_, Message::Snapshot { frames })) => {
                // Claimed cells never change hands from snapshot to snapshot.
                if let Some(frame) = frames.first() {
                    assert_eq!(frame.grid.len(), 4);
                }
            }
            _ => {}
        }

        // Drain beta so its socket buffer does not grow unbounded.
        let _ = beta.recv();
    }

    let scoreboard = scoreboard.expect("no GAME_OVER observed");

    assert_eq!(scoreboard.len(), 2);
    let total: u16 = scoreboard.iter().map(|entry| entry.score).sum();
    assert_eq!(total, 4);

    let mut ids: Vec<u8> = scoreboard.iter().map(|entry| entry.player_id).collect();
    ids.sort();
    assert_eq!(ids, vec![alpha_id as u8, beta_id as u8]);

    stop.store(true, Ordering::Relaxed);
}
