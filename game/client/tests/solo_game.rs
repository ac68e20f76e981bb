//! Drives the complete client stack against a real server over localhost:
//! handshake, claim/retransmit, reconciliation and game-over capture.

use clashclient::config::ClientConfig;
use clashclient::net::Connector;
use clashclient::pending::PendingClaims;
use clashclient::view::ClientView;
use clashcore::config::{Game, Server, ServerConfig};
use clashcore::server::GameServer;
use lattice::message::Message;
use pulse::logging;
use pulse::time::timestamp_ms;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn solo_client_plays_to_game_over() {
    let log = logging::test_root();
    let config = ServerConfig {
        server: Server {
            address: "127.0.0.1:0".to_string(),
            max_clients: 4,
        },
        game: Game {
            grid_size: 2,
            snapshot_rate_hz: 50,
            redundancy: 2,
            session_resend: false,
        },
    };

    let mut server = GameServer::bind(config, &log).unwrap();
    let server_addr = server.local_addr().unwrap();
    thread::spawn(move || {
        let _ = server.run();
    });

    let client_config = ClientConfig {
        server: server_addr.to_string(),
        name: "solo".to_string(),
        retransmit_interval_ms: 50,
        send_acks: true,
        ..ClientConfig::default()
    };

    let mut connector = Connector::new(&client_config.server, &log).unwrap();
    let player_id = connector.connect(&client_config).unwrap();
    assert_eq!(player_id, 1);

    let mut view = ClientView::new();
    let mut pending = PendingClaims::new(
        client_config.retransmit_interval_ms,
        client_config.retry_cap,
    );
    let deadline = Instant::now() + Duration::from_secs(10);

    while !view.game_over() && Instant::now() < deadline {
        if let Some((_, message)) = connector.recv() {
            match message {
                Message::Snapshot { frames } => {
                    if view.apply_snapshot(&frames, timestamp_ms()) {
                        pending.sweep(view.grid(), view.grid_size());

                        let ack = Message::Ack {
                            snapshot_id: view.highest_snapshot() as u32,
                        };
                        connector.send(&ack, 0);
                    }
                }
                Message::GameOver { scores } => view.finish(scores),
                _ => {}
            }
        }

        let now_ms = timestamp_ms();

        // Claim every vacant cell we are not already chasing.
        if view.grid_size() > 0 {
            for (row, col) in view.vacant_cells() {
                if !pending.contains((row, col)) {
                    connector.send_claim(row, col);
                    pending.insert((row, col), now_ms);
                }
            }
        }

        for (row, col) in pending.due(now_ms) {
            connector.send_claim(row, col);
        }
    }

    assert!(view.game_over(), "no GAME_OVER within the deadline");

    let scores = view.scoreboard().unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].player_id, 1);
    assert_eq!(scores[0].score, 4);

    // The mirror converged on the authoritative end state.
    assert_eq!(view.cells_owned_by(player_id), 4);
    assert!(view.stats().accepted > 0);
    assert!(pending.is_empty());
}
