//! Headless ChronoClash client: plays by itself, claiming random vacant
//! cells at a humanlike cadence until the game ends or a duration budget
//! runs out. Stands in for the interactive front-end during test runs.

use clap::Parser;
use clashclient::config::ClientConfig;
use clashclient::net::Connector;
use clashclient::pending::PendingClaims;
use clashclient::view::ClientView;
use lattice::message::Message;
use pulse::logging;
use pulse::time::timestamp_ms;
use rand::Rng;
use std::process;
use std::time::{Duration, Instant};

/// Humanlike pause between simulated clicks.
const CLICK_DELAY_MIN_MS: u64 = 200;
const CLICK_DELAY_MAX_MS: u64 = 500;
/// Progress log cadence, in installed snapshots.
const STATUS_LOG_INTERVAL: u64 = 20;

#[derive(Parser)]
#[command(name = "headless")]
struct Args {
    /// Server endpoint.
    #[arg(long, default_value = "127.0.0.1:9999")]
    server: String,
    /// Display name sent in the handshake (truncated to 16 bytes).
    #[arg(long, default_value = "headless")]
    name: String,
    /// Give up after this many seconds even if the game is still running.
    #[arg(long, default_value_t = 300)]
    duration: u64,
    /// Resend cadence for unresolved claims, in milliseconds.
    #[arg(long, default_value_t = 50)]
    retransmit_interval: u64,
    /// Resend attempts per claim before giving up on it.
    #[arg(long, default_value_t = 10)]
    retry_cap: u32,
    /// Acknowledge every installed snapshot.
    #[arg(long)]
    send_acks: bool,
    /// Log severity: trace, debug, info, warning, error or critical.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let level = match logging::severity(&args.log_level) {
        Some(level) => level,
        None => {
            eprintln!("Unknown log level: {}", args.log_level);
            process::exit(1);
        }
    };
    let log = logging::term_root(level);

    let config = ClientConfig {
        server: args.server,
        name: args.name,
        retransmit_interval_ms: args.retransmit_interval,
        retry_cap: args.retry_cap,
        send_acks: args.send_acks,
        ..ClientConfig::default()
    };

    let mut connector = match Connector::new(&config.server, &log) {
        Ok(connector) => connector,
        Err(err) => {
            logging::crit!(log, "socket setup failed"; "error" => %err);
            process::exit(1);
        }
    };

    let player_id = match connector.connect(&config) {
        Ok(player_id) => player_id,
        Err(err) => {
            logging::crit!(log, "connection failed"; "error" => %err);
            process::exit(1);
        }
    };

    let mut view = ClientView::new();
    let mut pending = PendingClaims::new(config.retransmit_interval_ms, config.retry_cap);
    let mut rng = rand::thread_rng();
    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut next_click_ms = 0u64;

    while Instant::now() < deadline {
        // The receive timeout paces this loop at roughly a tick interval.
        if let Some((_, message)) = connector.recv() {
            match message {
                Message::Snapshot { frames } => {
                    let now_ms = timestamp_ms();
                    if view.apply_snapshot(&frames, now_ms) {
                        pending.sweep(view.grid(), view.grid_size());

                        if config.send_acks {
                            let ack = Message::Ack {
                                snapshot_id: view.highest_snapshot() as u32,
                            };
                            connector.send(&ack, 0);
                        }

                        let stats = view.stats();
                        if stats.accepted % STATUS_LOG_INTERVAL == 0 {
                            logging::info!(log, "progress";
                                           "snapshot_id" => view.highest_snapshot(),
                                           "claimed" => view.cells_owned_by(player_id),
                                           "pending" => pending.len(),
                                           "missed" => stats.missed,
                                           "latency_ms" => stats.last_latency_ms,
                                           "jitter_ms" => stats.last_jitter_ms);
                        }
                    }
                }
                Message::GameOver { scores } => {
                    view.finish(scores);
                }
                // Duplicate INIT_ACKs and anything else are stale noise.
                _ => {}
            }
        }

        if view.game_over() {
            break;
        }

        let now_ms = timestamp_ms();

        // Simulated play: claim a random vacant cell we are not already
        // chasing, at a humanlike cadence.
        if view.grid_size() > 0 && now_ms >= next_click_ms {
            let vacant: Vec<(u16, u16)> = view
                .vacant_cells()
                .into_iter()
                .filter(|cell| !pending.contains(*cell))
                .collect();

            if !vacant.is_empty() {
                let (row, col) = vacant[rng.gen_range(0..vacant.len())];
                connector.send_claim(row, col);
                pending.insert((row, col), now_ms);
                logging::debug!(log, "claim sent"; "row" => row, "col" => col);
            }

            next_click_ms = now_ms + rng.gen_range(CLICK_DELAY_MIN_MS..=CLICK_DELAY_MAX_MS);
        }

        // Retransmit sweep: unresolved claims go out again until the cap.
        for (row, col) in pending.due(now_ms) {
            connector.send_claim(row, col);
            logging::debug!(log, "claim re-sent"; "row" => row, "col" => col);
        }
    }

    match view.scoreboard() {
        Some(scores) => {
            for entry in scores {
                logging::info!(log, "final score";
                               "player_id" => entry.player_id,
                               "cells" => entry.score);
            }
            let stats = view.stats();
            logging::info!(log, "session summary";
                           "accepted" => stats.accepted,
                           "missed" => stats.missed,
                           "discarded" => stats.discarded,
                           "own_cells" => view.cells_owned_by(player_id));
        }
        None => logging::warn!(log, "duration elapsed without game over"),
    }
}
