use lattice::message::{PlayerScore, SnapshotFrame};
use pulse::PlayerId;

/// Rolling reception statistics. Together with the installed grid these are
/// the observable outputs metric collaborators reconstruct latency, jitter
/// and position error from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewStats {
    /// Snapshots installed.
    pub accepted: u64,
    /// Datagrams whose frames were all stale or malformed.
    pub discarded: u64,
    /// Estimated snapshots never seen, from gaps in the installed ids.
    pub missed: u64,
    /// recv wall clock minus the installed frame's server timestamp.
    pub last_latency_ms: u64,
    /// Absolute change of latency between consecutive installs.
    pub last_jitter_ms: u64,
}

/// The client's mirror of the authoritative grid. Only frames with an id
/// strictly above the highest seen are installed, so the accepted sequence
/// is strictly increasing; stale and duplicate frames are discarded. Display
/// smoothing never feeds back into acceptance.
pub struct ClientView {
    grid: Vec<u8>,
    grid_size: usize,
    highest_snapshot: i64,
    stats: ViewStats,
    scoreboard: Option<Vec<PlayerScore>>,
    game_over: bool,
}

impl ClientView {
    pub fn new() -> ClientView {
        ClientView {
            grid: Vec::new(),
            grid_size: 0,
            highest_snapshot: -1,
            stats: ViewStats::default(),
            scoreboard: None,
            game_over: false,
        }
    }

    /// Installs the newest strictly-newer frame of a SNAPSHOT datagram, if
    /// there is one. Returns true when the view advanced.
    pub fn apply_snapshot(&mut self, frames: &[SnapshotFrame], recv_ms: u64) -> bool {
        let frame = frames
            .iter()
            .filter(|frame| i64::from(frame.id) > self.highest_snapshot)
            .max_by_key(|frame| frame.id);

        let frame = match frame {
            Some(frame) => frame,
            None => {
                self.stats.discarded += 1;
                return false;
            }
        };

        // Geometry is authoritative too: adopt it from the frame, and drop
        // frames whose grid is not square.
        let grid_size = match square_side(frame.grid.len()) {
            Some(side) => side,
            None => {
                self.stats.discarded += 1;
                return false;
            }
        };

        if self.highest_snapshot >= 0 {
            let expected = self.highest_snapshot + 1;
            if i64::from(frame.id) > expected {
                self.stats.missed += (i64::from(frame.id) - expected) as u64;
            }
        }

        let latency = recv_ms.saturating_sub(frame.timestamp_ms);
        if self.stats.accepted > 0 {
            let previous = self.stats.last_latency_ms;
            self.stats.last_jitter_ms = if latency > previous {
                latency - previous
            } else {
                previous - latency
            };
        }
        self.stats.last_latency_ms = latency;
        self.stats.accepted += 1;

        self.highest_snapshot = i64::from(frame.id);
        self.grid = frame.grid.clone();
        self.grid_size = grid_size;

        true
    }

    /// Records the final scoreboard and flags shutdown.
    pub fn finish(&mut self, scores: Vec<PlayerScore>) {
        self.scoreboard = Some(scores);
        self.game_over = true;
    }

    #[inline]
    pub fn grid(&self) -> &[u8] {
        &self.grid
    }

    /// Side length of the mirrored grid; 0 until the first install.
    #[inline]
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Highest installed snapshot id; -1 until the first install.
    #[inline]
    pub fn highest_snapshot(&self) -> i64 {
        self.highest_snapshot
    }

    #[inline]
    pub fn stats(&self) -> ViewStats {
        self.stats
    }

    #[inline]
    pub fn game_over(&self) -> bool {
        self.game_over
    }

    #[inline]
    pub fn scoreboard(&self) -> Option<&[PlayerScore]> {
        self.scoreboard.as_deref()
    }

    /// Unclaimed cells of the mirrored grid.
    pub fn vacant_cells(&self) -> Vec<(u16, u16)> {
        let mut vacant = Vec::new();

        for row in 0..self.grid_size {
            for col in 0..self.grid_size {
                if self.grid[row * self.grid_size + col] == 0 {
                    vacant.push((row as u16, col as u16));
                }
            }
        }

        vacant
    }

    /// Number of mirrored cells owned by the player.
    pub fn cells_owned_by(&self, player_id: PlayerId) -> usize {
        self.grid.iter().filter(|&&cell| cell == player_id).count()
    }
}

/// Integer square side of a grid byte length, if it is a perfect square.
fn square_side(len: usize) -> Option<usize> {
    let mut side = 0;
    while side * side < len {
        side += 1;
    }
    if side * side == len && side > 0 {
        Some(side)
    } else {
        None
    }
}
