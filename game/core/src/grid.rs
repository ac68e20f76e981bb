use lattice::message::PlayerScore;
use pulse::PlayerId;

/// The authoritative claim matrix. Cells hold the owning player id with 0
/// meaning unclaimed; a nonzero owner is never reassigned.
pub struct Grid {
    size: usize,
    cells: Vec<PlayerId>,
}

impl Grid {
    pub fn new(size: usize) -> Grid {
        Grid {
            size,
            cells: vec![0; size * size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Owner of the cell, or None when out of bounds.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> Option<PlayerId> {
        if row >= self.size || col >= self.size {
            return None;
        }
        Some(self.cells[row * self.size + col])
    }

    /// Claims the cell for the player. Returns false when the cell is out of
    /// bounds or already owned; a successful claim is final.
    pub fn claim(&mut self, row: usize, col: usize, owner: PlayerId) -> bool {
        debug_assert!(owner != 0, "owner 0 marks an unclaimed cell");

        if row >= self.size || col >= self.size {
            return false;
        }

        let cell = &mut self.cells[row * self.size + col];
        if *cell != 0 {
            return false;
        }

        *cell = owner;
        true
    }

    /// True once every cell has an owner.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|&cell| cell != 0)
    }

    /// Number of cells with an owner.
    pub fn claimed_cells(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell != 0).count()
    }

    /// Row-major owner bytes, exactly as embedded in snapshot frames.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Claimed-cell counts per player, score descending with ascending id as
    /// the tie-break so the result is deterministic.
    pub fn scoreboard(&self) -> Vec<PlayerScore> {
        let mut counts = [0u16; 256];

        for &cell in &self.cells {
            if cell != 0 {
                counts[cell as usize] += 1;
            }
        }

        let mut scores: Vec<PlayerScore> = counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(id, &count)| PlayerScore {
                player_id: id as PlayerId,
                score: count,
            })
            .collect();

        scores.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.player_id.cmp(&b.player_id))
        });

        scores
    }
}
