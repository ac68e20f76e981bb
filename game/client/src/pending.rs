use hashbrown::HashMap;

/// One unresolved local claim.
#[derive(Debug, Clone, Copy)]
pub struct PendingClaim {
    pub first_sent_ms: u64,
    pub last_sent_ms: u64,
    pub retries: u32,
}

/// Claims sent but not yet visible in an accepted snapshot. An entry dies
/// when a snapshot shows its cell owned by anyone (the grid is
/// authoritative, winning is not required) or when the retry cap is spent.
pub struct PendingClaims {
    entries: HashMap<(u16, u16), PendingClaim>,
    interval_ms: u64,
    retry_cap: u32,
}

impl PendingClaims {
    pub fn new(interval_ms: u64, retry_cap: u32) -> PendingClaims {
        PendingClaims {
            entries: HashMap::new(),
            interval_ms,
            retry_cap,
        }
    }

    /// Records a fresh local claim. A repeat click on a still-pending cell
    /// leaves the original entry and its retry budget in place.
    pub fn insert(&mut self, cell: (u16, u16), now_ms: u64) {
        self.entries.entry(cell).or_insert(PendingClaim {
            first_sent_ms: now_ms,
            last_sent_ms: now_ms,
            retries: 0,
        });
    }

    /// Cells whose retransmit interval has lapsed, with their send time and
    /// retry count bumped. Entries past the cap are discarded unresolved.
    pub fn due(&mut self, now_ms: u64) -> Vec<(u16, u16)> {
        let interval_ms = self.interval_ms;
        let retry_cap = self.retry_cap;
        let mut due = Vec::new();

        self.entries.retain(|&cell, claim| {
            if now_ms.saturating_sub(claim.last_sent_ms) < interval_ms {
                return true;
            }
            if claim.retries >= retry_cap {
                return false;
            }

            claim.retries += 1;
            claim.last_sent_ms = now_ms;
            due.push(cell);
            true
        });

        due
    }

    /// Drops every entry whose cell the installed grid shows as owned.
    pub fn sweep(&mut self, grid: &[u8], grid_size: usize) {
        self.entries.retain(|&(row, col), _| {
            let index = row as usize * grid_size + col as usize;
            match grid.get(index) {
                Some(&owner) => owner == 0,
                None => false,
            }
        });
    }

    #[inline]
    pub fn contains(&self, cell: (u16, u16)) -> bool {
        self.entries.contains_key(&cell)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
