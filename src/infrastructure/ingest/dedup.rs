use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::domain::events::Dex;

/// Cross-source deduplication of pool events by `(dex, pool_address)`
/// within a sliding window. Both ingest drivers feed the same window.
pub struct DedupWindow {
    window: Duration,
    seen: Mutex<HashMap<(Dex, Pubkey), Instant>>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record a sighting. Returns true when this is the first sighting
    /// within the window (i.e. the event should be forwarded).
    pub async fn first_sighting(&self, dex: Dex, pool: Pubkey) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().await;

        // Drop expired entries before the lookup so the map stays small.
        seen.retain(|_, at| now.duration_since(*at) < self.window);

        match seen.get(&(dex, pool)) {
            Some(_) => false,
            None => {
                seen.insert((dex, pool), now);
                true
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }
}
