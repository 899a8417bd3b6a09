// feed-server/src/replay.rs
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Remembers token ids that have already been presented, until the token
/// they belong to expires.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    // token id -> expiry (Unix seconds)
    seen: DashMap<String, i64>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token_id` as used. Returns false if it is already recorded and
    /// its token has not expired yet.
    ///
    /// The check and the insert happen under the same shard lock, so two
    /// concurrent handshakes with the same token cannot both succeed.
    pub fn try_register(&self, token_id: &str, expires_at: i64, now: i64) -> bool {
        match self.seen.entry(token_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() < now {
                    // Stale entry the sweeper has not reached yet
                    entry.insert(expires_at);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        }
    }

    /// Whether `token_id` is recorded and still live. Expired entries are
    /// dropped on the way.
    pub fn contains(&self, token_id: &str, now: i64) -> bool {
        let live = match self.seen.get(token_id) {
            Some(expires_at) => *expires_at >= now,
            None => return false,
        };
        if !live {
            self.seen.remove_if(token_id, |_, expires_at| *expires_at < now);
        }
        live
    }

    /// Drop every entry whose token has expired. Returns how many were removed.
    pub fn sweep(&self, now: i64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at >= now);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
