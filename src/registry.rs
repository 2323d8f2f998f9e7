//! C9: the in-memory set of leaderboard-eligible users (spec §4.9).

use crate::address::Address;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Process-wide registered-user set. Reads take a shared lock; mutation a
/// short exclusive one — never held across an `.await` (spec §5).
pub struct Registry {
    users: RwLock<BTreeSet<Address>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(BTreeSet::new()),
        }
    }

    /// Returns `true` if `addr` was newly inserted (spec §4.9).
    pub fn register(&self, addr: Address) -> bool {
        self.users.write().insert(addr)
    }

    /// Returns `true` if `addr` was present and removed.
    pub fn unregister(&self, addr: &Address) -> bool {
        self.users.write().remove(addr)
    }

    pub fn list(&self) -> Vec<Address> {
        self.users.read().iter().cloned().collect()
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.users.read().contains(addr)
    }
}
