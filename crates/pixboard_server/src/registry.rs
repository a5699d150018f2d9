//! Connection registry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique handle of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Many-to-many mapping between identities and connections.
///
/// An identity is any string a connection registers under: an internal
/// user id, a provider account id or a client-chosen correlation token.
/// One connection may hold several identities and one identity may span
/// several connections (multiple tabs).
///
/// A reverse map from connection to identities keeps `unregister`
/// proportional to the identities of that connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_identity: HashMap<String, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<String>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn` under `identity`. Returns false if it already was.
    pub fn register(&mut self, identity: &str, conn: ConnectionId) -> bool {
        let added = self
            .by_identity
            .entry(identity.to_string())
            .or_default()
            .insert(conn);
        self.by_connection
            .entry(conn)
            .or_default()
            .insert(identity.to_string());
        added
    }

    /// Removes `conn` from every identity it was registered under, pruning
    /// identities left without connections. Returns how many identities the
    /// connection held.
    pub fn unregister(&mut self, conn: ConnectionId) -> usize {
        let Some(identities) = self.by_connection.remove(&conn) else {
            return 0;
        };

        for identity in &identities {
            if let Some(conns) = self.by_identity.get_mut(identity) {
                conns.remove(&conn);
                if conns.is_empty() {
                    self.by_identity.remove(identity);
                }
            }
        }
        identities.len()
    }

    /// Returns the connections registered under `identity`, in id order.
    pub fn lookup(&self, identity: &str) -> Vec<ConnectionId> {
        let mut conns: Vec<ConnectionId> = self
            .by_identity
            .get(identity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        conns.sort_unstable();
        conns
    }

    /// Returns every connection matching any of `identities`, each at most
    /// once even when several of its identities match.
    pub fn lookup_any<'a, I>(&self, identities: I) -> Vec<ConnectionId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: BTreeSet<ConnectionId> = identities
            .into_iter()
            .filter_map(|identity| self.by_identity.get(identity))
            .flatten()
            .copied()
            .collect();
        unique.into_iter().collect()
    }

    /// Returns the number of distinct identities with live connections.
    pub fn identity_count(&self) -> usize {
        self.by_identity.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut registry = ConnectionRegistry::new();
        let a = ConnectionId::next();
        let b = ConnectionId::next();

        assert!(registry.register("user-1", a));
        assert!(!registry.register("user-1", a));
        registry.register("user-1", b);

        assert_eq!(registry.lookup("user-1"), vec![a, b]);
        assert!(registry.lookup("nobody").is_empty());
    }

    #[test]
    fn unregister_prunes_empty_identities() {
        let mut registry = ConnectionRegistry::new();
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        registry.register("user-1", a);
        registry.register("discord-1", a);
        registry.register("user-1", b);

        assert_eq!(registry.unregister(a), 2);
        assert_eq!(registry.lookup("user-1"), vec![b]);
        assert!(registry.lookup("discord-1").is_empty());
        assert_eq!(registry.identity_count(), 1);

        assert_eq!(registry.unregister(b), 1);
        assert_eq!(registry.identity_count(), 0);
        assert!(registry.by_connection.is_empty());
        assert_eq!(registry.unregister(b), 0);
    }

    #[test]
    fn lookup_any_deduplicates_aliases() {
        let mut registry = ConnectionRegistry::new();
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        registry.register("user-1", a);
        registry.register("discord-1", a);
        registry.register("token-xyz", a);
        registry.register("discord-1", b);

        let hits = registry.lookup_any(["token-xyz", "discord-1", "user-1"]);
        assert_eq!(hits, vec![a, b]);
    }
}
