//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Snoop relation between connections
//!
//! A single map from watcher to target is the only stored state; who watches
//! a given connection is derived from it. Each connection watches at most one
//! target and is watched by at most one watcher.

use crate::ConnectionId;
use std::collections::HashMap;

/// Watcher to target map
#[derive(Debug, Default)]
pub struct SnoopMap {
    targets: HashMap<ConnectionId, ConnectionId>,
}

impl SnoopMap {
    /// Creates an empty relation
    pub fn new() -> Self {
        SnoopMap::default()
    }

    /// Number of active snoops
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether nobody is snooping
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The connection `watcher` is snooping on
    pub fn target_of(&self, watcher: ConnectionId) -> Option<ConnectionId> {
        self.targets.get(&watcher).copied()
    }

    /// The connection snooping on `target`
    pub fn watcher_of(&self, target: ConnectionId) -> Option<ConnectionId> {
        self.targets
            .iter()
            .find_map(|(&watcher, &watched)| (watched == target).then_some(watcher))
    }

    /// Whether following targets from `target` leads back to `watcher`
    pub fn would_loop(&self, watcher: ConnectionId, target: ConnectionId) -> bool {
        let mut current = Some(target);
        // The relation is acyclic, so a chain visits each connection once
        for _ in 0..=self.targets.len() {
            match current {
                Some(id) if id == watcher => return true,
                Some(id) => current = self.target_of(id),
                None => return false,
            }
        }
        true
    }

    /// Makes `watcher` snoop `target`, replacing any snoop either side was in.
    ///
    /// Returns `false`, changing nothing, when the link would form a loop.
    pub fn link(&mut self, watcher: ConnectionId, target: ConnectionId) -> bool {
        if self.would_loop(watcher, target) {
            return false;
        }
        if let Some(previous) = self.watcher_of(target) {
            self.targets.remove(&previous);
        }
        self.targets.insert(watcher, target);
        true
    }

    /// Stops `watcher` snooping. Returns the target it was watching.
    pub fn unlink(&mut self, watcher: ConnectionId) -> Option<ConnectionId> {
        self.targets.remove(&watcher)
    }

    /// Drops every link `id` takes part in, on either side
    pub fn remove(&mut self, id: ConnectionId) {
        self.targets.remove(&id);
        self.targets.retain(|_, target| *target != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(slot: usize) -> ConnectionId {
        ConnectionId::new(slot, 1)
    }

    #[test]
    fn test_link_and_queries() {
        let mut snoop = SnoopMap::new();
        assert!(snoop.link(id(1), id(2)));

        assert_eq!(snoop.target_of(id(1)), Some(id(2)));
        assert_eq!(snoop.watcher_of(id(2)), Some(id(1)));
        assert_eq!(snoop.watcher_of(id(1)), None);
    }

    #[test]
    fn test_self_snoop_refused() {
        let mut snoop = SnoopMap::new();
        assert!(!snoop.link(id(1), id(1)));
        assert!(snoop.is_empty());
    }

    #[test]
    fn test_loops_refused() {
        let mut snoop = SnoopMap::new();
        assert!(snoop.link(id(1), id(2)));
        assert!(snoop.link(id(2), id(3)));

        assert!(!snoop.link(id(2), id(1)));
        assert!(!snoop.link(id(3), id(1)));
        assert_eq!(snoop.len(), 2);
    }

    #[test]
    fn test_relink_replaces_both_sides() {
        let mut snoop = SnoopMap::new();
        assert!(snoop.link(id(1), id(2)));

        // 1 moves to a new target
        assert!(snoop.link(id(1), id(3)));
        assert_eq!(snoop.watcher_of(id(2)), None);

        // 4 takes over watching 3 from 1
        assert!(snoop.link(id(4), id(3)));
        assert_eq!(snoop.target_of(id(1)), None);
        assert_eq!(snoop.watcher_of(id(3)), Some(id(4)));
    }

    #[test]
    fn test_remove_clears_both_directions() {
        let mut snoop = SnoopMap::new();
        snoop.link(id(1), id(2));
        snoop.link(id(2), id(3));

        snoop.remove(id(2));
        assert!(snoop.is_empty());
    }

    #[test]
    fn test_unlink() {
        let mut snoop = SnoopMap::new();
        snoop.link(id(1), id(2));
        assert_eq!(snoop.unlink(id(1)), Some(id(2)));
        assert_eq!(snoop.unlink(id(1)), None);
    }
}
