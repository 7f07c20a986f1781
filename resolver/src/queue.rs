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


//! Event queue with recycled nodes
//!
//! Readiness detection pushes events here; the dispatcher drains a bounded
//! number per loop iteration. Nodes live in a slab and are threaded onto a
//! free-list stack when popped, so a steady stream of events reuses the same
//! storage instead of allocating.

/// FIFO queue backed by a slab of linked nodes.
#[derive(Debug)]
pub struct EventQueue<T> {
    nodes: Vec<Node<T>>,
    head: Option<usize>,
    tail: Option<usize>,
    free: Option<usize>,
    len: usize,
    max_nodes: Option<usize>,
}

#[derive(Debug)]
struct Node<T> {
    item: Option<T>,
    next: Option<usize>,
}

impl<T> EventQueue<T> {
    /// Creates an unbounded queue
    pub fn new() -> Self {
        EventQueue {
            nodes: Vec::new(),
            head: None,
            tail: None,
            free: None,
            len: 0,
            max_nodes: None,
        }
    }

    /// Creates a queue that never allocates more than `max_nodes` nodes.
    /// Pushing beyond that hands the event back to the caller.
    pub fn with_limit(max_nodes: usize) -> Self {
        EventQueue {
            nodes: Vec::with_capacity(max_nodes),
            max_nodes: Some(max_nodes),
            ..EventQueue::new()
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no event is queued
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of nodes ever allocated
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    /// Appends an event at the tail. Returns the event when the node limit
    /// has been reached.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let Some(index) = self.take_node() else {
            return Err(item);
        };
        self.nodes[index] = Node {
            item: Some(item),
            next: None,
        };
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        Ok(())
    }

    /// Removes the event at the head
    pub fn pop(&mut self) -> Option<T> {
        let index = self.head?;
        let node = &mut self.nodes[index];
        let item = node.item.take();
        self.head = node.next;
        if self.head.is_none() {
            self.tail = None;
        }
        // recycle onto the free stack
        node.next = self.free;
        self.free = Some(index);
        self.len -= 1;
        item
    }

    fn take_node(&mut self) -> Option<usize> {
        if let Some(index) = self.free {
            self.free = self.nodes[index].next;
            return Some(index);
        }
        if self.max_nodes.is_some_and(|max| self.nodes.len() >= max) {
            return None;
        }
        self.nodes.push(Node {
            item: None,
            next: None,
        });
        Some(self.nodes.len() - 1)
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        EventQueue::new()
    }
}
