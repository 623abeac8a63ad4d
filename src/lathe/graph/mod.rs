// Copyright (c) 2019 The lathe developers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

mod query;

pub use self::query::ChainLink;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use failure::format_err;
use parking_lot::{Condvar, Mutex};

use crate::alias::Alias;
use crate::buildable::{Any, Buildable};
use crate::error::{CorruptDatabase, Error, NotFound};
use crate::events::Broadcast;
use crate::node::{Node, NodeRecord};

/// The reader-writer gate for ports. Many read ports may coexist; a write
/// port is exclusive against everything else.
#[derive(Default)]
pub(crate) struct Gate {
    state: Mutex<GateState>,
    cvar: Condvar,
}

#[derive(Default)]
struct GateState {
    readers: usize,
    writer: bool,
}

impl Gate {
    pub fn acquire_read(&self) {
        let mut state = self.state.lock();

        while state.writer {
            self.cvar.wait(&mut state);
        }

        state.readers += 1;
    }

    pub fn release_read(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;

        if state.readers == 0 {
            self.cvar.notify_all();
        }
    }

    /// Acquires the write side, failing instead of blocking when another
    /// write port is already open. Waits for readers to drain.
    pub fn try_acquire_write(&self) -> bool {
        let mut state = self.state.lock();

        if state.writer {
            return false;
        }

        while state.readers > 0 {
            self.cvar.wait(&mut state);
        }

        state.writer = true;
        true
    }

    pub fn release_write(&self) {
        let mut state = self.state.lock();
        state.writer = false;
        self.cvar.notify_all();
    }
}

/// The process-wide store mapping aliases to nodes.
///
/// Node lookup and insertion go through a sharded concurrent map sized to
/// the hardware concurrency of the host, so node construction on many
/// threads does not serialize on one lock.
pub struct Graph {
    nodes: DashMap<Alias, Arc<Node>>,

    /// Set whenever in-memory state diverges from disk. Saving is skipped
    /// while this is clear.
    dirty: AtomicBool,

    /// Set when a build action panicked. The graph may be half-consistent,
    /// so saving is suppressed for the rest of the process.
    poisoned: AtomicBool,

    /// Bumped on every mutation; cheap to compare for observers.
    revision: AtomicUsize,

    pub(crate) events: Broadcast,
    pub(crate) gate: Gate,
}

impl Default for Graph {
    fn default() -> Graph {
        Graph::new()
    }
}

impl Graph {
    pub fn new() -> Graph {
        let shards = (num_cpus::get() * 4).next_power_of_two();

        Graph {
            nodes: DashMap::with_shard_amount(shards),
            dirty: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
            revision: AtomicUsize::new(0),
            events: Broadcast::new(),
            gate: Gate::default(),
        }
    }

    /// Subscribes to graph and node lifecycle events.
    pub fn subscribe(
        &self,
    ) -> std::sync::mpsc::Receiver<
        crate::events::Timestamped<crate::events::Event>,
    > {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All aliases in the graph, sorted.
    pub fn aliases(&self) -> Vec<Alias> {
        let mut aliases: Vec<_> =
            self.nodes.iter().map(|e| e.key().clone()).collect();
        aliases.sort();
        aliases
    }

    /// Iterates (alias, node) pairs in shard order. The callback may return
    /// an error to short-circuit the iteration.
    pub fn range<F>(&self, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&Alias, &Arc<Node>) -> Result<(), Error>,
    {
        for entry in self.nodes.iter() {
            f(entry.key(), entry.value())?;
        }

        Ok(())
    }

    pub fn find(&self, alias: &Alias) -> Option<Arc<Node>> {
        self.nodes.get(alias).map(|e| e.value().clone())
    }

    /// Like `find`, but a missing node is an error.
    pub fn expect(&self, alias: &Alias) -> Result<Arc<Node>, Error> {
        self.find(alias).ok_or_else(|| {
            NotFound {
                alias: alias.clone(),
            }
            .into()
        })
    }

    /// Registers or updates a node.
    ///
    /// Re-creation with an identical payload shape and static dependency
    /// list is a no-op and returns the existing node. Anything else
    /// replaces the payload, re-seeds the static edges, zeroes the stamp,
    /// and marks the graph dirty. Returns the node and whether the graph
    /// changed.
    pub fn create(
        &self,
        buildable: Any,
        static_deps: Vec<Alias>,
    ) -> Result<(Arc<Node>, bool), Error> {
        let alias = buildable.alias();

        if !alias.is_valid() {
            return Err(format_err!("buildable has an invalid alias"));
        }

        // Order is significant, so dedup by first occurrence.
        let mut deduped = Vec::with_capacity(static_deps.len());
        for dep in static_deps {
            if !deduped.contains(&dep) {
                deduped.push(dep);
            }
        }
        let static_deps = deduped;

        if static_deps.contains(&alias) {
            return Err(format_err!(
                "node '{}' cannot statically depend on itself",
                alias
            ));
        }

        let shape = buildable.shape_fingerprint()?;

        if let Some(node) = self.find(&alias) {
            let mut inner = node.write();

            let same_shape =
                inner.buildable.shape_fingerprint()? == shape;
            let same_deps = inner.static_deps.len() == static_deps.len()
                && inner
                    .static_deps
                    .iter()
                    .zip(static_deps.iter())
                    .all(|(d, a)| d.alias == *a);

            if same_shape && same_deps {
                return Ok((node.clone(), false));
            }

            // The node changed shape. Preserve the stamps of static edges
            // that survived; everything else starts unobserved.
            let old = std::mem::replace(&mut inner.static_deps, Vec::new());

            inner.static_deps = static_deps
                .into_iter()
                .map(|dep_alias| {
                    old.iter()
                        .find(|d| d.alias == dep_alias)
                        .cloned()
                        .unwrap_or_else(|| {
                            crate::stamp::BuildDependency::unstamped(
                                dep_alias,
                            )
                        })
                })
                .collect();

            inner.buildable = buildable;
            inner.stamp = crate::stamp::BuildStamp::invalid();

            drop(inner);

            node.reset_flight();
            self.mark_dirty();

            return Ok((node, true));
        }

        let node = Arc::new(Node::new(buildable, static_deps));

        // Another thread may have raced us here; the entry API makes the
        // insertion atomic and keeps whichever node landed first.
        let node = self
            .nodes
            .entry(alias)
            .or_insert(node)
            .value()
            .clone();

        self.mark_dirty();
        Ok((node, true))
    }

    /// Empties the graph. The next save writes an empty node table.
    pub fn purge(&self) {
        self.nodes.clear();
        self.mark_dirty();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn revision(&self) -> usize {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub(crate) fn record_panic(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    /// Snapshots every node, sorted by alias. This is the deterministic
    /// serialized form of the graph.
    pub fn freeze(&self) -> Vec<NodeRecord> {
        let mut records: Vec<_> =
            self.nodes.iter().map(|e| e.value().to_record()).collect();
        records.sort_by(|a, b| a.alias.cmp(&b.alias));
        records
    }

    /// Rebuilds a graph from its serialized form. The loaded graph starts
    /// clean: nothing has diverged from disk yet.
    pub fn thaw(records: Vec<NodeRecord>) -> Result<Graph, Error> {
        let graph = Graph::new();

        for record in records {
            if !record.alias.is_valid() {
                return Err(CorruptDatabase {
                    reason: format!(
                        "node record has invalid alias '{}'",
                        record.alias
                    ),
                }
                .into());
            }

            if record.buildable.alias() != record.alias {
                return Err(CorruptDatabase {
                    reason: format!(
                        "alias '{}' does not match its payload",
                        record.alias
                    ),
                }
                .into());
            }

            let alias = record.alias.clone();

            if graph
                .nodes
                .insert(alias.clone(), Arc::new(Node::from_record(record)))
                .is_some()
            {
                return Err(CorruptDatabase {
                    reason: format!("duplicate node '{}'", alias),
                }
                .into());
            }
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildable::Group;

    fn group(name: &str, members: Vec<Alias>) -> Any {
        Group::new(name, members).into()
    }

    #[test]
    fn create_is_idempotent() {
        let graph = Graph::new();

        let (a, changed) =
            graph.create(group("all", Vec::new()), Vec::new()).unwrap();
        assert!(changed);
        assert!(graph.is_dirty());

        graph.clear_dirty();

        let (b, changed) =
            graph.create(group("all", Vec::new()), Vec::new()).unwrap();
        assert!(!changed);
        assert!(!graph.is_dirty());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn create_with_new_shape_dirties() {
        let graph = Graph::new();
        let dep = Alias::new("file", "x").unwrap();

        graph.create(group("all", Vec::new()), Vec::new()).unwrap();
        graph.clear_dirty();

        let (_, changed) = graph
            .create(group("all", vec![dep.clone()]), Vec::new())
            .unwrap();
        assert!(changed);
        assert!(graph.is_dirty());
    }

    #[test]
    fn create_rejects_self_dependency() {
        let graph = Graph::new();
        let own = Alias::new("group", "all").unwrap();

        assert!(graph
            .create(group("all", Vec::new()), vec![own])
            .is_err());
    }

    #[test]
    fn aliases_are_sorted() {
        let graph = Graph::new();

        for name in &["zeta", "alpha", "mid"] {
            graph.create(group(name, Vec::new()), Vec::new()).unwrap();
        }

        let aliases = graph.aliases();
        let mut sorted = aliases.clone();
        sorted.sort();
        assert_eq!(aliases, sorted);
        assert_eq!(aliases.len(), 3);
    }

    #[test]
    fn expect_missing_is_not_found() {
        let graph = Graph::new();
        let missing = Alias::new("group", "nope").unwrap();

        let err = graph.expect(&missing).unwrap_err();
        assert!(err.downcast_ref::<NotFound>().is_some());
    }

    #[test]
    fn freeze_thaw_roundtrip() {
        let graph = Graph::new();
        let dep = Alias::new("file", "x").unwrap();

        graph
            .create(group("all", vec![dep.clone()]), vec![dep])
            .unwrap();
        graph.create(group("other", Vec::new()), Vec::new()).unwrap();

        let records = graph.freeze();
        let thawed = Graph::thaw(records.clone()).unwrap();

        assert_eq!(thawed.aliases(), graph.aliases());
        assert_eq!(
            bincode::serialize(&thawed.freeze()).unwrap(),
            bincode::serialize(&records).unwrap()
        );
        assert!(!thawed.is_dirty());
    }

    #[test]
    fn gate_excludes_two_writers() {
        let gate = Gate::default();
        assert!(gate.try_acquire_write());
        assert!(!gate.try_acquire_write());
        gate.release_write();
        assert!(gate.try_acquire_write());
        gate.release_write();
    }
}
