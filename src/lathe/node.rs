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

use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::buildable::{Any, Buildable};
use crate::error::SharedFailure;
use crate::future::Future;
use crate::stamp::{BuildDependency, BuildStamp};

/// How a finished build reached its result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildStatus {
    /// The action ran and produced a fresh stamp.
    Built,

    /// Every recorded stamp matched; nothing ran.
    UpToDate,

    /// The node was mid-rebuild further up the caller chain; the result
    /// carries its touch stamp instead of recursing into it.
    Touched,
}

/// What a resolved build future carries.
#[derive(Clone, Debug)]
pub struct BuildResult {
    pub alias: Alias,
    pub stamp: BuildStamp,
    pub status: BuildStatus,
}

/// Per-session timing for one node. Exclusive time excludes every wait on a
/// child build; inclusive time is wall-clock for the whole execution.
#[derive(Clone, Debug, Default)]
pub struct BuildStats {
    pub inclusive: Duration,
    pub exclusive: Duration,
    pub annotations: Vec<String>,
}

/// The persistent part of a node. Everything here survives a process
/// restart; the transient lock, stats, and in-flight future do not.
#[derive(Serialize, Deserialize, Clone)]
pub struct NodeRecord {
    pub alias: Alias,
    pub buildable: Any,
    pub stamp: BuildStamp,
    pub static_deps: Vec<BuildDependency>,
    pub dynamic_deps: Vec<BuildDependency>,
    pub output_files: Vec<BuildDependency>,
    pub output_nodes: Vec<Alias>,
}

/// The mutable interior of a node, guarded by the node's RW-mutex.
pub struct NodeInner {
    pub buildable: Any,
    pub stamp: BuildStamp,
    pub static_deps: Vec<BuildDependency>,
    pub dynamic_deps: Vec<BuildDependency>,
    pub output_files: Vec<BuildDependency>,
    pub output_nodes: Vec<Alias>,
}

impl NodeInner {
    /// `true` iff the node has an edge of any flavor. A node with no edges
    /// at all always rebuilds.
    pub fn has_edges(&self) -> bool {
        !self.static_deps.is_empty()
            || !self.dynamic_deps.is_empty()
            || !self.output_files.is_empty()
            || !self.output_nodes.is_empty()
    }

    /// An alias may appear in at most one edge vector, and never the
    /// node's own.
    fn debug_assert_new_edge(&self, own: &Alias, alias: &Alias) {
        debug_assert!(alias != own, "node '{}' cannot depend on itself", own);
        debug_assert!(
            !self.static_deps.iter().any(|d| d.alias == *alias)
                && !self.dynamic_deps.iter().any(|d| d.alias == *alias)
                && !self.output_files.iter().any(|d| d.alias == *alias)
                && !self.output_nodes.contains(alias),
            "alias '{}' already recorded on node '{}'",
            alias,
            own
        );
    }

    pub fn record_dynamic(&mut self, own: &Alias, dep: BuildDependency) {
        // Re-observing the same dynamic dependency within one build just
        // refreshes the stamp.
        if let Some(existing) = self
            .dynamic_deps
            .iter_mut()
            .find(|d| d.alias == dep.alias)
        {
            existing.stamp = dep.stamp;
            return;
        }

        self.debug_assert_new_edge(own, &dep.alias);
        self.dynamic_deps.push(dep);
    }

    pub fn record_output_file(&mut self, own: &Alias, dep: BuildDependency) {
        if let Some(existing) = self
            .output_files
            .iter_mut()
            .find(|d| d.alias == dep.alias)
        {
            existing.stamp = dep.stamp;
            return;
        }

        self.debug_assert_new_edge(own, &dep.alias);
        self.output_files.push(dep);
    }

    pub fn record_output_node(&mut self, own: &Alias, alias: Alias) {
        if self.output_nodes.contains(&alias) {
            return;
        }

        self.debug_assert_new_edge(own, &alias);
        self.output_nodes.push(alias);
    }

    /// Zeroes every recorded edge stamp. The node is dirty until its next
    /// successful build re-observes the neighbors.
    pub fn invalidate_edges(&mut self) {
        for dep in self
            .static_deps
            .iter_mut()
            .chain(self.dynamic_deps.iter_mut())
            .chain(self.output_files.iter_mut())
        {
            dep.stamp = BuildStamp::invalid();
        }
    }
}

/// A store entry: the unit of work. State machine per build session:
/// Resident (no in-flight future) -> Pending (future stored) ->
/// Completed (future resolved). A completed handle short-circuits repeat
/// requests unless `force` replaces it.
pub struct Node {
    alias: Alias,
    inner: RwLock<NodeInner>,
    flight: Mutex<Option<Future<BuildResult>>>,
    stats: Mutex<Option<BuildStats>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("alias", &self.alias).finish()
    }
}

impl Node {
    pub fn new(buildable: Any, static_deps: Vec<Alias>) -> Node {
        let alias = buildable.alias();

        Node {
            alias,
            inner: RwLock::new(NodeInner {
                buildable,
                stamp: BuildStamp::invalid(),
                static_deps: static_deps
                    .into_iter()
                    .map(BuildDependency::unstamped)
                    .collect(),
                dynamic_deps: Vec::new(),
                output_files: Vec::new(),
                output_nodes: Vec::new(),
            }),
            flight: Mutex::new(None),
            stats: Mutex::new(None),
        }
    }

    pub fn from_record(record: NodeRecord) -> Node {
        Node {
            alias: record.alias,
            inner: RwLock::new(NodeInner {
                buildable: record.buildable,
                stamp: record.stamp,
                static_deps: record.static_deps,
                dynamic_deps: record.dynamic_deps,
                output_files: record.output_files,
                output_nodes: record.output_nodes,
            }),
            flight: Mutex::new(None),
            stats: Mutex::new(None),
        }
    }

    pub fn to_record(&self) -> NodeRecord {
        let inner = self.inner.read();

        NodeRecord {
            alias: self.alias.clone(),
            buildable: inner.buildable.clone(),
            stamp: inner.stamp.clone(),
            static_deps: inner.static_deps.clone(),
            dynamic_deps: inner.dynamic_deps.clone(),
            output_files: inner.output_files.clone(),
            output_nodes: inner.output_nodes.clone(),
        }
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    pub fn read(&self) -> RwLockReadGuard<'_, NodeInner> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, NodeInner> {
        self.inner.write()
    }

    pub fn buildable(&self) -> Any {
        self.inner.read().buildable.clone()
    }

    pub fn stamp(&self) -> BuildStamp {
        self.inner.read().stamp.clone()
    }

    pub fn static_dependencies(&self) -> Vec<BuildDependency> {
        self.inner.read().static_deps.clone()
    }

    pub fn dynamic_dependencies(&self) -> Vec<BuildDependency> {
        self.inner.read().dynamic_deps.clone()
    }

    pub fn output_file_dependencies(&self) -> Vec<BuildDependency> {
        self.inner.read().output_files.clone()
    }

    pub fn output_node_aliases(&self) -> Vec<Alias> {
        self.inner.read().output_nodes.clone()
    }

    /// Stores the in-flight future for this node, or short-circuits to an
    /// existing one. Returns the future and whether it is fresh (and so
    /// still needs to be scheduled). A pending future is never replaced,
    /// even with `force`; that is the at-most-one-build guarantee.
    pub(crate) fn launch<F>(
        &self,
        force: bool,
        work: F,
    ) -> (Future<BuildResult>, bool)
    where
        F: FnOnce() -> Result<BuildResult, SharedFailure> + Send + 'static,
    {
        let mut flight = self.flight.lock();

        if let Some(future) = &*flight {
            match future.peek() {
                // Pending; share it.
                None => return (future.clone(), false),
                // Completed; short-circuit unless forced.
                Some(_) if !force => return (future.clone(), false),
                Some(_) => {}
            }
        }

        let future = Future::deferred(work);
        *flight = Some(future.clone());
        (future, true)
    }

    /// Drops a completed in-flight handle so the next request re-evaluates
    /// the node. Called when `create` actually changes the node and at the
    /// end of a write-port session.
    pub(crate) fn reset_flight(&self) {
        let mut flight = self.flight.lock();

        let completed = match &*flight {
            Some(future) => future.peek().is_some(),
            None => false,
        };

        if completed {
            *flight = None;
        }
    }

    pub(crate) fn set_stats(&self, stats: BuildStats) {
        *self.stats.lock() = Some(stats);
    }

    pub(crate) fn clear_stats(&self) {
        *self.stats.lock() = None;
    }

    /// Timing of the last execution in this session, if the node ran.
    pub fn build_stats(&self) -> Option<BuildStats> {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildable::Group;

    fn group(name: &str) -> Any {
        Group::new(name, Vec::new()).into()
    }

    #[test]
    fn launch_shares_pending_future() {
        let node = Node::new(group("a"), Vec::new());

        let (f1, fresh1) = node.launch(false, || {
            Ok(BuildResult {
                alias: Alias::new("group", "a").unwrap(),
                stamp: BuildStamp::invalid(),
                status: BuildStatus::Built,
            })
        });
        assert!(fresh1);

        let (f2, fresh2) = node.launch(false, || unreachable!());
        assert!(!fresh2);

        f1.run();
        assert!(f2.peek().is_some());
    }

    #[test]
    fn force_replaces_completed_future() {
        let node = Node::new(group("a"), Vec::new());
        let alias = Alias::new("group", "a").unwrap();

        let result = BuildResult {
            alias: alias.clone(),
            stamp: BuildStamp::invalid(),
            status: BuildStatus::Built,
        };

        let (f1, _) = node.launch(false, {
            let result = result.clone();
            move || Ok(result)
        });
        f1.run();

        // Not forced: the completed handle short-circuits.
        let (_, fresh) = node.launch(false, || unreachable!());
        assert!(!fresh);

        // Forced: a fresh future replaces the completed one.
        let (_, fresh) = node.launch(true, move || Ok(result));
        assert!(fresh);
    }

    #[test]
    fn invalidate_edges_zeroes_stamps() {
        let node = Node::new(
            group("a"),
            vec![Alias::new("file", "x").unwrap()],
        );

        {
            let mut inner = node.write();
            inner.static_deps[0].stamp = BuildStamp::new(
                chrono::Utc::now(),
                crate::fingerprint::of(&"x").unwrap(),
            );
            inner.invalidate_edges();
            assert!(!inner.static_deps[0].stamp.is_valid());
        }
    }
}
