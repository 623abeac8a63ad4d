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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::alias::Alias;
use crate::buildable::Any;
use crate::engine;
use crate::error::{
    Aborted, CycleError, Error, NotFound, SharedFailure,
};
use crate::events::{Event, Timestamped};
use crate::factory::{self, Factory};
use crate::future::Future;
use crate::graph::Graph;
use crate::node::{BuildResult, BuildStats, BuildStatus, Node};
use crate::options::{BuildOptions, MAX_CALLER_DEPTH};
use crate::pool::{self, Pool};

/// The write port's cancellation cause. Set once by any thread; observed by
/// every in-flight action at its suspension points.
pub(crate) struct Cancel {
    cause: Mutex<Option<SharedFailure>>,
    cvar: Condvar,
}

impl Cancel {
    fn new() -> Cancel {
        Cancel {
            cause: Mutex::new(None),
            cvar: Condvar::new(),
        }
    }

    /// Records the cause. The first one wins; later calls are ignored.
    pub fn set(&self, err: Error) {
        let mut cause = self.cause.lock();

        if cause.is_none() {
            *cause = Some(SharedFailure::new(err));
            self.cvar.notify_all();
        }
    }

    pub fn get(&self) -> Option<SharedFailure> {
        self.cause.lock().clone()
    }

    /// Fails with `Aborted` when the port has been cancelled.
    pub fn check(&self) -> Result<(), Error> {
        match self.get() {
            Some(cause) => Err(Aborted { cause }.into()),
            None => Ok(()),
        }
    }

    /// Sleeps for the given duration, waking early (with the cause) when
    /// the port is cancelled.
    pub fn sleep(&self, timeout: Duration) -> Option<SharedFailure> {
        let mut cause = self.cause.lock();

        if cause.is_some() {
            return cause.clone();
        }

        let _ = self.cvar.wait_for(&mut cause, timeout);
        cause.clone()
    }
}

/// The shared state of one write-port session. Every scheduled build holds
/// onto it; the port itself is just the user-facing handle.
pub(crate) struct Session {
    pub graph: Arc<Graph>,
    pub pool: Pool,
    pub cancel: Cancel,

    /// Every future scheduled this session, for `join` to drain.
    inflight: Mutex<Vec<Future<BuildResult>>>,

    /// The number of nodes that failed this session.
    failures: AtomicUsize,
}

impl Session {
    /// Schedules a build of the given alias and returns its future.
    ///
    /// Everything that can short-circuit does so here, before any future is
    /// stored on the node: touch stamps for in-flight callers, cycle
    /// detection over the caller chain, cancellation, and missing nodes.
    pub fn schedule(
        self: &Arc<Session>,
        alias: &Alias,
        opts: &BuildOptions,
    ) -> Future<BuildResult> {
        // The alias is mid-rebuild further up the chain: report the stamp
        // it told us to compare against rather than recursing into it.
        if let Some(stamp) = opts.touch_of(alias) {
            return Future::done(Ok(BuildResult {
                alias: alias.clone(),
                stamp,
                status: BuildStatus::Touched,
            }));
        }

        if opts.is_caller(alias) || opts.depth() > MAX_CALLER_DEPTH {
            return Future::done(Err(SharedFailure::new(
                CycleError {
                    chain: opts.chain_to(alias),
                }
                .into(),
            )));
        }

        if let Some(cause) = self.cancel.get() {
            return Future::done(Err(SharedFailure::new(
                Aborted { cause }.into(),
            )));
        }

        let node = match self.graph.find(alias) {
            Some(node) => node,
            None => {
                return Future::done(Err(SharedFailure::new(
                    NotFound {
                        alias: alias.clone(),
                    }
                    .into(),
                )));
            }
        };

        let (future, fresh) = {
            let session = self.clone();
            let work_node = node.clone();
            let opts = opts.clone();

            node.launch(opts.force, move || {
                match engine::execute(&session, &work_node, &opts) {
                    Ok(result) => Ok(result),
                    Err(err) => {
                        session.failures.fetch_add(1, Ordering::SeqCst);
                        Err(SharedFailure::new(err))
                    }
                }
            })
        };

        if fresh {
            self.inflight.lock().push(future.clone());

            let runner = future.clone();
            self.pool.spawn(move || runner.run());
        }

        future
    }

    /// Schedules a set of builds. Results come back in argument order when
    /// the futures are joined.
    pub fn schedule_many(
        self: &Arc<Session>,
        aliases: &[Alias],
        opts: &BuildOptions,
    ) -> Vec<Future<BuildResult>> {
        aliases
            .iter()
            .map(|alias| self.schedule(alias, opts))
            .collect()
    }

    /// Blocks until no scheduled future is unresolved. Builds may schedule
    /// more builds, so this drains in rounds until a round comes up empty.
    pub fn join(&self) -> Result<(), Error> {
        let mut first_err: Option<SharedFailure> = None;

        loop {
            let batch: Vec<_> =
                std::mem::replace(&mut *self.inflight.lock(), Vec::new());

            if batch.is_empty() {
                break;
            }

            for future in batch {
                if let Err(err) = future.join() {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Options for opening a write port.
#[derive(Clone, Debug)]
pub struct PortOptions {
    /// Worker thread count. Zero runs every build on the joining thread,
    /// which is deterministic and useful for debugging.
    pub threads: usize,
}

impl Default for PortOptions {
    fn default() -> PortOptions {
        PortOptions {
            threads: pool::default_threads(),
        }
    }
}

/// An exclusive session for mutating the graph and launching builds. Only
/// one write port may be open at a time; opening it excludes read ports for
/// the duration.
pub struct WritePort {
    session: Arc<Session>,
}

impl Graph {
    /// Opens a shared read port.
    pub fn read_port(self: &Arc<Graph>) -> ReadPort {
        self.gate.acquire_read();

        ReadPort {
            graph: self.clone(),
        }
    }

    /// Opens the exclusive write port. Fails when another write port is
    /// already open.
    pub fn write_port(
        self: &Arc<Graph>,
        options: PortOptions,
    ) -> Result<WritePort, Error> {
        if !self.gate.try_acquire_write() {
            return Err(failure::format_err!(
                "a write port is already open on this graph"
            ));
        }

        self.events.send(Event::BeginGraph {
            threads: options.threads,
        });

        Ok(WritePort {
            session: Arc::new(Session {
                graph: self.clone(),
                pool: Pool::new(options.threads),
                cancel: Cancel::new(),
                inflight: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(0),
            }),
        })
    }
}

impl WritePort {
    pub fn graph(&self) -> &Arc<Graph> {
        &self.session.graph
    }

    /// Registers or updates a node. See `Graph::create`.
    pub fn create(
        &self,
        buildable: Any,
        static_deps: Vec<Alias>,
    ) -> Result<Arc<Node>, Error> {
        let (node, _) = self.session.graph.create(buildable, static_deps)?;
        Ok(node)
    }

    /// Runs a factory and registers the node it describes, with whatever
    /// static dependencies the factory declared through its initializer.
    pub fn create_with(
        &self,
        factory: &dyn Factory,
    ) -> Result<Arc<Node>, Error> {
        factory::create_node(&self.session, factory, Vec::new())
    }

    /// Schedules a build of an existing node.
    pub fn build(
        &self,
        alias: &Alias,
        opts: &BuildOptions,
    ) -> Future<BuildResult> {
        self.session.schedule(alias, opts)
    }

    /// Schedules a set of builds; futures are returned in argument order.
    pub fn build_many(
        &self,
        aliases: &[Alias],
        opts: &BuildOptions,
    ) -> Vec<Future<BuildResult>> {
        self.session.schedule_many(aliases, opts)
    }

    /// Sets the session's cancellation cause. Every in-flight build that
    /// observes it fails with `Aborted`; already-finished builds are
    /// unaffected.
    pub fn cancel(&self, err: Error) {
        self.session.cancel.set(err);
    }

    /// Like `cancel`, for non-recoverable errors (stop-on-error). The
    /// distinction is in intent only; both set the same cause.
    pub fn abort(&self, err: Error) {
        self.session.cancel.set(err);
    }

    /// Blocks until all scheduled work completes, returning the first
    /// failure if there was one.
    pub fn join(&self) -> Result<(), Error> {
        self.session.join()
    }

    /// Subscribes to the graph's event stream.
    pub fn subscribe(&self) -> mpsc::Receiver<Timestamped<Event>> {
        self.session.graph.events.subscribe()
    }

    /// Per-node timing recorded this session, sorted by descending
    /// exclusive time.
    pub fn summary(&self) -> Vec<(Alias, BuildStats)> {
        let mut stats = Vec::new();

        let _ = self.session.graph.range(|alias, node| {
            if let Some(s) = node.build_stats() {
                stats.push((alias.clone(), s));
            }

            Ok(())
        });

        stats.sort_by(|a, b| b.1.exclusive.cmp(&a.1.exclusive));
        stats
    }
}

impl Drop for WritePort {
    fn drop(&mut self) {
        // Drain everything still in flight so no queued closure outlives
        // the session.
        let _ = self.session.join();

        self.session.graph.events.send(Event::EndGraph {
            failures: self.session.failures(),
        });

        // Completed futures and timing are session state; the next session
        // starts from Resident with a clean slate.
        let _ = self.session.graph.range(|_, node| {
            node.reset_flight();
            node.clear_stats();
            Ok(())
        });

        self.session.graph.gate.release_write();
    }
}

/// A shared, read-only view of the graph: listing, traversal, and queries.
pub struct ReadPort {
    graph: Arc<Graph>,
}

impl ReadPort {
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn aliases(&self) -> Vec<Alias> {
        self.graph.aliases()
    }

    pub fn expect(&self, alias: &Alias) -> Result<Arc<Node>, Error> {
        self.graph.expect(alias)
    }

    pub fn range<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnMut(&Alias, &Arc<Node>) -> Result<(), Error>,
    {
        self.graph.range(f)
    }

    pub fn dependency_chain(
        &self,
        src: &Alias,
        dst: &Alias,
    ) -> Result<Vec<crate::graph::ChainLink>, Error> {
        self.graph.dependency_chain(src, dst, |_| 1)
    }

    pub fn dependency_input_files<'a, I>(
        &self,
        recursive: bool,
        roots: I,
    ) -> Result<Vec<std::path::PathBuf>, Error>
    where
        I: IntoIterator<Item = &'a Alias>,
    {
        self.graph.dependency_input_files(recursive, roots)
    }

    pub fn dependency_output_files<'a, I>(
        &self,
        roots: I,
    ) -> Result<Vec<std::path::PathBuf>, Error>
    where
        I: IntoIterator<Item = &'a Alias>,
    {
        self.graph.dependency_output_files(roots)
    }
}

impl Drop for ReadPort {
    fn drop(&mut self) {
        self.graph.gate.release_read();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use failure::format_err;

    use crate::buildable::{
        self, Buildable, Custom, Group, SourceFile, WriteFile,
    };
    use crate::error::{BuildError, CycleError, DependencyError};
    use crate::node::BuildStatus;

    fn new_graph() -> Arc<Graph> {
        Arc::new(Graph::new())
    }

    fn open(graph: &Arc<Graph>, threads: usize) -> WritePort {
        graph
            .write_port(PortOptions { threads })
            .expect("write port")
    }

    fn chain_has<T: failure::Fail>(err: &Error) -> bool {
        err.iter_chain().any(|f| f.downcast_ref::<T>().is_some())
    }

    /// Scenario: a static dependency's content changes on disk and the
    /// change propagates into the parent's stamp.
    #[test]
    fn static_dirty_propagation() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.txt");
        fs::write(&input, b"hello").unwrap();

        let graph = new_graph();
        let src = SourceFile::new(&input);
        let a = src.alias();
        let b = Alias::new("group", "b").unwrap();

        let first = {
            let port = open(&graph, 0);
            port.create(src.clone().into(), Vec::new()).unwrap();
            port.create(
                Group::new("b", Vec::new()).into(),
                vec![a.clone()],
            )
            .unwrap();

            let result =
                port.build(&b, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
            result.stamp
        };

        assert!(first.is_valid());

        // No change: up to date.
        {
            let port = open(&graph, 0);
            let result =
                port.build(&b, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::UpToDate);
            assert_eq!(result.stamp, first);
        }

        fs::write(&input, b"hello!").unwrap();

        let second = {
            let port = open(&graph, 0);
            let result =
                port.build(&b, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
            result.stamp
        };

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    /// Scenario: a build action discovers a dependency its factory never
    /// declared, and the edge keeps working across sessions.
    #[test]
    fn dynamic_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("d.txt");
        fs::write(&input, b"data").unwrap();

        {
            let input = input.clone();
            buildable::register("disc", move |_, ctx| {
                ctx.need_file(&input)?;
                Ok(())
            });
        }

        let graph = new_graph();
        let c = Alias::new("disc", "c").unwrap();

        let first = {
            let port = open(&graph, 0);
            port.create(
                Custom::new(c.clone(), Vec::new()).into(),
                Vec::new(),
            )
            .unwrap();

            port.build(&c, &BuildOptions::new()).join().unwrap().stamp
        };

        // The dynamic edge exists now.
        let node = graph.expect(&c).unwrap();
        assert_eq!(node.dynamic_dependencies().len(), 1);
        assert!(node.dynamic_dependencies()[0].stamp.is_valid());

        // Touch the file: same content, new modification time.
        std::thread::sleep(Duration::from_millis(15));
        fs::write(&input, b"data").unwrap();

        let second = {
            let port = open(&graph, 0);
            let result =
                port.build(&c, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
            result.stamp
        };

        assert_ne!(first, second);

        // And with nothing changed, the next session is a no-op.
        {
            let port = open(&graph, 0);
            let result =
                port.build(&c, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::UpToDate);
        }
    }

    /// Scenario: an output file is stamped in place; deleting it between
    /// sessions forces the producer to rebuild.
    #[test]
    fn output_file_back_edge() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");

        let graph = new_graph();
        let action = WriteFile::new(&out, &b"payload"[..]);
        let e = action.alias();

        {
            let port = open(&graph, 0);
            port.create(action.into(), Vec::new()).unwrap();

            let result =
                port.build(&e, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
        }

        assert_eq!(fs::read(&out).unwrap(), b"payload");

        {
            let port = open(&graph, 0);
            let result =
                port.build(&e, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::UpToDate);
        }

        fs::remove_file(&out).unwrap();

        {
            let port = open(&graph, 0);
            let mut opts = BuildOptions::new();
            opts.no_warning_on_missing_output = true;

            let result = port.build(&e, &opts).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
        }

        assert_eq!(fs::read(&out).unwrap(), b"payload");
    }

    /// Scenario: a static edge one way and a dynamic edge back the other
    /// way is reported as a cycle, and the graph recovers once the cycle
    /// is gone.
    #[test]
    fn cycle_detection() {
        let graph = new_graph();

        let f = Alias::new("group", "f").unwrap();
        let g = Alias::new("cyc", "g").unwrap();

        {
            let f = f.clone();
            buildable::register("cyc", move |_, ctx| {
                ctx.depends_on(Some(f.clone()))?;
                Ok(())
            });
        }

        {
            let port = open(&graph, 0);
            port.create(
                Custom::new(g.clone(), Vec::new()).into(),
                Vec::new(),
            )
            .unwrap();
            port.create(Group::new("f", Vec::new()).into(), vec![g.clone()])
                .unwrap();

            let err = port
                .build(&f, &BuildOptions::new())
                .join()
                .err()
                .expect("cycle must fail");

            let err: Error = err.into();
            assert!(chain_has::<CycleError>(&err));

            let cycle = err
                .iter_chain()
                .filter_map(|x| x.downcast_ref::<CycleError>())
                .next()
                .unwrap();
            assert!(cycle.chain.contains(&f));
            assert!(cycle.chain.contains(&g));
        }

        // Break the cycle and try again: everything builds.
        buildable::register("cyc", |_, _| Ok(()));

        {
            let port = open(&graph, 0);
            let result =
                port.build(&f, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
        }
    }

    /// Scenario: cancelling the port aborts everything still in flight,
    /// and `join` comes back promptly.
    #[test]
    fn cancellation() {
        buildable::register("quick", |_, _| Ok(()));
        buildable::register("slow", |_, ctx| {
            ctx.sleep(Duration::from_secs(5))
        });

        let graph = new_graph();

        let a = Alias::new("quick", "a").unwrap();
        let b = Alias::new("slow", "b").unwrap();
        let c = Alias::new("slow", "c").unwrap();

        let port = open(&graph, 2);
        for alias in &[&a, &b, &c] {
            port.create(
                Custom::new((*alias).clone(), Vec::new()).into(),
                Vec::new(),
            )
            .unwrap();
        }

        let futures = port.build_many(
            &[a.clone(), b.clone(), c.clone()],
            &BuildOptions::new(),
        );

        // Let the quick one through, then pull the plug.
        assert!(futures[0].join().is_ok());
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        port.cancel(format_err!("interrupted"));

        for future in &futures[1..] {
            let err: Error = future.join().err().expect("aborted").into();
            assert!(chain_has::<crate::error::Aborted>(&err));
        }

        assert!(port.join().is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    /// Two concurrent builds of the same node share one future; the action
    /// runs at most once per session.
    #[test]
    fn at_most_once_per_session() {
        static RUNS: AtomicUsize = AtomicUsize::new(0);

        buildable::register("once", |_, _| {
            RUNS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let graph = new_graph();
        let alias = Alias::new("once", "n").unwrap();

        let port = open(&graph, 2);
        port.create(
            Custom::new(alias.clone(), Vec::new()).into(),
            Vec::new(),
        )
        .unwrap();

        let f1 = port.build(&alias, &BuildOptions::new());
        let f2 = port.build(&alias, &BuildOptions::new());

        assert!(f1.join().is_ok());
        assert!(f2.join().is_ok());
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    }

    /// A node with no edges of any kind always rebuilds.
    #[test]
    fn zero_edges_always_rebuilds() {
        let graph = new_graph();
        let alias = Alias::new("group", "leafless").unwrap();

        for _ in 0..3 {
            let port = open(&graph, 0);
            port.create(
                Group::new("leafless", Vec::new()).into(),
                Vec::new(),
            )
            .unwrap();

            let result =
                port.build(&alias, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
        }
    }

    /// Depending on an alias that was never created fails the parent.
    #[test]
    fn unknown_dynamic_dependency_fails_parent() {
        buildable::register("wants-ghost", |_, ctx| {
            ctx.depends_on(Some(
                Alias::new("group", "ghost").unwrap(),
            ))?;
            Ok(())
        });

        let graph = new_graph();
        let alias = Alias::new("wants-ghost", "p").unwrap();

        let port = open(&graph, 0);
        port.create(
            Custom::new(alias.clone(), Vec::new()).into(),
            Vec::new(),
        )
        .unwrap();

        let err: Error = port
            .build(&alias, &BuildOptions::new())
            .join()
            .err()
            .expect("must fail")
            .into();

        assert!(chain_has::<BuildError>(&err));
        assert!(chain_has::<DependencyError>(&err));
        assert!(chain_has::<NotFound>(&err));
    }

    /// A failing build leaves the node dirty, so the next session retries
    /// it.
    #[test]
    fn failure_dirties_node() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

        buildable::register("flaky", |_, _| {
            if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(format_err!("transient"))
            } else {
                Ok(())
            }
        });

        let graph = new_graph();
        let alias = Alias::new("flaky", "n").unwrap();

        {
            let port = open(&graph, 0);
            port.create(
                Custom::new(alias.clone(), Vec::new()).into(),
                Vec::new(),
            )
            .unwrap();
            assert!(port.build(&alias, &BuildOptions::new()).join().is_err());
        }

        assert!(!graph.expect(&alias).unwrap().stamp().is_valid());

        {
            let port = open(&graph, 0);
            let result =
                port.build(&alias, &BuildOptions::new()).join().unwrap();
            assert_eq!(result.status, BuildStatus::Built);
        }
    }

    /// Annotations surface through the session summary.
    #[test]
    fn annotations_in_summary() {
        buildable::register("noisy", |_, ctx| {
            ctx.annotate("did a thing");
            Ok(())
        });

        let graph = new_graph();
        let alias = Alias::new("noisy", "n").unwrap();

        let port = open(&graph, 0);
        port.create(
            Custom::new(alias.clone(), Vec::new()).into(),
            Vec::new(),
        )
        .unwrap();
        port.build(&alias, &BuildOptions::new()).join().unwrap();

        let summary = port.summary();
        let entry = summary.iter().find(|(a, _)| *a == alias).unwrap();
        assert_eq!(entry.1.annotations, vec!["did a thing".to_string()]);
    }

    /// Only one write port may be open at a time.
    #[test]
    fn write_port_is_exclusive() {
        let graph = new_graph();

        let port = open(&graph, 0);
        assert!(graph.write_port(PortOptions { threads: 0 }).is_err());
        drop(port);

        assert!(graph.write_port(PortOptions { threads: 0 }).is_ok());
    }
}
