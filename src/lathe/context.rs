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

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alias::Alias;
use crate::buildable::{
    digest_file, Any, GeneratedFile, SourceDir, SourceFile,
};
use crate::error::{Aborted, DependencyError, Error};
use crate::factory::{self, Factory};
use crate::future::parallel_collect;
use crate::node::NodeInner;
use crate::options::BuildOptions;
use crate::port::Session;
use crate::stamp::{BuildDependency, BuildStamp, DependencyType};
use crate::util::Stopwatch;

pub(crate) type OnBuilt = Box<dyn FnOnce() -> Result<(), Error> + Send>;

/// What the engine gets back from a finished action.
pub(crate) struct ContextOutcome {
    pub timestamp: Option<DateTime<Utc>>,
    pub annotations: Vec<String>,
    pub on_built: Vec<OnBuilt>,
}

/// The API a node's `build` function sees.
///
/// Everything an action discovers at runtime flows through here: dynamic
/// dependencies (`depends_on`, `need_*`), outputs (`output_*`), and
/// adjustments to the final stamp. The owning node's lock is held for the
/// whole call; children are scheduled through the session and joined
/// without holding their locks, with the stats stopwatch paused across
/// every wait so exclusive time stays exclusive.
pub struct BuildContext<'a> {
    session: &'a Arc<Session>,
    alias: Alias,
    inner: &'a mut NodeInner,
    child_opts: BuildOptions,
    stopwatch: &'a mut Stopwatch,
    timestamp: Option<DateTime<Utc>>,
    annotations: Vec<String>,
    on_built: Vec<OnBuilt>,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        session: &'a Arc<Session>,
        alias: Alias,
        inner: &'a mut NodeInner,
        child_opts: BuildOptions,
        stopwatch: &'a mut Stopwatch,
    ) -> Self {
        BuildContext {
            session,
            alias,
            inner,
            child_opts,
            stopwatch,
            timestamp: None,
            annotations: Vec::new(),
            on_built: Vec::new(),
        }
    }

    /// The alias of the node being built.
    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Builds the given aliases and records them as dynamic dependencies
    /// with the stamps they resolved to. The aliases must already exist in
    /// the graph; depending on an unknown alias fails this build.
    pub fn depends_on<I>(&mut self, aliases: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Alias>,
    {
        let aliases: Vec<Alias> = aliases.into_iter().collect();

        if aliases.is_empty() {
            return Ok(());
        }

        let futures =
            self.session.schedule_many(&aliases, &self.child_opts);

        // Waiting on children is not our own time.
        self.stopwatch.pause();
        let results = parallel_collect(&futures);
        self.stopwatch.resume();

        let results = results.map_err(|cause| DependencyError {
            dep_type: DependencyType::Dynamic,
            alias: self.alias.clone(),
            cause,
        })?;

        for result in results {
            self.inner.record_dynamic(
                &self.alias,
                BuildDependency::new(result.alias, result.stamp),
            );
        }

        Ok(())
    }

    /// Creates (or finds) a source file node, builds it, and records a
    /// dynamic dependency on it.
    pub fn need_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<Alias, Error> {
        let (node, _) = self
            .session
            .graph
            .create(SourceFile::new(path).into(), Vec::new())?;

        let alias = node.alias().clone();
        self.depends_on(Some(alias.clone()))?;
        Ok(alias)
    }

    /// Creates (or finds) a source directory node, builds it, and records
    /// a dynamic dependency on it.
    pub fn need_directory<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<Alias, Error> {
        let (node, _) = self
            .session
            .graph
            .create(SourceDir::new(path).into(), Vec::new())?;

        let alias = node.alias().clone();
        self.depends_on(Some(alias.clone()))?;
        Ok(alias)
    }

    /// Runs a factory, builds the node it creates, and records a dynamic
    /// dependency on it.
    pub fn need_factory(
        &mut self,
        f: &dyn Factory,
    ) -> Result<Alias, Error> {
        let node = factory::create_node(self.session, f, Vec::new())?;
        let alias = node.alias().clone();
        self.depends_on(Some(alias.clone()))?;
        Ok(alias)
    }

    /// Declares a file this build created.
    ///
    /// The file is stamped *in place* (fresh stat plus content
    /// fingerprint); its node is never scheduled from here, which is what
    /// keeps a producer from depending on its own output. The stamp lands
    /// in the node's output-file vector, so a later run notices external
    /// edits and rebuilds.
    pub fn output_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<Alias, Error> {
        let file = GeneratedFile::new(path.as_ref());
        let stamp = digest_file(file.path())?;

        let (node, _) =
            self.session.graph.create(file.into(), Vec::new())?;

        let alias = node.alias().clone();
        self.inner.record_output_file(
            &self.alias,
            BuildDependency::new(alias.clone(), stamp),
        );
        Ok(alias)
    }

    /// Creates a node that this build *produces*, with the current node as
    /// its static dependency, and builds it. Output nodes carry no stamp in
    /// the producer; they are rebuilt whenever they are re-created.
    pub fn output_node(&mut self, buildable: Any) -> Result<Alias, Error> {
        let (node, changed) = self
            .session
            .graph
            .create(buildable, vec![self.alias.clone()])?;

        let alias = node.alias().clone();

        if changed {
            node.write().stamp = BuildStamp::invalid();
        }

        self.build_output(&alias)?;
        self.inner.record_output_node(&self.alias, alias.clone());
        Ok(alias)
    }

    /// Like `output_node`, but the child comes from a factory. The factory
    /// may declare additional static dependencies; the producer is always
    /// among them.
    pub fn output_factory(
        &mut self,
        f: &dyn Factory,
    ) -> Result<Alias, Error> {
        let node = factory::create_node(
            self.session,
            f,
            vec![self.alias.clone()],
        )?;

        let alias = node.alias().clone();
        self.build_output(&alias)?;
        self.inner.record_output_node(&self.alias, alias.clone());
        Ok(alias)
    }

    fn build_output(&mut self, alias: &Alias) -> Result<(), Error> {
        let future = self.session.schedule(alias, &self.child_opts);

        self.stopwatch.pause();
        let result = future.join();
        self.stopwatch.resume();

        result.map_err(|cause| DependencyError {
            dep_type: DependencyType::OutputNode,
            alias: self.alias.clone(),
            cause,
        })?;

        Ok(())
    }

    /// Appends to the node's annotation list for end-of-build summaries.
    pub fn annotate<S: Into<String>>(&mut self, text: S) {
        self.annotations.push(text.into());
    }

    /// Overrides the modification time used in the final stamp. Defaults
    /// to the build start time.
    pub fn timestamp(&mut self, time: DateTime<Utc>) {
        self.timestamp = Some(time);
    }

    /// Registers a hook to run after the build succeeds, before the result
    /// is published. A failing hook fails the build.
    pub fn on_built<F>(&mut self, hook: F)
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        self.on_built.push(Box::new(hook));
    }

    /// Fails with `Aborted` when the write port has been cancelled.
    /// Long-running actions should call this at their own suspension
    /// points.
    pub fn check_cancelled(&self) -> Result<(), Error> {
        self.session.cancel.check()
    }

    /// Sleeps for the given duration, failing early with `Aborted` when
    /// the port is cancelled in the meantime.
    pub fn sleep(&mut self, timeout: Duration) -> Result<(), Error> {
        self.stopwatch.pause();
        let cancelled = self.session.cancel.sleep(timeout);
        self.stopwatch.resume();

        match cancelled {
            Some(cause) => Err(Aborted { cause }.into()),
            None => Ok(()),
        }
    }

    pub(crate) fn finish(self) -> ContextOutcome {
        ContextOutcome {
            timestamp: self.timestamp,
            annotations: self.annotations,
            on_built: self.on_built,
        }
    }
}
