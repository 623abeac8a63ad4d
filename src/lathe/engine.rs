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

//! Deciding "needs rebuild?" and running node actions.
//!
//! The execution of a node proceeds in lockstep with its edge vectors:
//! static dependencies are built before the node lock is taken, the rebuild
//! decision joins static and dynamic children and re-stamps output files in
//! place, and only then does the action itself run, repopulating whatever
//! it discovers. A node with no edges of any flavor always rebuilds.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use failure::format_err;
use log::{debug, warn};

use crate::alias::Alias;
use crate::buildable::Buildable;
use crate::context::BuildContext;
use crate::error::{BuildError, DependencyError, Error, SharedFailure};
use crate::events::{Event, NodeOutcome};
use crate::future::parallel_collect;
use crate::node::{BuildResult, BuildStats, BuildStatus, Node, NodeInner};
use crate::options::BuildOptions;
use crate::port::Session;
use crate::stamp::{BuildStamp, DependencyType};

/// The fingerprint a successful build stamps the node with: the payload's
/// content folded together with every resolved edge stamp. A change
/// anywhere below a node therefore ripples up through the stamps of
/// everything above it.
fn node_fingerprint(
    inner: &NodeInner,
    buildable: &crate::buildable::Any,
) -> Result<crate::fingerprint::Fingerprint, Error> {
    let content = buildable.content_fingerprint()?;

    crate::fingerprint::of(&(
        content,
        &inner.static_deps,
        &inner.dynamic_deps,
        &inner.output_files,
        &inner.output_nodes,
    ))
}

/// Executes one node under its write lock. This is the closure stored in
/// the node's in-flight future; at most one runs per node at a time.
pub(crate) fn execute(
    session: &Arc<Session>,
    node: &Arc<Node>,
    opts: &BuildOptions,
) -> Result<BuildResult, Error> {
    session.cancel.check()?;

    let alias = node.alias().clone();
    let child_opts = opts.child_of(alias.clone(), None);

    // Static dependencies build before the node lock is taken, so a long
    // chain of parents does not hold a lock ladder while leaves build.
    let static_aliases: Vec<Alias> = node
        .static_dependencies()
        .into_iter()
        .map(|d| d.alias)
        .collect();

    let static_futures = session.schedule_many(&static_aliases, &child_opts);
    let static_results = match parallel_collect(&static_futures) {
        Ok(results) => results,
        Err(cause) => {
            node.write().invalidate_edges();

            return Err(DependencyError {
                dep_type: DependencyType::Static,
                alias,
                cause,
            }
            .into());
        }
    };

    let mut inner = node.write();
    session.graph.events.send(Event::BeginNode {
        alias: alias.clone(),
    });

    let wall = Instant::now();
    let result = execute_locked(
        session,
        node,
        &mut inner,
        opts,
        static_results,
        wall,
    );

    let (outcome, error) = match &result {
        Ok(r) if r.status == BuildStatus::Built => (NodeOutcome::Built, None),
        Ok(_) => (NodeOutcome::UpToDate, None),
        Err(err) => (NodeOutcome::Failed, Some(err.to_string())),
    };

    session.graph.events.send(Event::EndNode {
        alias,
        outcome,
        duration: wall.elapsed(),
        error,
    });

    result
}

fn execute_locked(
    session: &Arc<Session>,
    node: &Arc<Node>,
    inner: &mut NodeInner,
    opts: &BuildOptions,
    static_results: Vec<BuildResult>,
    wall: Instant,
) -> Result<BuildResult, Error> {
    let alias = node.alias().clone();
    let child_opts = opts.child_of(alias.clone(), None);

    let mut rebuild = !inner.has_edges();

    if !rebuild {
        // Statics were already built; fold their stamps in.
        for result in static_results {
            if let Some(dep) = inner
                .static_deps
                .iter_mut()
                .find(|d| d.alias == result.alias)
            {
                if dep.stamp != result.stamp {
                    dep.stamp = result.stamp;
                    session.graph.mark_dirty();
                    rebuild = true;
                }
            }
        }

        // Dynamic dependencies were discovered by the previous run of the
        // action; build them and compare.
        let dynamic_aliases: Vec<Alias> =
            inner.dynamic_deps.iter().map(|d| d.alias.clone()).collect();

        let futures = session.schedule_many(&dynamic_aliases, &child_opts);

        match parallel_collect(&futures) {
            Ok(results) => {
                for result in results {
                    if let Some(dep) = inner
                        .dynamic_deps
                        .iter_mut()
                        .find(|d| d.alias == result.alias)
                    {
                        if dep.stamp != result.stamp {
                            dep.stamp = result.stamp;
                            session.graph.mark_dirty();
                            rebuild = true;
                        }
                    }
                }
            }
            Err(cause) => {
                // Suppress the rebuild and propagate; the dirtied edges
                // make the node retry next time.
                inner.invalidate_edges();

                return Err(DependencyError {
                    dep_type: DependencyType::Dynamic,
                    alias,
                    cause,
                }
                .into());
            }
        }

        // Output files are stamped in place, never through their node, to
        // keep the producer-output relationship acyclic.
        for dep in inner.output_files.iter_mut() {
            let current = session
                .graph
                .find(&dep.alias)
                .and_then(|n| n.read().buildable.digest());

            match current {
                Some(Ok(stamp)) => {
                    if stamp != dep.stamp {
                        dep.stamp = stamp;
                        session.graph.mark_dirty();
                        rebuild = true;
                    }
                }
                Some(Err(err)) => {
                    if !opts.no_warning_on_missing_output {
                        warn!(
                            "output {} of '{}' is unreadable ({}); \
                             rebuilding",
                            dep.alias, alias, err
                        );
                    }

                    rebuild = true;
                }
                None => {
                    if !opts.no_warning_on_missing_output {
                        warn!(
                            "output {} of '{}' is gone from the graph; \
                             rebuilding",
                            dep.alias, alias
                        );
                    }

                    rebuild = true;
                }
            }
        }

        // Output nodes carry no stamp: they are rebuilt on re-creation,
        // not compared here.

        if !inner.stamp.is_valid() {
            rebuild = true;
        }
    }

    if !rebuild && !opts.force {
        debug!("'{}' is up to date", alias);

        return Ok(BuildResult {
            alias,
            stamp: inner.stamp.clone(),
            status: BuildStatus::UpToDate,
        });
    }

    // Rebuild. Dynamic edges and outputs belong to the previous run of the
    // action; it repopulates them from scratch.
    let previous_stamp =
        std::mem::replace(&mut inner.stamp, BuildStamp::invalid());
    inner.dynamic_deps.clear();
    inner.output_files.clear();
    inner.output_nodes.clear();

    let start_time = Utc::now();
    let buildable = inner.buildable.clone();

    // Children that find us on their caller chain compare against the
    // stamp we had going in, instead of recursing into a locked node.
    let action_opts =
        opts.child_of(alias.clone(), Some(previous_stamp.clone()));

    let mut stopwatch = crate::util::Stopwatch::started();

    let action_result = {
        let mut ctx = BuildContext::new(
            session,
            alias.clone(),
            inner,
            action_opts,
            &mut stopwatch,
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            buildable.build(&mut ctx)
        }));

        match result {
            Ok(result) => result.map(|()| ctx.finish()),
            Err(cause) => {
                // The action is in an unknown state; remember that so the
                // half-consistent graph is never saved.
                session.graph.record_panic();

                let msg = cause
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| {
                        cause.downcast_ref::<String>().cloned()
                    })
                    .unwrap_or_else(|| "unknown panic".to_string());

                Err(format_err!("build action panicked: {}", msg))
            }
        }
    };

    let exclusive = stopwatch.stop();

    let outcome = match action_result {
        Ok(outcome) => outcome,
        Err(cause) => {
            inner.invalidate_edges();

            return Err(BuildError {
                alias,
                cause: SharedFailure::new(cause),
            }
            .into());
        }
    };

    debug_assert!(
        inner
            .dynamic_deps
            .iter()
            .all(|d| d.stamp.is_valid()),
        "'{}' finished with an unresolved dynamic edge",
        alias
    );
    debug_assert!(
        inner
            .output_files
            .iter()
            .all(|d| d.stamp.is_valid()),
        "'{}' finished with an unresolved output edge",
        alias
    );

    let fingerprint = match node_fingerprint(inner, &buildable) {
        Ok(fingerprint) => fingerprint,
        Err(cause) => {
            inner.invalidate_edges();

            return Err(BuildError {
                alias,
                cause: SharedFailure::new(cause),
            }
            .into());
        }
    };

    let stamp = BuildStamp::new(
        outcome.timestamp.unwrap_or(start_time),
        fingerprint,
    );

    if stamp != previous_stamp {
        session.graph.mark_dirty();
    }

    inner.buildable = buildable;
    inner.stamp = stamp.clone();

    // Post-build hooks run after success, before the result is published.
    for hook in outcome.on_built {
        if let Err(cause) = hook() {
            inner.stamp = BuildStamp::invalid();
            inner.invalidate_edges();

            return Err(BuildError {
                alias,
                cause: SharedFailure::new(cause),
            }
            .into());
        }
    }

    node.set_stats(BuildStats {
        inclusive: wall.elapsed(),
        exclusive,
        annotations: outcome.annotations,
    });

    Ok(BuildResult {
        alias,
        stamp,
        status: BuildStatus::Built,
    })
}
