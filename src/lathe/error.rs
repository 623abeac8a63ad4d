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

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use failure::Fail;

use crate::alias::Alias;
use crate::stamp::DependencyType;

/// The universal error type. Everything below trickles into this.
pub type Error = failure::Error;

pub use failure::ResultExt;

/// A failure that can be observed by more than one thread.
///
/// Node builds resolve a single future that many parents may join. Since
/// `failure::Error` is not `Clone`, the cause is parked behind an `Arc` and
/// every joiner gets the same view of it.
#[derive(Debug, Clone)]
pub struct SharedFailure {
    inner: Arc<Error>,
}

impl SharedFailure {
    pub fn new(err: Error) -> SharedFailure {
        SharedFailure {
            inner: Arc::new(err),
        }
    }

    /// Tries to downcast the root failure to a concrete type.
    pub fn downcast_ref<T: Fail>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Display for SharedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl Fail for SharedFailure {
    fn cause(&self) -> Option<&dyn Fail> {
        Some(self.inner.as_fail())
    }
}

impl From<Error> for SharedFailure {
    fn from(err: Error) -> SharedFailure {
        SharedFailure::new(err)
    }
}

/// No node with the given alias exists in the graph.
#[derive(Fail, Debug, Clone, Eq, PartialEq)]
#[fail(display = "no node named '{}'", alias)]
pub struct NotFound {
    pub alias: Alias,
}

/// A static, dynamic, or output dependency of a node failed to build. The
/// alias names the *parent*; the cause carries the failing child.
#[derive(Fail, Debug, Clone)]
#[fail(display = "{} dependency of '{}' failed", dep_type, alias)]
pub struct DependencyError {
    pub dep_type: DependencyType,
    pub alias: Alias,
    #[fail(cause)]
    pub cause: SharedFailure,
}

/// The node's own build action failed.
#[derive(Fail, Debug, Clone)]
#[fail(display = "failed to build '{}'", alias)]
pub struct BuildError {
    pub alias: Alias,
    #[fail(cause)]
    pub cause: SharedFailure,
}

/// The write port was cancelled while this build was in flight.
#[derive(Fail, Debug, Clone)]
#[fail(display = "build aborted")]
pub struct Aborted {
    #[fail(cause)]
    pub cause: SharedFailure,
}

/// A cyclic dependency chain. Fatal for the builds involved, but the graph
/// itself is left consistent so that a corrected build can succeed.
#[derive(Fail, Debug, Clone, Eq, PartialEq)]
pub struct CycleError {
    pub chain: Vec<Alias>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle: ")?;

        for (i, alias) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }

            write!(f, "'{}'", alias)?;
        }

        Ok(())
    }
}

/// No dependency chain exists between the two aliases.
#[derive(Fail, Debug, Clone, Eq, PartialEq)]
#[fail(display = "no dependency path from '{}' to '{}'", src, dst)]
pub struct NoPath {
    pub src: Alias,
    pub dst: Alias,
}

/// The on-disk database could not be understood. Recoverable under tolerant
/// mode, where the graph is purged and marked dirty instead.
#[derive(Fail, Debug, Clone, Eq, PartialEq)]
#[fail(display = "corrupt build database: {}", reason)]
pub struct CorruptDatabase {
    pub reason: String,
}

/// Another process holds the advisory lock on the database file.
#[derive(Fail, Debug, Clone, Eq, PartialEq)]
#[fail(display = "build database {:?} is locked by another process", path)]
pub struct DatabaseLocked {
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display() {
        let err = CycleError {
            chain: vec![
                Alias::new("group", "f").unwrap(),
                Alias::new("group", "g").unwrap(),
                Alias::new("group", "f").unwrap(),
            ],
        };

        assert_eq!(
            err.to_string(),
            "dependency cycle: 'group://f' -> 'group://g' -> 'group://f'"
        );
    }

    #[test]
    fn shared_failure_downcast() {
        let err: Error = NotFound {
            alias: Alias::new("file", "missing").unwrap(),
        }
        .into();

        let shared = SharedFailure::from(err);
        assert!(shared.downcast_ref::<NotFound>().is_some());
        assert!(shared.downcast_ref::<CorruptDatabase>().is_none());
    }
}
