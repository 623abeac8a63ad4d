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

//! An incremental, persistent, content-addressed build graph engine.
//!
//! The graph maps aliases to buildable nodes, decides which nodes need to
//! be re-executed when their inputs change, runs them concurrently, and
//! persists everything between invocations so the next run can skip
//! up-to-date work.

pub mod alias;
pub mod buildable;
pub mod config;
mod context;
pub mod db;
mod engine;
pub mod error;
pub mod events;
mod factory;
pub mod fingerprint;
pub mod future;
pub mod graph;
pub mod node;
mod options;
pub mod pool;
mod port;
pub mod stamp;
pub mod util;

pub use crate::alias::Alias;
pub use crate::buildable::Buildable;
pub use crate::config::Config;
pub use crate::context::BuildContext;
pub use crate::db::{Compression, Database, DatabaseOptions};
pub use crate::error::{Error, ResultExt};
pub use crate::factory::{Factory, FromAny, Initializer, TypedFactory};
pub use crate::fingerprint::Fingerprint;
pub use crate::graph::Graph;
pub use crate::node::{BuildResult, BuildStats, BuildStatus, Node};
pub use crate::options::BuildOptions;
pub use crate::port::{PortOptions, ReadPort, WritePort};
pub use crate::stamp::{BuildDependency, BuildStamp, DependencyType};
