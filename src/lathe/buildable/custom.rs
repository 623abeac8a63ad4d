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

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use failure::format_err;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::context::BuildContext;
use crate::error::Error;

use super::traits::Buildable;

/// The signature of a registered build action. The payload carries the
/// alias and an opaque blob; the action interprets the blob.
pub type Handler = dyn Fn(&Custom, &mut BuildContext<'_>) -> Result<(), Error>
    + Send
    + Sync;

lazy_static! {
    /// Process-wide registry of user actions, keyed by alias domain. The
    /// archive only stores the (alias, data) pair; the domain dispatches
    /// back to the registered handler on the next run.
    static ref REGISTRY: RwLock<HashMap<String, Arc<Handler>>> =
        RwLock::new(HashMap::new());
}

/// Registers the build action for every `Custom` payload whose alias lives
/// in `domain`. Re-registering a domain replaces the previous handler.
pub fn register<F>(domain: &str, handler: F)
where
    F: Fn(&Custom, &mut BuildContext<'_>) -> Result<(), Error>
        + Send
        + Sync
        + 'static,
{
    REGISTRY
        .write()
        .insert(domain.to_string(), Arc::new(handler));
}

/// A user-provided payload: an alias plus an opaque, serializable blob. The
/// node graph treats it like any other buildable; the behavior comes from
/// the handler registered for the alias domain.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash)]
pub struct Custom {
    alias: Alias,
    data: Vec<u8>,
}

impl Custom {
    pub fn new(alias: Alias, data: Vec<u8>) -> Custom {
        Custom { alias, data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alias)
    }
}

impl Buildable for Custom {
    fn alias(&self) -> Alias {
        self.alias.clone()
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error> {
        let handler = REGISTRY.read().get(self.alias.domain()).cloned();

        match handler {
            Some(handler) => handler(self, ctx),
            None => Err(format_err!(
                "no action registered for domain '{}' (needed by '{}')",
                self.alias.domain(),
                self.alias
            )),
        }
    }
}
