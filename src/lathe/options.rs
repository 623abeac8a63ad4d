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

use std::sync::Arc;

use crate::alias::Alias;
use crate::stamp::BuildStamp;

/// Caller chains deeper than this are assumed to be runaway recursion.
pub const MAX_CALLER_DEPTH: usize = 20;

/// One link in the chain of builds that led to the current one. A link may
/// carry a "touch" stamp: the node is mid-rebuild, and anything that finds
/// it in the chain should compare against that stamp instead of recursing
/// into it (this is how an output node depends on its in-flight producer
/// without forming a cycle).
#[derive(Debug)]
struct Caller {
    alias: Alias,
    touch: Option<BuildStamp>,
    parent: Option<Arc<Caller>>,
}

/// Options for a single `build` request. Cloning is cheap; the caller chain
/// is shared.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// Rebuild even when every recorded stamp matches. Applies to the
    /// aliases named by the caller only; it is not propagated into
    /// grand-children.
    pub force: bool,

    /// Silence the warning when an output file's stamp cannot be read.
    pub no_warning_on_missing_output: bool,

    caller: Option<Arc<Caller>>,
}

impl BuildOptions {
    pub fn new() -> BuildOptions {
        BuildOptions::default()
    }

    pub fn force(mut self, force: bool) -> BuildOptions {
        self.force = force;
        self
    }

    /// Derives the options a node's children are built with: same flags
    /// except `force`, with the node pushed onto the caller chain.
    pub(crate) fn child_of(
        &self,
        alias: Alias,
        touch: Option<BuildStamp>,
    ) -> BuildOptions {
        BuildOptions {
            force: false,
            no_warning_on_missing_output: self.no_warning_on_missing_output,
            caller: Some(Arc::new(Caller {
                alias,
                touch,
                parent: self.caller.clone(),
            })),
        }
    }

    /// Finds the touch stamp of an in-flight caller, if the alias is on the
    /// chain with one.
    pub(crate) fn touch_of(&self, alias: &Alias) -> Option<BuildStamp> {
        let mut link = self.caller.as_ref();

        while let Some(caller) = link {
            if caller.alias == *alias {
                return caller.touch.clone();
            }

            link = caller.parent.as_ref();
        }

        None
    }

    /// `true` iff the alias appears on the caller chain at all.
    pub(crate) fn is_caller(&self, alias: &Alias) -> bool {
        let mut link = self.caller.as_ref();

        while let Some(caller) = link {
            if caller.alias == *alias {
                return true;
            }

            link = caller.parent.as_ref();
        }

        false
    }

    pub(crate) fn depth(&self) -> usize {
        let mut depth = 0;
        let mut link = self.caller.as_ref();

        while let Some(caller) = link {
            depth += 1;
            link = caller.parent.as_ref();
        }

        depth
    }

    /// The chain of callers, outermost first, ending with the given alias.
    /// This is what a cycle error reports.
    pub(crate) fn chain_to(&self, alias: &Alias) -> Vec<Alias> {
        let mut chain = Vec::new();
        let mut link = self.caller.as_ref();

        while let Some(caller) = link {
            chain.push(caller.alias.clone());
            link = caller.parent.as_ref();
        }

        chain.reverse();
        chain.push(alias.clone());
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(name: &str) -> Alias {
        Alias::new("group", name).unwrap()
    }

    #[test]
    fn chain_tracks_callers() {
        let root = BuildOptions::new();
        assert_eq!(root.depth(), 0);
        assert!(!root.is_caller(&alias("a")));

        let a = root.child_of(alias("a"), None);
        let b = a.child_of(alias("b"), None);

        assert_eq!(b.depth(), 2);
        assert!(b.is_caller(&alias("a")));
        assert!(b.is_caller(&alias("b")));
        assert!(!b.is_caller(&alias("c")));

        assert_eq!(
            b.chain_to(&alias("a")),
            vec![alias("a"), alias("b"), alias("a")]
        );
    }

    #[test]
    fn force_does_not_propagate() {
        let opts = BuildOptions::new().force(true);
        let child = opts.child_of(alias("a"), None);
        assert!(!child.force);
    }

    #[test]
    fn touch_stamps_are_found() {
        let stamp = BuildStamp::invalid();
        let opts = BuildOptions::new()
            .child_of(alias("producer"), Some(stamp.clone()));

        assert_eq!(opts.touch_of(&alias("producer")), Some(stamp));
        assert_eq!(opts.touch_of(&alias("other")), None);
    }
}
