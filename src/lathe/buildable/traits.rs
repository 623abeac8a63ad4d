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

use serde::Serialize;

use crate::alias::Alias;
use crate::context::BuildContext;
use crate::error::Error;
use crate::fingerprint::Fingerprint;

/// A buildable is the payload of a node: a value that can be identified,
/// serialized, and built.
///
/// A buildable is primarily an *identifier* plus an action. Everything the
/// engine needs to decide "has this changed?" flows through
/// `content_fingerprint`; everything it needs to bring the entity up to date
/// flows through `build`. The serialized form must have a deterministic
/// field order, since it feeds both the database and the fingerprint.
pub trait Buildable: Serialize + Clone + fmt::Display {
    /// The canonical name of this entity. Must be stable: re-creating the
    /// same concrete object always yields the same alias.
    fn alias(&self) -> Alias;

    /// Brings the entity up to date. May record dynamic dependencies and
    /// outputs through the context.
    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error>;

    /// The fingerprint of the entity's *content* (which may live on disk and
    /// require I/O), as opposed to the fingerprint of its serialized shape.
    fn content_fingerprint(&self) -> Result<Fingerprint, Error>
    where
        Self: Sized,
    {
        crate::fingerprint::of(self)
    }
}
