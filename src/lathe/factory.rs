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

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use crate::alias::Alias;
use crate::buildable::{
    Any, Custom, GeneratedFile, Group, SourceDir, SourceFile, WriteFile,
};
use crate::error::Error;
use crate::node::Node;
use crate::port::Session;

/// A node constructor. It is invoked once during node creation and receives
/// an initializer through which it declares the node's *static*
/// dependencies before the node exists. Static edges declared here are the
/// only edges frozen outside of `build`.
pub trait Factory {
    fn create(&self, init: &mut Initializer<'_>) -> Result<Any, Error>;
}

impl<F> Factory for F
where
    F: Fn(&mut Initializer<'_>) -> Result<Any, Error>,
{
    fn create(&self, init: &mut Initializer<'_>) -> Result<Any, Error> {
        self(init)
    }
}

/// Accumulates the static dependencies a factory declares. Exclusive
/// ownership during the factory call makes the accumulation race-free
/// without a lock.
pub struct Initializer<'a> {
    session: &'a Arc<Session>,
    deps: Vec<Alias>,
}

impl<'a> Initializer<'a> {
    fn new(session: &'a Arc<Session>, deps: Vec<Alias>) -> Self {
        Initializer { session, deps }
    }

    /// Declares static dependencies on already-known aliases.
    pub fn depends_on<I>(&mut self, aliases: I)
    where
        I: IntoIterator<Item = Alias>,
    {
        self.deps.extend(aliases);
    }

    /// Creates (or finds) the node for a source file and declares a static
    /// dependency on it.
    pub fn need_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<Alias, Error> {
        let (node, _) = self
            .session
            .graph
            .create(SourceFile::new(path).into(), Vec::new())?;

        let alias = node.alias().clone();
        self.deps.push(alias.clone());
        Ok(alias)
    }

    /// Creates (or finds) the node for a source directory and declares a
    /// static dependency on it.
    pub fn need_directory<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<Alias, Error> {
        let (node, _) = self
            .session
            .graph
            .create(SourceDir::new(path).into(), Vec::new())?;

        let alias = node.alias().clone();
        self.deps.push(alias.clone());
        Ok(alias)
    }

    /// Runs another factory, creates its node, and declares a static
    /// dependency on it.
    pub fn need_factory(
        &mut self,
        factory: &dyn Factory,
    ) -> Result<Alias, Error> {
        let node = create_node(self.session, factory, Vec::new())?;
        let alias = node.alias().clone();
        self.deps.push(alias.clone());
        Ok(alias)
    }
}

/// Drives a factory to completion: runs it with a fresh initializer (seeded
/// with any pre-existing static dependencies, e.g. an output node's
/// producer) and registers the resulting node.
pub(crate) fn create_node(
    session: &Arc<Session>,
    factory: &dyn Factory,
    seed_deps: Vec<Alias>,
) -> Result<Arc<Node>, Error> {
    let mut init = Initializer::new(session, seed_deps);
    let buildable = factory.create(&mut init)?;
    let (node, _) = session.graph.create(buildable, init.deps)?;
    Ok(node)
}

/// Casts a node's payload back to a concrete type. The typed factory below
/// uses it to give callers a build-time view of what they created.
pub trait FromAny: Sized {
    fn from_any(any: &Any) -> Option<&Self>;
}

macro_rules! from_any {
    ($name:ident) => {
        impl FromAny for $name {
            fn from_any(any: &Any) -> Option<&Self> {
                match any {
                    Any::$name(x) => Some(x),
                    _ => None,
                }
            }
        }
    };
}

from_any!(SourceFile);
from_any!(GeneratedFile);
from_any!(SourceDir);
from_any!(Group);
from_any!(WriteFile);
from_any!(Custom);

/// Wraps an untyped factory and exposes a cast to the concrete payload type
/// for callers that know what they are building.
pub struct TypedFactory<F, T> {
    factory: F,
    marker: PhantomData<fn() -> T>,
}

impl<F, T> TypedFactory<F, T>
where
    F: Factory,
    T: FromAny,
{
    pub fn new(factory: F) -> Self {
        TypedFactory {
            factory,
            marker: PhantomData,
        }
    }

    /// The typed view of a payload this factory produced. `None` when the
    /// payload is of a different shape.
    pub fn cast<'x>(&self, any: &'x Any) -> Option<&'x T> {
        T::from_any(any)
    }
}

impl<F, T> Factory for TypedFactory<F, T>
where
    F: Factory,
{
    fn create(&self, init: &mut Initializer<'_>) -> Result<Any, Error> {
        self.factory.create(init)
    }
}
