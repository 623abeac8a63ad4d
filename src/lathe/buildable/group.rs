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

use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::context::BuildContext;
use crate::error::Error;

use super::traits::Buildable;

/// An aggregate target: building it builds every member and records them as
/// dynamic dependencies, so the group is dirty whenever a member is.
#[derive(
    Serialize, Deserialize, Clone, Ord, PartialOrd, Eq, PartialEq, Hash,
)]
pub struct Group {
    name: String,
    members: Vec<Alias>,
}

impl Group {
    pub fn new<S: Into<String>>(name: S, members: Vec<Alias>) -> Group {
        Group {
            name: name.into(),
            members,
        }
    }

    pub fn members(&self) -> &[Alias] {
        &self.members
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} members)", self.name, self.members.len())
    }
}

impl Buildable for Group {
    fn alias(&self) -> Alias {
        Alias::new("group", &self.name).unwrap()
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error> {
        ctx.depends_on(self.members.iter().cloned())?;
        Ok(())
    }
}
