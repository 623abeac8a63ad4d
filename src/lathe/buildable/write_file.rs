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
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::context::BuildContext;
use crate::error::{Error, ResultExt};
use crate::util::PathExt;

use super::traits::Buildable;

/// The simplest producing action: write a blob of bytes to a file and
/// declare the file as an output. Useful for generated config, manifests,
/// and as the canonical example of the output-file protocol.
#[derive(
    Serialize, Deserialize, Clone, Ord, PartialOrd, Eq, PartialEq, Hash,
)]
pub struct WriteFile {
    dest: PathBuf,
    contents: Vec<u8>,
}

impl WriteFile {
    pub fn new<P, B>(dest: P, contents: B) -> WriteFile
    where
        P: AsRef<Path>,
        B: Into<Vec<u8>>,
    {
        WriteFile {
            dest: dest.as_ref().normalize(),
            contents: contents.into(),
        }
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

impl fmt::Display for WriteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "write {} bytes to {}",
            self.contents.len(),
            self.dest.display()
        )
    }
}

impl Buildable for WriteFile {
    fn alias(&self) -> Alias {
        Alias::new("do", &self.dest.to_string_lossy()).unwrap()
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error> {
        if let Some(parent) = self.dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|_| {
                    format!("could not create directory {:?}", parent)
                })?;
            }
        }

        fs::write(&self.dest, &self.contents).with_context(|_| {
            format!("could not write {:?}", self.dest)
        })?;

        ctx.output_file(&self.dest)?;
        Ok(())
    }
}
