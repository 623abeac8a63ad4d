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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::context::BuildContext;
use crate::error::{Error, ResultExt};
use crate::fingerprint::{Digester, Fingerprint};
use crate::util::PathExt;

use super::traits::Buildable;

/// A tracked source directory. Its content is the sorted list of entry
/// names, so adding or removing a file changes its stamp while touching a
/// file inside does not.
#[derive(
    Serialize, Deserialize, Clone, Ord, PartialOrd, Eq, PartialEq, Hash,
)]
pub struct SourceDir {
    dir: PathBuf,
}

impl SourceDir {
    pub fn new<P: AsRef<Path>>(path: P) -> SourceDir {
        SourceDir {
            dir: path.as_ref().normalize(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn listing_fingerprint(&self) -> Result<Fingerprint, Error> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir).with_context(|_| {
            format!("could not list directory {:?}", self.dir)
        })? {
            names.push(entry?.file_name());
        }

        // Directory iteration order depends on the file system, so sort to
        // eliminate that source of non-determinism.
        names.sort();

        let mut digester = Digester::new();

        for name in names {
            if let Some(name) = name.to_str() {
                digester.update(name.as_bytes());
                digester.update(b"\0");
            }
        }

        Ok(digester.finish())
    }
}

impl fmt::Display for SourceDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.dir.display())
    }
}

impl Buildable for SourceDir {
    fn alias(&self) -> Alias {
        Alias::dir(&self.dir).unwrap()
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error> {
        let metadata = fs::metadata(&self.dir).with_context(|_| {
            format!("could not stat directory {:?}", self.dir)
        })?;

        let mod_time: DateTime<Utc> = metadata
            .modified()
            .with_context(|_| {
                format!("no modification time for {:?}", self.dir)
            })?
            .into();

        ctx.timestamp(mod_time);
        Ok(())
    }

    fn content_fingerprint(&self) -> Result<Fingerprint, Error> {
        self.listing_fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_changes_with_entries() {
        let dir = tempfile::tempdir().unwrap();
        let src = SourceDir::new(dir.path());

        let empty = src.content_fingerprint().unwrap();

        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let one = src.content_fingerprint().unwrap();
        assert_ne!(empty, one);

        // Touching content does not change the listing.
        fs::write(dir.path().join("a.txt"), b"yy").unwrap();
        assert_eq!(one, src.content_fingerprint().unwrap());
    }
}
