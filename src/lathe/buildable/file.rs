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
use crate::fingerprint::Digester;
use crate::stamp::BuildStamp;
use crate::util::PathExt;

use super::traits::Buildable;

/// Stats the file and digests its contents in one pass. This is the in-place
/// stamp used for output files, where recursing into the node would create a
/// producer-depends-on-its-own-output cycle.
pub fn digest_file(path: &Path) -> Result<BuildStamp, Error> {
    let metadata = fs::metadata(path)
        .with_context(|_| format!("could not stat {:?}", path))?;

    let mod_time: DateTime<Utc> = metadata
        .modified()
        .with_context(|_| format!("no modification time for {:?}", path))?
        .into();

    let fingerprint = Digester::from_path(path)
        .with_context(|_| format!("could not read {:?}", path))?;

    Ok(BuildStamp::new(mod_time, fingerprint))
}

/// A source file: an input the build system tracks but does not own.
#[derive(
    Serialize, Deserialize, Clone, Ord, PartialOrd, Eq, PartialEq, Hash,
)]
pub struct SourceFile {
    source: PathBuf,
}

impl SourceFile {
    pub fn new<P: AsRef<Path>>(path: P) -> SourceFile {
        SourceFile {
            source: path.as_ref().normalize(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.source
    }

    pub fn digest(&self) -> Result<BuildStamp, Error> {
        digest_file(&self.source)
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.display())
    }
}

impl Buildable for SourceFile {
    fn alias(&self) -> Alias {
        // Normalized paths always make a valid alias name.
        Alias::file(&self.source).unwrap()
    }

    /// Building a source file is observing it: a missing or unreadable file
    /// fails the build, which in turn fails whoever depended on it.
    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error> {
        let metadata = fs::metadata(&self.source).with_context(|_| {
            format!("could not stat source file {:?}", self.source)
        })?;

        let mod_time: DateTime<Utc> = metadata
            .modified()
            .with_context(|_| {
                format!("no modification time for {:?}", self.source)
            })?
            .into();

        ctx.timestamp(mod_time);
        Ok(())
    }

    fn content_fingerprint(&self) -> Result<crate::Fingerprint, Error> {
        Ok(Digester::from_path(&self.source).with_context(|_| {
            format!("could not read source file {:?}", self.source)
        })?)
    }
}

/// A generated file: an output some node produces. Unlike a source file it
/// is owned by the build system, but its on-disk observation is identical.
#[derive(
    Serialize, Deserialize, Clone, Ord, PartialOrd, Eq, PartialEq, Hash,
)]
pub struct GeneratedFile {
    generated: PathBuf,
}

impl GeneratedFile {
    pub fn new<P: AsRef<Path>>(path: P) -> GeneratedFile {
        GeneratedFile {
            generated: path.as_ref().normalize(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.generated
    }

    pub fn digest(&self) -> Result<BuildStamp, Error> {
        digest_file(&self.generated)
    }
}

impl fmt::Display for GeneratedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.generated.display())
    }
}

impl Buildable for GeneratedFile {
    fn alias(&self) -> Alias {
        Alias::generated(&self.generated).unwrap()
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error> {
        let metadata =
            fs::metadata(&self.generated).with_context(|_| {
                format!(
                    "could not stat generated file {:?}; was its producer \
                     built?",
                    self.generated
                )
            })?;

        let mod_time: DateTime<Utc> = metadata
            .modified()
            .with_context(|_| {
                format!("no modification time for {:?}", self.generated)
            })?
            .into();

        ctx.timestamp(mod_time);
        Ok(())
    }

    fn content_fingerprint(&self) -> Result<crate::Fingerprint, Error> {
        Ok(Digester::from_path(&self.generated).with_context(|_| {
            format!("could not read generated file {:?}", self.generated)
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_identity() {
        assert_eq!(
            SourceFile::new("./foo/..//bar/").alias(),
            SourceFile::new("bar").alias()
        );
    }

    #[test]
    fn digest_reflects_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");

        fs::write(&path, b"hello").unwrap();
        let a = digest_file(&path).unwrap();

        fs::write(&path, b"hello!").unwrap();
        let b = digest_file(&path).unwrap();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn digest_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(digest_file(&dir.path().join("nope")).is_err());
    }
}
