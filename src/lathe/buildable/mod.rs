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

mod custom;
mod dir;
mod file;
mod group;
mod traits;
mod write_file;

pub use self::custom::{register, Custom};
pub use self::dir::SourceDir;
pub use self::file::{digest_file, GeneratedFile, SourceFile};
pub use self::group::Group;
pub use self::traits::Buildable;
pub use self::write_file::WriteFile;

use std::fmt;
use std::path::Path;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::context::BuildContext;
use crate::error::Error;
use crate::fingerprint::Fingerprint;
use crate::stamp::BuildStamp;

/// Complete list of payload types. The enum tag in the archive dispatches
/// deserialization; new shapes are added here rather than through runtime
/// reflection. Arbitrary user actions plug in through the `Custom` variant
/// and its domain registry.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, From)]
#[serde(rename_all = "lowercase")]
pub enum Any {
    SourceFile(SourceFile),
    GeneratedFile(GeneratedFile),
    SourceDir(SourceDir),
    Group(Group),
    WriteFile(WriteFile),
    Custom(Custom),
}

impl Any {
    /// The path of this payload when it is a tracked *input* file. Graph
    /// roll-ups branch on this when collecting input files.
    pub fn source_path(&self) -> Option<&Path> {
        match self {
            Any::SourceFile(x) => Some(x.path()),
            _ => None,
        }
    }

    /// The path of this payload when it is a *generated* file.
    pub fn generated_path(&self) -> Option<&Path> {
        match self {
            Any::GeneratedFile(x) => Some(x.path()),
            _ => None,
        }
    }

    /// Stamps a file-backed payload in place: fresh stat plus content
    /// fingerprint, without scheduling its node. This is how output files
    /// are observed (see the output-file back-edge notes in the engine).
    pub fn digest(&self) -> Option<Result<BuildStamp, Error>> {
        match self {
            Any::SourceFile(x) => Some(x.digest()),
            Any::GeneratedFile(x) => Some(x.digest()),
            _ => None,
        }
    }

    /// The fingerprint of the payload's serialized shape. Cheap (no I/O);
    /// this is what `create` compares to decide whether a re-creation
    /// actually changed the node.
    pub fn shape_fingerprint(&self) -> Result<Fingerprint, Error> {
        crate::fingerprint::of(self)
    }
}

impl fmt::Display for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Any::SourceFile(x) => x.fmt(f),
            Any::GeneratedFile(x) => x.fmt(f),
            Any::SourceDir(x) => x.fmt(f),
            Any::Group(x) => x.fmt(f),
            Any::WriteFile(x) => x.fmt(f),
            Any::Custom(x) => x.fmt(f),
        }
    }
}

impl fmt::Debug for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Buildable for Any {
    fn alias(&self) -> Alias {
        match self {
            Any::SourceFile(x) => x.alias(),
            Any::GeneratedFile(x) => x.alias(),
            Any::SourceDir(x) => x.alias(),
            Any::Group(x) => x.alias(),
            Any::WriteFile(x) => x.alias(),
            Any::Custom(x) => x.alias(),
        }
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<(), Error> {
        match self {
            Any::SourceFile(x) => x.build(ctx),
            Any::GeneratedFile(x) => x.build(ctx),
            Any::SourceDir(x) => x.build(ctx),
            Any::Group(x) => x.build(ctx),
            Any::WriteFile(x) => x.build(ctx),
            Any::Custom(x) => x.build(ctx),
        }
    }

    fn content_fingerprint(&self) -> Result<Fingerprint, Error> {
        match self {
            Any::SourceFile(x) => x.content_fingerprint(),
            Any::GeneratedFile(x) => x.content_fingerprint(),
            Any::SourceDir(x) => x.content_fingerprint(),
            Any::Group(x) => x.content_fingerprint(),
            Any::WriteFile(x) => x.content_fingerprint(),
            Any::Custom(x) => x.content_fingerprint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_fidelity() {
        let payloads: Vec<Any> = vec![
            SourceFile::new("src/a.c").into(),
            GeneratedFile::new("out/a.o").into(),
            SourceDir::new("src").into(),
            Group::new("all", Vec::new()).into(),
            WriteFile::new("out/manifest", &b"m"[..]).into(),
        ];

        for payload in payloads {
            assert!(payload.alias().is_valid());
        }
    }

    #[test]
    fn shape_fingerprint_distinguishes_payloads() {
        let a: Any = Group::new("g", Vec::new()).into();
        let b: Any =
            Group::new("g", vec![Alias::file("x").unwrap()]).into();

        assert_ne!(
            a.shape_fingerprint().unwrap(),
            b.shape_fingerprint().unwrap()
        );
    }

    #[test]
    fn serde_roundtrip_preserves_tag() {
        let payload: Any = SourceFile::new("src/a.c").into();
        let bytes = bincode::serialize(&payload).unwrap();
        let back: Any = bincode::deserialize(&bytes).unwrap();
        assert_eq!(payload, back);
        assert_eq!(payload.alias(), back.alias());
    }
}
