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

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::fingerprint::Fingerprint;

/// Times are persisted as whole milliseconds, so every stamp is rounded down
/// to the millisecond the moment it is constructed. A stamp that survives a
/// save/load cycle must compare equal to the one that was written.
mod millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(
        time: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(time.timestamp_millis())
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = i64::deserialize(deserializer)?;
        Ok(Utc.timestamp_millis(ms))
    }
}

fn round_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis(time.timestamp_millis())
}

/// The record of a successful build: the modification time that was observed
/// (or chosen by the action) and the content fingerprint at that moment. Two
/// stamps are equal iff both fields are equal; "has this changed?" is stamp
/// inequality and nothing more.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash)]
pub struct BuildStamp {
    #[serde(with = "millis")]
    mod_time: DateTime<Utc>,
    fingerprint: Fingerprint,
}

impl BuildStamp {
    pub fn new(mod_time: DateTime<Utc>, fingerprint: Fingerprint) -> Self {
        BuildStamp {
            mod_time: round_to_millis(mod_time),
            fingerprint,
        }
    }

    /// The stamp of a node that has never been built (or whose last build
    /// failed): epoch time and a zero fingerprint.
    pub fn invalid() -> BuildStamp {
        BuildStamp {
            mod_time: Utc.timestamp_millis(0),
            fingerprint: Fingerprint::zero(),
        }
    }

    pub fn mod_time(&self) -> DateTime<Utc> {
        self.mod_time
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// A stamp is valid iff its fingerprint is valid. A node whose stamp is
    /// invalid is dirty by definition.
    pub fn is_valid(&self) -> bool {
        self.fingerprint.is_valid()
    }
}

impl Default for BuildStamp {
    fn default() -> BuildStamp {
        BuildStamp::invalid()
    }
}

impl fmt::Display for BuildStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.fingerprint, self.mod_time.to_rfc3339())
    }
}

impl fmt::Debug for BuildStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// The last observed stamp of a neighbor. The neighbor is up-to-date with
/// respect to the owning node iff its current stamp equals this one.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct BuildDependency {
    pub alias: Alias,
    pub stamp: BuildStamp,
}

impl BuildDependency {
    pub fn new(alias: Alias, stamp: BuildStamp) -> BuildDependency {
        BuildDependency { alias, stamp }
    }

    /// A dependency whose stamp has not been observed yet. Guarantees the
    /// owning node is considered dirty until its next build.
    pub fn unstamped(alias: Alias) -> BuildDependency {
        BuildDependency {
            alias,
            stamp: BuildStamp::invalid(),
        }
    }
}

/// The flavor of an edge. `Root` never appears on a node; it marks the
/// destination entry of a `dependency_chain` result.
#[derive(
    Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Hash, Debug,
)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Static,
    Dynamic,
    OutputFile,
    OutputNode,
    Root,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyType::Static => write!(f, "static"),
            DependencyType::Dynamic => write!(f, "dynamic"),
            DependencyType::OutputFile => write!(f, "output file"),
            DependencyType::OutputNode => write!(f, "output node"),
            DependencyType::Root => write!(f, "root"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint;

    #[test]
    fn rounds_to_millis() {
        let now = Utc::now();
        let stamp =
            BuildStamp::new(now, fingerprint::of(&"payload").unwrap());

        assert_eq!(stamp.mod_time().timestamp_subsec_micros() % 1000, 0);
        assert_eq!(
            stamp.mod_time().timestamp_millis(),
            now.timestamp_millis()
        );
    }

    #[test]
    fn equality_is_both_fields() {
        let t = Utc.timestamp_millis(1_500_000_000_000);
        let fp = fingerprint::of(&"a").unwrap();

        let a = BuildStamp::new(t, fp.clone());
        let b = BuildStamp::new(t, fp.clone());
        assert_eq!(a, b);

        let c = BuildStamp::new(t, fingerprint::of(&"b").unwrap());
        assert_ne!(a, c);

        let d = BuildStamp::new(t + chrono::Duration::milliseconds(1), fp);
        assert_ne!(a, d);
    }

    #[test]
    fn invalid_stamp() {
        assert!(!BuildStamp::invalid().is_valid());
        assert!(BuildStamp::new(
            Utc::now(),
            fingerprint::of(&"x").unwrap()
        )
        .is_valid());
    }

    #[test]
    fn binary_roundtrip() {
        let stamp = BuildStamp::new(
            Utc::now(),
            fingerprint::of(&"roundtrip").unwrap(),
        );

        let bytes = bincode::serialize(&stamp).unwrap();
        let back: BuildStamp = bincode::deserialize(&bytes).unwrap();

        assert_eq!(stamp, back);
    }
}
