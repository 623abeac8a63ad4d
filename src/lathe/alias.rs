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
use std::path::Path;
use std::str::FromStr;

use failure::Fail;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// The canonical name of a buildable entity, displayed as `domain://name`.
///
/// Aliases are the primary key of the graph. The same concrete object must
/// always map to the same alias, no matter how many times it is re-created.
/// Comparison is lexicographic on (domain, name).
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Alias {
    domain: String,
    name: String,
}

#[derive(Fail, Debug, Clone, Eq, PartialEq)]
#[fail(display = "invalid alias '{}': {}", text, reason)]
pub struct InvalidAlias {
    pub text: String,
    pub reason: &'static str,
}

/// Normalizes an alias name: backslashes become forward slashes and runs of
/// slashes collapse to one. A single leading slash survives so that absolute
/// and relative file names stay distinct.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());

    for c in name.chars() {
        let c = if c == '\\' { '/' } else { c };

        if c == '/' && out.ends_with('/') {
            continue;
        }

        out.push(c);
    }

    // A trailing separator never changes identity.
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }

    out
}

impl Alias {
    /// Creates an alias. Both the domain and the sanitized name must be
    /// non-empty.
    pub fn new<D, N>(domain: D, name: N) -> Result<Alias, InvalidAlias>
    where
        D: Into<String>,
        N: AsRef<str>,
    {
        let domain = domain.into();
        let name = sanitize(name.as_ref());

        if domain.is_empty() {
            return Err(InvalidAlias {
                text: format!("://{}", name),
                reason: "empty domain",
            });
        }

        if name.is_empty() || name == "/" {
            return Err(InvalidAlias {
                text: format!("{}://", domain),
                reason: "empty name",
            });
        }

        Ok(Alias { domain, name })
    }

    /// The alias of a source file on disk.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Alias, InvalidAlias> {
        Alias::new("file", path.as_ref().to_string_lossy())
    }

    /// The alias of a generated (output) file.
    pub fn generated<P: AsRef<Path>>(path: P) -> Result<Alias, InvalidAlias> {
        Alias::new("gen", path.as_ref().to_string_lossy())
    }

    /// The alias of a tracked source directory.
    pub fn dir<P: AsRef<Path>>(path: P) -> Result<Alias, InvalidAlias> {
        Alias::new("dir", path.as_ref().to_string_lossy())
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// An alias is valid iff both its domain and name are non-empty. The
    /// constructors uphold this; deserialized data is re-checked.
    pub fn is_valid(&self) -> bool {
        !self.domain.is_empty() && !self.name.is_empty()
    }
}

impl FromStr for Alias {
    type Err = InvalidAlias;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.find("://") {
            Some(i) => Alias::new(&s[..i], &s[i + 3..]),
            None => Err(InvalidAlias {
                text: s.to_string(),
                reason: "missing '://' separator",
            }),
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.domain, self.name)
    }
}

impl fmt::Debug for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.domain, self.name)
    }
}

impl Serialize for Alias {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Alias {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        let alias: Alias = "file://src/main.c".parse().unwrap();
        assert_eq!(alias.domain(), "file");
        assert_eq!(alias.name(), "src/main.c");
        assert_eq!(alias.to_string(), "file://src/main.c");
    }

    #[test]
    fn parse_invalid() {
        assert!("no-separator".parse::<Alias>().is_err());
        assert!("://name".parse::<Alias>().is_err());
        assert!("domain://".parse::<Alias>().is_err());
        assert!("domain:////".parse::<Alias>().is_err());
    }

    #[test]
    fn sanitized() {
        let a = Alias::new("file", r"src\foo\\bar").unwrap();
        let b = Alias::new("file", "src/foo/bar/").unwrap();
        assert_eq!(a, b);

        // Absolute and relative names stay distinct.
        let abs = Alias::new("file", "/etc/hosts").unwrap();
        let rel = Alias::new("file", "etc/hosts").unwrap();
        assert_ne!(abs, rel);
    }

    #[test]
    fn ordering() {
        let a = Alias::new("dir", "zzz").unwrap();
        let b = Alias::new("file", "aaa").unwrap();
        let c = Alias::new("file", "bbb").unwrap();

        // Domain dominates, then the name.
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn stable_for_same_object() {
        assert_eq!(
            Alias::file("src/./main.c//").unwrap(),
            Alias::file("src/./main.c").unwrap()
        );
    }
}
