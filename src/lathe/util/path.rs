// Copyright (c) 2018 The lathe developers
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

use std::path::{Component, Path, PathBuf};

pub trait PathExt {
    /// Returns a normalized path. This does not touch the file system at
    /// all. Aliases are derived from normalized paths, so two spellings of
    /// the same file must normalize identically.
    fn normalize(&self) -> PathBuf;
}

impl PathExt for Path {
    fn normalize(&self) -> PathBuf {
        let mut new_path = PathBuf::new();

        for c in self.components() {
            match c {
                Component::CurDir => {}
                Component::ParentDir => {
                    let pop = match new_path.components().next_back() {
                        Some(Component::Prefix(_))
                        | Some(Component::RootDir) => true,
                        Some(Component::Normal(s)) => !s.is_empty(),
                        _ => false,
                    };

                    if pop {
                        new_path.pop();
                    } else {
                        new_path.push("..");
                    }
                }
                _ => {
                    new_path.push(c.as_os_str());
                }
            };
        }

        if new_path.as_os_str().is_empty() {
            new_path.push(".");
        }

        new_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm() {
        assert_eq!(Path::new("foo").normalize(), Path::new("foo"));
        assert_eq!(Path::new("./foo").normalize(), Path::new("foo"));
        assert_eq!(Path::new(".").normalize(), Path::new("."));
        assert_eq!(Path::new("..").normalize(), Path::new(".."));
        assert_eq!(Path::new("../..").normalize(), Path::new("../.."));
        assert_eq!(Path::new("").normalize(), Path::new("."));
        assert_eq!(Path::new("foo/bar").normalize(), Path::new("foo/bar"));
        assert_eq!(Path::new("/foo/../bar").normalize(), Path::new("/bar"));
        assert_eq!(Path::new("/../bar").normalize(), Path::new("/bar"));
        assert_eq!(Path::new("foo//bar///").normalize(), Path::new("foo/bar"));
        assert_eq!(
            Path::new("../foo/../../bar").normalize(),
            Path::new("../../bar")
        );
    }
}
