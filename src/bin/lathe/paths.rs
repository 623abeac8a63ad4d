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
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::opts::GlobalOpts;

/// The compressed binary graph archive.
pub const DB: &str = "lathe-cache.db";

/// User-tunable flags, loaded before the graph and saved at exit iff
/// modified.
pub const CONFIG: &str = "lathe-config.json";

/// The project root: `--root-dir`, or the current directory.
pub fn root(global: &GlobalOpts) -> PathBuf {
    global
        .root_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Where persisted state lives: `--output-dir`, or `.lathe` under the root.
pub fn output_dir(global: &GlobalOpts) -> PathBuf {
    global
        .output_dir
        .clone()
        .unwrap_or_else(|| root(global).join(".lathe"))
}

/// Ensures the output directory exists.
pub fn init(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}
