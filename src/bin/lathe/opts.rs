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
use std::path::PathBuf;
use std::str::FromStr;

use structopt::StructOpt;
use termcolor as tc;

#[derive(Debug, Clone, Copy)]
pub enum Coloring {
    Auto,
    Always,
    Never,
}

impl FromStr for Coloring {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Coloring::Auto),
            "always" => Ok(Coloring::Always),
            "never" => Ok(Coloring::Never),
            _ => Err(format!(
                "invalid color '{}' (expected auto, always, or never)",
                s
            )),
        }
    }
}

impl From<Coloring> for tc::ColorChoice {
    fn from(c: Coloring) -> tc::ColorChoice {
        match c {
            Coloring::Auto => tc::ColorChoice::Auto,
            Coloring::Always => tc::ColorChoice::Always,
            Coloring::Never => tc::ColorChoice::Never,
        }
    }
}

#[derive(StructOpt, Debug)]
pub struct GlobalOpts {
    /// Print less. Twice prints only errors.
    #[structopt(
        short = "q",
        long = "quiet",
        parse(from_occurrences),
        global = true
    )]
    pub quiet: usize,

    /// Print more. Twice enables trace output.
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        global = true
    )]
    pub verbose: usize,

    /// When to colorize the output.
    #[structopt(long = "color", default_value = "auto", global = true)]
    pub color: Coloring,

    /// The project root. Defaults to the current directory.
    #[structopt(long = "root-dir", parse(from_os_str), global = true)]
    pub root_dir: Option<PathBuf>,

    /// Where the database and config live. Defaults to `.lathe` under the
    /// root.
    #[structopt(long = "output-dir", parse(from_os_str), global = true)]
    pub output_dir: Option<PathBuf>,
}

impl GlobalOpts {
    pub fn log_level(&self) -> log::LevelFilter {
        match (self.quiet, self.verbose) {
            (q, _) if q >= 2 => log::LevelFilter::Error,
            (1, _) => log::LevelFilter::Warn,
            (_, 0) => log::LevelFilter::Info,
            (_, 1) => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
