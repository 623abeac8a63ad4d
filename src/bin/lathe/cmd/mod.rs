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
mod build;
mod clean;
mod graph;

use lathe::Error;
use structopt::StructOpt;

use crate::opts::GlobalOpts;

pub use self::build::Build;
pub use self::clean::Clean;
pub use self::graph::Graph;

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Builds the requested aliases (or everything).
    #[structopt(name = "build")]
    Build(Build),

    /// Prints the graph as DOT, or a dependency chain between two aliases.
    #[structopt(name = "graph")]
    Graph(Graph),

    /// Deletes generated output files and purges the database.
    #[structopt(name = "clean")]
    Clean(Clean),
}

impl Command {
    pub fn main(self, global: &GlobalOpts) -> Result<(), Error> {
        match self {
            Command::Build(cmd) => cmd.main(global),
            Command::Graph(cmd) => cmd.main(global),
            Command::Clean(cmd) => cmd.main(global),
        }
    }
}
