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
use std::sync::Arc;

use structopt::StructOpt;

use lathe::{Alias, Database, DatabaseOptions, Error};

use crate::opts::GlobalOpts;
use crate::paths;

#[derive(StructOpt, Debug)]
pub struct Graph {
    /// Prints the shortest dependency chain from SRC to DST instead of
    /// dumping the whole graph.
    #[structopt(
        long = "chain",
        number_of_values = 2,
        value_names = &["SRC", "DST"]
    )]
    chain: Option<Vec<String>>,
}

impl Graph {
    pub fn main(self, global: &GlobalOpts) -> Result<(), Error> {
        let out = paths::output_dir(global);

        let (_db, graph) = Database::open(
            out.join(paths::DB),
            DatabaseOptions::default(),
        )?;

        let graph = Arc::new(graph);
        let port = graph.read_port();

        match self.chain {
            Some(endpoints) => {
                let src: Alias = endpoints[0].parse()?;
                let dst: Alias = endpoints[1].parse()?;

                for (alias, dep_type) in port.dependency_chain(&src, &dst)?
                {
                    println!("{:>12}  {}", dep_type.to_string(), alias);
                }
            }
            None => {
                println!("digraph lathe {{");

                port.range(|alias, node| {
                    for dep in node.static_dependencies() {
                        println!(
                            "  \"{}\" -> \"{}\";",
                            alias, dep.alias
                        );
                    }

                    for dep in node.dynamic_dependencies() {
                        println!(
                            "  \"{}\" -> \"{}\" [style=dashed];",
                            alias, dep.alias
                        );
                    }

                    for dep in node.output_file_dependencies() {
                        println!(
                            "  \"{}\" -> \"{}\" [color=gray];",
                            alias, dep.alias
                        );
                    }

                    for out in node.output_node_aliases() {
                        println!(
                            "  \"{}\" -> \"{}\" [color=gray, \
                             style=dashed];",
                            alias, out
                        );
                    }

                    Ok(())
                })?;

                println!("}}");
            }
        }

        Ok(())
    }
}
