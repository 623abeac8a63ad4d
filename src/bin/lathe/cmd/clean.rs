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
use std::sync::Arc;

use log::info;
use structopt::StructOpt;

use lathe::{Database, DatabaseOptions, Error, ResultExt};

use crate::opts::GlobalOpts;
use crate::paths;

#[derive(StructOpt, Debug)]
pub struct Clean {
    /// Doesn't delete anything. Just prints what would be deleted.
    #[structopt(short = "n", long = "dryrun")]
    dryrun: bool,
}

impl Clean {
    pub fn main(self, global: &GlobalOpts) -> Result<(), Error> {
        let out = paths::output_dir(global);

        let (mut db, graph) = Database::open(
            out.join(paths::DB),
            DatabaseOptions {
                tolerant: true,
                ..DatabaseOptions::default()
            },
        )?;

        let graph = Arc::new(graph);

        let files = {
            let port = graph.read_port();
            let aliases = port.aliases();
            port.dependency_output_files(&aliases)?
        };

        // Deepest paths first, so files disappear before anything that
        // contains them.
        for path in files.iter().rev() {
            info!("deleting {:?}", path);

            if self.dryrun {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {}
                Err(ref err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(Error::from(err)
                        .context(format!("could not delete {:?}", path))
                        .into());
                }
            }
        }

        if !self.dryrun {
            graph.purge();
            db.save(&graph)?;
        }

        Ok(())
    }
}
