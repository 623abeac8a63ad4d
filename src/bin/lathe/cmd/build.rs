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
use std::io::Write;
use std::sync::{mpsc, Arc};
use std::thread;

use structopt::StructOpt;
use termcolor::{self as tc, WriteColor};

use lathe::events::{Event, NodeOutcome, Timestamped};
use lathe::{
    Alias, BuildOptions, Compression, Config, Database, DatabaseOptions,
    Error, PortOptions, ResultExt,
};

use crate::opts::GlobalOpts;
use crate::paths;

#[derive(StructOpt, Debug)]
pub struct Build {
    /// The aliases to build, as `domain://name`. Builds every node in the
    /// graph when omitted.
    aliases: Vec<String>,

    /// Rebuilds the requested aliases even when they are up to date.
    #[structopt(short = "f", long = "force")]
    force: bool,

    /// Empties the database after loading it, forcing a full rebuild.
    #[structopt(short = "F", long = "purge")]
    purge: bool,

    /// The number of worker threads. Defaults to the number of logical
    /// cores minus one; zero builds serially on this thread.
    #[structopt(short = "j", long = "threads")]
    threads: Option<usize>,

    /// Prints per-node timing after the build.
    #[structopt(long = "summary")]
    summary: bool,

    /// Compresses the database with zstd at the given level instead of
    /// the default lz4.
    #[structopt(long = "zstd", value_name = "level")]
    zstd: Option<i32>,
}

impl Build {
    pub fn main(self, global: &GlobalOpts) -> Result<(), Error> {
        let out = paths::output_dir(global);
        paths::init(&out)
            .context("failed initializing the output directory")?;

        let mut config = Config::load(out.join(paths::CONFIG))?;

        let threads = self.threads.unwrap_or_else(|| {
            config
                .get("build", "threads")
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(lathe::pool::default_threads)
        });

        if let Some(threads) = self.threads {
            config.set("build", "threads", threads.to_string());
        }

        let compression = match self.zstd {
            Some(level) => Compression::Zstd(level),
            None => Compression::Lz4,
        };

        let force = self.force || self.purge;

        let (mut db, graph) = Database::open(
            out.join(paths::DB),
            DatabaseOptions {
                compression,
                // Forcing a rebuild anyway, so an unreadable database is
                // not worth failing over.
                tolerant: force,
            },
        )?;

        let graph = Arc::new(graph);

        if self.purge {
            graph.purge();
        }

        let events = graph.subscribe();
        let color: tc::ColorChoice = global.color.into();
        let printer = thread::spawn(move || print_events(events, color));

        let result = {
            let port = graph.write_port(PortOptions { threads })?;

            let aliases = if self.aliases.is_empty() {
                port.graph().aliases()
            } else {
                self.aliases
                    .iter()
                    .map(|s| s.parse::<Alias>().map_err(Error::from))
                    .collect::<Result<Vec<_>, _>>()?
            };

            let opts = BuildOptions::new().force(force);
            port.build_many(&aliases, &opts);
            let result = port.join();

            if self.summary {
                print_summary(&port.summary());
            }

            result
        };

        // The port is closed; the end-of-graph event stops the printer.
        let _ = printer.join();

        db.save(&graph)?;
        config.save()?;

        result
    }
}

/// Renders the engine's event stream to stderr until the session ends.
fn print_events(
    events: mpsc::Receiver<Timestamped<Event>>,
    color: tc::ColorChoice,
) {
    let mut stderr = tc::StandardStream::stderr(color);

    let mut green = tc::ColorSpec::new();
    green.set_fg(Some(tc::Color::Green)).set_bold(true);

    let mut red = tc::ColorSpec::new();
    red.set_fg(Some(tc::Color::Red)).set_bold(true);

    while let Ok(event) = events.recv() {
        match event.into_inner() {
            Event::EndNode {
                alias,
                outcome,
                duration,
                error,
            } => match outcome {
                NodeOutcome::Built => {
                    let _ = stderr.set_color(&green);
                    let _ = write!(&mut stderr, "    Built");
                    let _ = stderr.reset();
                    let _ = writeln!(
                        &mut stderr,
                        " {} ({})",
                        alias,
                        humantime::format_duration(duration)
                    );
                }
                NodeOutcome::Failed => {
                    let _ = stderr.set_color(&red);
                    let _ = write!(&mut stderr, "   Failed");
                    let _ = stderr.reset();
                    let _ = writeln!(
                        &mut stderr,
                        " {}: {}",
                        alias,
                        error.unwrap_or_default()
                    );
                }
                NodeOutcome::UpToDate => {
                    log::debug!("{} is up to date", alias);
                }
            },
            Event::EndGraph { failures } => {
                if failures > 0 {
                    let _ = stderr.set_color(&red);
                    let _ = write!(&mut stderr, "    Error");
                    let _ = stderr.reset();
                    let _ = writeln!(
                        &mut stderr,
                        " build finished with {} failed node(s)",
                        failures
                    );
                }

                break;
            }
            _ => {}
        }
    }
}

fn print_summary(summary: &[(Alias, lathe::BuildStats)]) {
    println!("Slowest nodes (exclusive / inclusive):");

    for (alias, stats) in summary.iter().take(10) {
        println!(
            "  {:>9} / {:>9}  {}",
            format!("{}", humantime::format_duration(stats.exclusive)),
            format!("{}", humantime::format_duration(stats.inclusive)),
            alias
        );

        for note in &stats.annotations {
            println!("             - {}", note);
        }
    }
}
