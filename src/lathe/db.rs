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

//! The on-disk database: a compressed binary archive of the node table,
//! written deterministically (nodes sorted by alias) so that identical
//! graphs produce identical files.
//!
//! The database file doubles as a cross-process mutex: an advisory lock is
//! taken before loading, and a second process pointed at the same file is
//! rejected with a clear error. Saving truncates and rewrites the same file
//! under that lock.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{
    CorruptDatabase, DatabaseLocked, Error, ResultExt,
};
use crate::fingerprint::{self, Fingerprint};
use crate::graph::Graph;
use crate::node::NodeRecord;

const MAGIC: &[u8; 4] = b"LTH1";
const FORMAT_VERSION: u32 = 1;

/// The compression applied to the node table. LZ4 is the fast default;
/// ZSTD trades speed for size, with a tunable level.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None,
    Lz4,
    Zstd(i32),
}

impl Default for Compression {
    fn default() -> Compression {
        Compression::Lz4
    }
}

impl Compression {
    fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
            Compression::Zstd(_) => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Compression> {
        match tag {
            0 => Some(Compression::None),
            1 => Some(Compression::Lz4),
            2 => Some(Compression::Zstd(0)),
            _ => None,
        }
    }
}

/// Everything that precedes the node table. The seed ties the archive to a
/// compatible binary: stamps hashed with a different seed are useless, so
/// such an archive is not worth loading.
#[derive(Serialize, Deserialize)]
struct Header {
    format: u32,
    version: String,
    seed: Fingerprint,
    compression: u8,
}

#[derive(Clone, Debug, Default)]
pub struct DatabaseOptions {
    pub compression: Compression,

    /// Downgrade unknown or incompatible archives into "load nothing, mark
    /// dirty" instead of failing. In effect when the caller forces a
    /// rebuild anyway.
    pub tolerant: bool,
}

/// A handle to the database file. Holds the advisory lock for its entire
/// lifetime; dropping it releases the lock.
pub struct Database {
    path: PathBuf,
    file: fs::File,
    options: DatabaseOptions,
}

impl Database {
    /// Locks and loads the database, creating an empty one if the file did
    /// not exist. Returns the handle and the loaded graph.
    pub fn open<P: AsRef<Path>>(
        path: P,
        options: DatabaseOptions,
    ) -> Result<(Database, Graph), Error> {
        let path = path.as_ref().to_path_buf();

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .with_context(|_| {
                format!("could not open build database {:?}", path)
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(DatabaseLocked { path }.into());
        }

        let len = file
            .metadata()
            .with_context(|_| format!("could not stat {:?}", path))?
            .len();

        let mut db = Database {
            path,
            file,
            options,
        };

        let graph = if len == 0 {
            // A brand new database.
            Graph::new()
        } else {
            match db.load() {
                Ok(graph) => graph,
                Err(err) => {
                    if !db.options.tolerant {
                        return Err(err);
                    }

                    warn!(
                        "discarding build database {:?}: {}",
                        db.path, err
                    );

                    let graph = Graph::new();
                    graph.mark_dirty();
                    graph
                }
            }
        };

        Ok((db, graph))
    }

    fn load(&mut self) -> Result<Graph, Error> {
        self.file
            .seek(SeekFrom::Start(0))
            .context("could not seek build database")?;

        let mut reader = io::BufReader::new(&mut self.file);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .context("could not read archive magic")?;

        if magic != *MAGIC {
            return Err(CorruptDatabase {
                reason: "bad magic; not a build database".to_string(),
            }
            .into());
        }

        let header: Header = bincode::deserialize_from(&mut reader)
            .map_err(|err| CorruptDatabase {
                reason: format!("unreadable header: {}", err),
            })?;

        if header.format != FORMAT_VERSION {
            return Err(CorruptDatabase {
                reason: format!(
                    "format version {} (expected {})",
                    header.format, FORMAT_VERSION
                ),
            }
            .into());
        }

        if header.version != env!("CARGO_PKG_VERSION") {
            return Err(CorruptDatabase {
                reason: format!(
                    "written by version {} (this is {})",
                    header.version,
                    env!("CARGO_PKG_VERSION")
                ),
            }
            .into());
        }

        if header.seed != fingerprint::seed() {
            return Err(CorruptDatabase {
                reason: "written by an incompatible binary (seed \
                         mismatch)"
                    .to_string(),
            }
            .into());
        }

        let compression = Compression::from_tag(header.compression)
            .ok_or_else(|| CorruptDatabase {
                reason: format!(
                    "unknown compression tag {}",
                    header.compression
                ),
            })?;

        let records: Vec<NodeRecord> = match compression {
            Compression::None => bincode::deserialize_from(&mut reader),
            Compression::Lz4 => bincode::deserialize_from(
                lz4_flex::frame::FrameDecoder::new(&mut reader),
            ),
            Compression::Zstd(_) => bincode::deserialize_from(
                zstd::stream::Decoder::new(&mut reader)
                    .context("could not start zstd decoder")?,
            ),
        }
        .map_err(|err| CorruptDatabase {
            reason: format!("unreadable node table: {}", err),
        })?;

        Graph::thaw(records)
    }

    /// Saves the graph if (and only if) it needs it.
    ///
    /// Skips when nothing diverged from disk, and refuses when a build
    /// action panicked this process (the graph may be half-consistent).
    /// Returns whether a write actually happened.
    pub fn save(&mut self, graph: &Graph) -> Result<bool, Error> {
        if graph.is_poisoned() {
            warn!(
                "not saving {:?}: a build action panicked",
                self.path
            );
            return Ok(false);
        }

        if !graph.is_dirty() {
            return Ok(false);
        }

        let records = graph.freeze();

        self.file
            .set_len(0)
            .context("could not truncate build database")?;
        self.file
            .seek(SeekFrom::Start(0))
            .context("could not seek build database")?;

        {
            let mut writer = io::BufWriter::new(&mut self.file);

            writer
                .write_all(MAGIC)
                .context("could not write archive magic")?;

            let header = Header {
                format: FORMAT_VERSION,
                version: env!("CARGO_PKG_VERSION").to_string(),
                seed: fingerprint::seed(),
                compression: self.options.compression.tag(),
            };

            bincode::serialize_into(&mut writer, &header)
                .context("could not write archive header")?;

            match self.options.compression {
                Compression::None => {
                    bincode::serialize_into(&mut writer, &records)
                        .context("could not write node table")?;
                }
                Compression::Lz4 => {
                    let mut encoder =
                        lz4_flex::frame::FrameEncoder::new(&mut writer);
                    bincode::serialize_into(&mut encoder, &records)
                        .context("could not write node table")?;
                    encoder
                        .finish()
                        .context("could not finish lz4 stream")?;
                }
                Compression::Zstd(level) => {
                    let mut encoder =
                        zstd::stream::Encoder::new(&mut writer, level)
                            .context("could not start zstd encoder")?;
                    bincode::serialize_into(&mut encoder, &records)
                        .context("could not write node table")?;
                    encoder
                        .finish()
                        .context("could not finish zstd stream")?;
                }
            }

            writer.flush().context("could not flush build database")?;
        }

        self.file
            .sync_all()
            .context("could not sync build database")?;

        graph.clear_dirty();
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::buildable::Group;

    fn sample_graph() -> Graph {
        let graph = Graph::new();
        let dep = Alias::new("file", "src/a.c").unwrap();

        graph
            .create(Group::new("all", vec![dep.clone()]).into(), vec![dep])
            .unwrap();

        for i in 0..9 {
            graph
                .create(
                    Group::new(format!("t{}", i), Vec::new()).into(),
                    Vec::new(),
                )
                .unwrap();
        }

        graph
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lathe-cache.db");

        let graph = sample_graph();
        let frozen = graph.freeze();

        {
            let (mut db, _) =
                Database::open(&path, DatabaseOptions::default()).unwrap();
            assert!(db.save(&graph).unwrap());
            assert!(!graph.is_dirty());
        }

        let (_db, loaded) =
            Database::open(&path, DatabaseOptions::default()).unwrap();

        assert_eq!(loaded.aliases(), graph.aliases());
        assert_eq!(
            bincode::serialize(&loaded.freeze()).unwrap(),
            bincode::serialize(&frozen).unwrap()
        );
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn roundtrip_all_compressions() {
        for compression in
            &[Compression::None, Compression::Lz4, Compression::Zstd(3)]
        {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("lathe-cache.db");

            let graph = sample_graph();

            {
                let (mut db, _) = Database::open(
                    &path,
                    DatabaseOptions {
                        compression: *compression,
                        tolerant: false,
                    },
                )
                .unwrap();
                db.save(&graph).unwrap();
            }

            let (_db, loaded) =
                Database::open(&path, DatabaseOptions::default()).unwrap();
            assert_eq!(loaded.aliases(), graph.aliases());
        }
    }

    #[test]
    fn save_skips_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lathe-cache.db");

        let graph = sample_graph();
        let (mut db, _) =
            Database::open(&path, DatabaseOptions::default()).unwrap();

        assert!(db.save(&graph).unwrap());
        assert!(!db.save(&graph).unwrap());
    }

    #[test]
    fn save_refuses_after_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lathe-cache.db");

        let graph = sample_graph();
        graph.record_panic();

        let (mut db, _) =
            Database::open(&path, DatabaseOptions::default()).unwrap();
        assert!(!db.save(&graph).unwrap());
    }

    #[test]
    fn second_process_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lathe-cache.db");

        let (_db, _) =
            Database::open(&path, DatabaseOptions::default()).unwrap();

        let err = Database::open(&path, DatabaseOptions::default())
            .err()
            .expect("second open should fail");
        assert!(err.downcast_ref::<DatabaseLocked>().is_some());
    }

    #[test]
    fn garbage_is_corrupt_unless_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lathe-cache.db");

        fs::write(&path, b"this is not a database").unwrap();

        let err = Database::open(&path, DatabaseOptions::default())
            .err()
            .expect("strict open should fail");
        assert!(err.downcast_ref::<CorruptDatabase>().is_some());

        let (_db, graph) = Database::open(
            &path,
            DatabaseOptions {
                tolerant: true,
                ..DatabaseOptions::default()
            },
        )
        .unwrap();

        assert!(graph.is_empty());
        assert!(graph.is_dirty());
    }
}
