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

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, ResultExt};

/// User-tunable flags, persisted next to the database as a JSON map of
/// `{ object: { property: value } }`. Loaded before the graph, saved at
/// exit iff something actually changed.
pub struct Config {
    path: PathBuf,
    values: BTreeMap<String, BTreeMap<String, String>>,
    modified: bool,
}

impl Config {
    /// Loads the config, or starts empty when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let path = path.as_ref().to_path_buf();

        let values = match fs::File::open(&path) {
            Ok(f) => serde_json::from_reader(io::BufReader::new(f))
                .with_context(|_| {
                    format!("could not parse config {:?}", path)
                })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                BTreeMap::new()
            }
            Err(err) => {
                return Err(Error::from(err).context(format!(
                    "could not open config {:?}",
                    path
                ))
                .into());
            }
        };

        Ok(Config {
            path,
            values,
            modified: false,
        })
    }

    pub fn get(&self, object: &str, property: &str) -> Option<&str> {
        self.values
            .get(object)
            .and_then(|props| props.get(property))
            .map(String::as_str)
    }

    /// Sets a property, marking the config for save only when the value
    /// actually changed.
    pub fn set<S: Into<String>>(
        &mut self,
        object: &str,
        property: &str,
        value: S,
    ) {
        let value = value.into();

        let props = self
            .values
            .entry(object.to_string())
            .or_insert_with(BTreeMap::new);

        if props.get(property).map(String::as_str) == Some(&value[..]) {
            return;
        }

        props.insert(property.to_string(), value);
        self.modified = true;
    }

    /// Writes the config back iff it was modified. Returns whether a write
    /// happened.
    pub fn save(&mut self) -> Result<bool, Error> {
        if !self.modified {
            return Ok(false);
        }

        let f = fs::File::create(&self.path).with_context(|_| {
            format!("could not write config {:?}", self.path)
        })?;

        serde_json::to_writer_pretty(io::BufWriter::new(f), &self.values)
            .with_context(|_| {
                format!("could not serialize config {:?}", self.path)
            })?;

        self.modified = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_save_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lathe-config.json");

        let mut config = Config::load(&path).unwrap();
        assert_eq!(config.get("build", "threads"), None);
        assert!(!config.save().unwrap());

        config.set("build", "threads", "4");
        assert!(config.save().unwrap());

        // Setting the same value again is not a modification.
        config.set("build", "threads", "4");
        assert!(!config.save().unwrap());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.get("build", "threads"), Some("4"));
    }
}
