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

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use generic_array::{typenum, GenericArray};
use lazy_static::lazy_static;
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize, Serialize, Serializer,
};
use sha2::{self, Digest};

use crate::error::Error;

lazy_static! {
    /// The process seed. Mixed into every digest so that stamps produced by
    /// an incompatible binary can never be mistaken for our own.
    ///
    /// In debug builds this is a fixed string so that on-disk graphs stay
    /// stable across recompiles.
    static ref SEED: Fingerprint = {
        if cfg!(debug_assertions) {
            raw_digest(&[b"lathe-debug-seed"])
        } else {
            let exe = env::current_exe()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();

            // The manifest is compiled in so the whole dependency stack is
            // part of the seed: a binary built against a different set of
            // crates cannot reuse cached stamps.
            raw_digest(&[
                exe.as_bytes(),
                env!("CARGO_PKG_VERSION").as_bytes(),
                include_str!("../../Cargo.toml").as_bytes(),
            ])
        }
    };
}

fn raw_digest(chunks: &[&[u8]]) -> Fingerprint {
    let mut hasher = sha2::Sha256::default();

    for chunk in chunks {
        hasher.input(chunk);
    }

    Fingerprint {
        inner: hasher.result(),
    }
}

/// Returns the process seed.
pub fn seed() -> Fingerprint {
    SEED.clone()
}

/// A 32-byte SHA-256 digest, seeded with the process seed.
///
/// The all-zero value is reserved: it marks "no fingerprint" and is what
/// freshly created or failed nodes carry. Serialized as hex in human
/// readable formats and as raw bytes otherwise.
#[derive(Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Fingerprint {
    inner: GenericArray<u8, typenum::U32>,
}

impl Fingerprint {
    /// The reserved "no fingerprint" value.
    pub fn zero() -> Fingerprint {
        Fingerprint::default()
    }

    /// A fingerprint is valid iff it is non-zero.
    pub fn is_valid(&self) -> bool {
        self.inner.iter().any(|&b| b != 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_ref()
    }
}

impl From<GenericArray<u8, typenum::U32>> for Fingerprint {
    fn from(arr: GenericArray<u8, typenum::U32>) -> Self {
        Fingerprint { inner: arr }
    }
}

impl From<[u8; 32]> for Fingerprint {
    fn from(arr: [u8; 32]) -> Self {
        Fingerprint {
            inner: GenericArray::from(arr),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Rebuilds a fingerprint from raw bytes, rejecting anything that is not
/// exactly 32 of them.
fn from_slice<E>(bytes: &[u8]) -> Result<Fingerprint, E>
where
    E: de::Error,
{
    if bytes.len() == 32 {
        Ok(Fingerprint {
            inner: GenericArray::clone_from_slice(bytes),
        })
    } else {
        Err(E::invalid_length(bytes.len(), &"a 32-byte digest"))
    }
}

impl Serialize for Fingerprint {
    /// Hex in human readable formats, raw bytes in binary ones.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_bytes(self.as_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;

            let bytes = hex::decode(&text).map_err(|_| {
                de::Error::invalid_value(
                    de::Unexpected::Str(&text),
                    &"a hex-encoded digest",
                )
            })?;

            from_slice(&bytes)
        } else {
            struct RawBytes;

            impl<'de> Visitor<'de> for RawBytes {
                type Value = Fingerprint;

                fn expecting(
                    &self,
                    f: &mut fmt::Formatter<'_>,
                ) -> fmt::Result {
                    f.write_str("a 32-byte digest")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Fingerprint, E>
                where
                    E: de::Error,
                {
                    from_slice(v)
                }
            }

            deserializer.deserialize_bytes(RawBytes)
        }
    }
}

/// An incremental digest, pre-seeded with the process seed.
pub struct Digester {
    hasher: sha2::Sha256,
}

impl Digester {
    pub fn new() -> Digester {
        let mut hasher = sha2::Sha256::default();
        hasher.input(SEED.as_bytes());
        Digester { hasher }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.input(bytes);
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint {
            inner: self.hasher.result(),
        }
    }

    /// Digests everything a reader yields.
    pub fn from_reader<R>(mut reader: R) -> io::Result<Fingerprint>
    where
        R: io::Read,
    {
        let mut digester = Digester::new();

        const BUF_SIZE: usize = 16384;

        let mut buf = [0u8; BUF_SIZE];

        loop {
            let n = reader.read(&mut buf)?;

            if n == 0 {
                break;
            }

            digester.update(&buf[0..n]);
        }

        Ok(digester.finish())
    }

    /// Digests the contents of a file.
    pub fn from_path<P>(path: P) -> io::Result<Fingerprint>
    where
        P: AsRef<Path>,
    {
        Self::from_reader(fs::File::open(path.as_ref())?)
    }
}

impl Default for Digester {
    fn default() -> Digester {
        Digester::new()
    }
}

impl io::Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fingerprints any serializable value by streaming its deterministic binary
/// form through a seeded digester. Field order is fixed by the type's serde
/// definition; no map iteration is involved anywhere in the node model.
pub fn of<T>(value: &T) -> Result<Fingerprint, Error>
where
    T: Serialize + ?Sized,
{
    let mut digester = Digester::new();
    bincode::serialize_into(&mut digester, value)?;
    Ok(digester.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_invalid() {
        assert!(!Fingerprint::zero().is_valid());
        assert!(of(&"x").unwrap().is_valid());
    }

    #[test]
    fn deterministic() {
        let a = of(&("hello", 42u32)).unwrap();
        let b = of(&("hello", 42u32)).unwrap();
        assert_eq!(a, b);

        let c = of(&("hello", 43u32)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn seeded() {
        // A plain unseeded SHA-256 of the same bytes must not collide with
        // the seeded digest.
        let seeded = of(&"payload").unwrap();

        let mut hasher = sha2::Sha256::default();
        bincode::serialize_into(
            &mut VecWriter(&mut hasher),
            &"payload",
        )
        .unwrap();
        let unseeded = Fingerprint::from(hasher.result());

        assert_ne!(seeded, unseeded);

        struct VecWriter<'a>(&'a mut sha2::Sha256);

        impl<'a> io::Write for VecWriter<'a> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.input(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
    }

    #[test]
    fn roundtrip_through_serde() {
        let fp = of(&"roundtrip").unwrap();

        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);

        let bin = bincode::serialize(&fp).unwrap();
        let back: Fingerprint = bincode::deserialize(&bin).unwrap();
        assert_eq!(fp, back);
    }

    #[test]
    fn fingerprint_of_deserialized_value_is_stable() {
        let value = ("a string", vec![1u8, 2, 3]);
        let bytes = bincode::serialize(&value).unwrap();
        let back: (String, Vec<u8>) = bincode::deserialize(&bytes).unwrap();

        assert_eq!(of(&value).unwrap(), of(&back).unwrap());
    }
}
