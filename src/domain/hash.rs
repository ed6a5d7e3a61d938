use std::{fmt::Display, io::Read};

use blake3::Hash;

/// Bytes fed to the hasher per read.
pub const HASH_CHUNK_SIZE: usize = 8192;

/// Hash of a tag-stripped audio stream.
///
/// Two uploads with the same stripped bytes always get the same `ContentHash`,
/// and therefore the same stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub Hash);

impl ContentHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    /// Hashes everything left in `reader`, `HASH_CHUNK_SIZE` bytes at a time.
    pub fn from_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut chunk = [0u8; HASH_CHUNK_SIZE];
        loop {
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            hasher.update(&chunk[..read]);
        }
        Ok(Self(hasher.finalize()))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
