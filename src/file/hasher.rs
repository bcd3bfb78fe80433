use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Size of the chunks read from disk while hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// Incremental MD5 computation.
///
/// MD5 is the digest the server reports for every stored file, so it is the
/// one used to decide whether a local file is already uploaded.
pub struct Md5Hasher(md5::Context);

impl Default for Md5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Md5Hasher {
    pub fn new() -> Self {
        Md5Hasher(md5::Context::new())
    }

    /// Consumes a chunk of data to be included in the digest.
    pub fn consume(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    /// Returns the digest as lowercase hexadecimal string.
    pub fn compute(self) -> String {
        format!("{:x}", self.0.compute())
    }

    /// Computes the digest of a whole file, read chunk by chunk.
    ///
    /// # Arguments
    ///
    /// * `path` - The file to hash.
    pub async fn hash_file(path: impl AsRef<Path>) -> Result<String> {
        let mut file = File::open(path).await?;
        let mut hasher = Md5Hasher::new();
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.consume(&buffer[..n]);
        }

        Ok(hasher.compute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hasher_consume() {
        // Arrange
        let mut hasher = Md5Hasher::new();

        // Act
        hasher.consume(b"Hello, ");
        hasher.consume(b"world!");

        // Assert
        let expected_hash = format!("{:x}", md5::compute("Hello, world!".as_bytes()));
        assert_eq!(hasher.compute(), expected_hash);
    }

    #[tokio::test]
    async fn test_hash_file_larger_than_chunk() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let content: Vec<u8> = (0..3 * CHUNK_SIZE + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        // Act
        let hash = Md5Hasher::hash_file(&path).await.unwrap();

        // Assert
        assert_eq!(hash, format!("{:x}", md5::compute(&content)));
    }

    #[tokio::test]
    async fn test_hash_missing_file() {
        assert!(Md5Hasher::hash_file("does/not/exist").await.is_err());
    }
}
