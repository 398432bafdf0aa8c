// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Digest and compression helpers.

Repository metadata is content addressed: files are named after the SHA-256
of their stored bytes and indexes carry both the stored (compressed) digest
and the *open* digest of the uncompressed payload. The helpers here compute
digests in a streaming fashion so arbitrarily large package files never have
to be buffered in memory.
*/

use {
    crate::error::Result,
    bzip2::{read::BzDecoder, write::BzEncoder},
    flate2::{read::GzDecoder, write::GzEncoder},
    md5::Md5,
    sha1::Sha1,
    sha2::{Digest, Sha256},
    std::{
        fmt::Formatter,
        fs::File,
        io::{BufReader, Read, Write},
        path::Path,
    },
};

/// Read buffer size for streaming digest computation.
const CHUNK_SIZE: usize = 16384;

/// Represents a content digest.
#[derive(Clone, Eq, PartialEq, PartialOrd)]
pub enum ContentDigest {
    /// An MD5 digest.
    Md5(Vec<u8>),
    /// A SHA-1 digest.
    Sha1(Vec<u8>),
    /// A SHA-256 digest.
    Sha256(Vec<u8>),
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5(data) => write!(f, "Md5({})", hex::encode(data)),
            Self::Sha1(data) => write!(f, "Sha1({})", hex::encode(data)),
            Self::Sha256(data) => write!(f, "Sha256({})", hex::encode(data)),
        }
    }
}

impl ContentDigest {
    /// Obtain the digest bytes for this content digest.
    pub fn digest_bytes(&self) -> &[u8] {
        match self {
            Self::Md5(x) => x,
            Self::Sha1(x) => x,
            Self::Sha256(x) => x,
        }
    }

    /// Obtain the lowercase hex encoded content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }
}

/// Holds the md5, sha1, and sha256 digests of a single byte stream.
#[derive(Clone, Debug)]
pub struct MultiContentDigest {
    pub md5: ContentDigest,
    pub sha1: ContentDigest,
    pub sha256: ContentDigest,
}

/// A content digester that simultaneously computes multiple digest types.
pub struct MultiDigester {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
}

impl Default for MultiDigester {
    fn default() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
        }
    }
}

impl MultiDigester {
    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    /// Finish digesting content.
    pub fn finish(self) -> MultiContentDigest {
        MultiContentDigest {
            md5: ContentDigest::Md5(self.md5.finalize().to_vec()),
            sha1: ContentDigest::Sha1(self.sha1.finalize().to_vec()),
            sha256: ContentDigest::Sha256(self.sha256.finalize().to_vec()),
        }
    }
}

/// Compute the SHA-256 digest of a file, streaming.
pub fn sha256_path(path: impl AsRef<Path>) -> Result<String> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let count = reader.read(&mut buf)?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute md5, sha1, and sha256 digests of a file in a single streaming pass.
pub fn multi_digest_path(path: impl AsRef<Path>) -> Result<MultiContentDigest> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    let mut digester = MultiDigester::default();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let count = reader.read(&mut buf)?;
        if count == 0 {
            break;
        }
        digester.update(&buf[..count]);
    }

    Ok(digester.finish())
}

/// Bzip2 compress `src` into `dst`.
pub fn bzip2_compress_path(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let mut reader = BufReader::new(File::open(src.as_ref())?);
    let mut encoder = BzEncoder::new(File::create(dst.as_ref())?, bzip2::Compression::default());
    std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;

    Ok(())
}

/// Decompress a gzip payload held in memory.
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = vec![];
    decoder.read_to_end(&mut out)?;

    Ok(out)
}

/// Compress a byte slice with gzip at the default level.
pub fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(vec![], flate2::Compression::default());
    encoder.write_all(data)?;

    Ok(encoder.finish()?)
}

/// Decompress a bzip2 payload held in memory.
pub fn bzip2_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(data);
    let mut out = vec![];
    decoder.read_to_end(&mut out)?;

    Ok(out)
}

/// Compress a byte slice with bzip2.
pub fn bzip2_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(vec![], bzip2::Compression::default());
    encoder.write_all(data)?;

    Ok(encoder.finish()?)
}

/// Compute the content-addressed filename for a file with the given digest.
///
/// Metadata files are stored as `<hex-sha256>-<base>` so that a mutation
/// always produces a new object name and clients never see a half-written
/// file under a name they have cached.
pub fn content_addressed_name(digest_hex: &str, base: &str) -> String {
    format!("{}-{}", digest_hex, base)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sha256_of_known_bytes() {
        assert_eq!(
            sha256_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn multi_digester_matches_single() {
        let mut digester = MultiDigester::default();
        digester.update(b"hello ");
        digester.update(b"world");
        let digests = digester.finish();

        assert_eq!(digests.sha256.digest_hex(), sha256_bytes(b"hello world"));
        assert_eq!(
            digests.md5.digest_hex(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            digests.sha1.digest_hex(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn gzip_round_trip() -> Result<()> {
        let data = b"some repeated data some repeated data".to_vec();
        let compressed = gzip_compress(&data)?;
        assert_eq!(gzip_decompress(&compressed)?, data);

        Ok(())
    }

    #[test]
    fn bzip2_round_trip() -> Result<()> {
        let data = b"sqlite database bytes".to_vec();
        let compressed = bzip2_compress(&data)?;
        assert_eq!(bzip2_decompress(&compressed)?, data);

        Ok(())
    }

    #[test]
    fn streamed_file_digest_matches_buffered() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("payload");
        std::fs::write(&path, b"hello world")?;

        assert_eq!(sha256_path(&path)?, sha256_bytes(b"hello world"));

        let digests = multi_digest_path(&path)?;
        assert_eq!(digests.sha256.digest_hex(), sha256_bytes(b"hello world"));

        Ok(())
    }

    #[test]
    fn content_addressed_names() {
        assert_eq!(
            content_addressed_name("abc123", "primary.xml.gz"),
            "abc123-primary.xml.gz"
        );
    }
}
