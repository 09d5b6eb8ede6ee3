//! Segment compression codecs.
//!
//! The archive stores one compressed object per WAL segment; the object's
//! extension names the codec, and fetch tries every known extension.

use std::io::Write;

use walvault_common::{Error, Result};

/// Supported codecs. lz4 is the default: fast enough to keep up with WAL
/// generation on write-heavy clusters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    Lz4,
    Zstd,
}

/// All codecs, in the order fetch probes them.
pub const ALL_COMPRESSIONS: [Compression; 2] = [Compression::Lz4, Compression::Zstd];

impl Compression {
    /// Resolve a configured method name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            other => Err(Error::configuration(format!(
                "unknown compression method: {other:?}, supported methods are: lz4, zstd"
            ))),
        }
    }

    /// File extension appended to archived object names.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zst",
        }
    }

    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => {
                let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
                encoder
                    .write_all(data)
                    .map_err(|e| Error::Serialization(format!("lz4 compress: {e}")))?;
                encoder
                    .finish()
                    .map_err(|e| Error::Serialization(format!("lz4 finish: {e}")))
            }
            Self::Zstd => zstd::stream::encode_all(data, 0)
                .map_err(|e| Error::Serialization(format!("zstd compress: {e}"))),
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => {
                let mut decoder = lz4_flex::frame::FrameDecoder::new(data);
                let mut out = Vec::new();
                std::io::Read::read_to_end(&mut decoder, &mut out)
                    .map_err(|e| Error::Serialization(format!("lz4 decompress: {e}")))?;
                Ok(out)
            }
            Self::Zstd => zstd::stream::decode_all(data)
                .map_err(|e| Error::Serialization(format!("zstd decompress: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_both_codecs() {
        let data: Vec<u8> = (0..16 * 1024).map(|i| (i % 251) as u8).collect();
        for codec in ALL_COMPRESSIONS {
            let compressed = codec.compress(&data).unwrap();
            assert_ne!(compressed, data);
            assert_eq!(codec.decompress(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Compression::from_name("lz4").unwrap(), Compression::Lz4);
        assert_eq!(Compression::from_name("zstd").unwrap(), Compression::Zstd);
        assert!(Compression::from_name("brotli").is_err());
    }

    #[test]
    fn test_extensions() {
        assert_eq!(Compression::Lz4.extension(), "lz4");
        assert_eq!(Compression::Zstd.extension(), "zst");
    }
}
