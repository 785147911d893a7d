//! Perceptual hashing for images.
//!
//! Every comparison the resolver makes (source against search thumbnails,
//! source against post variants, index validation) goes through this module.
//! Distances are only meaningful between hashes produced by the same
//! algorithm and size, so the pair is carried on every [`PerceptualHash`] and
//! persisted alongside the index.
//!
//! # Usage
//!
//! ```no_run
//! use sabersort_core::hasher::{HashAlgorithm, PerceptualHasher};
//!
//! let hasher = PerceptualHasher::new(HashAlgorithm::Perceptual, 16);
//! let a = hasher.hash_bytes(&std::fs::read("a.png").unwrap()).unwrap();
//! let b = hasher.hash_bytes(&std::fs::read("b.png").unwrap()).unwrap();
//! let same_picture = a.is_within(&b, 10);
//! ```

use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SaberError};

/// Default hash edge length; a 16x16 grid gives a 256-bit hash.
pub const DEFAULT_HASH_SIZE: u32 = 16;

/// Perceptual hash algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum HashAlgorithm {
    /// Mean luminance threshold ("aHash").
    Average,
    /// Mean threshold over DCT coefficients ("pHash").
    #[default]
    Perceptual,
    /// Horizontal neighbour gradient ("dHash").
    Difference,
    /// Horizontal and vertical gradients concatenated.
    DoubleGradient,
    /// Median luminance threshold.
    Median,
    /// Grid block means.
    Blockhash,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Perceptual => "perceptual",
            Self::Difference => "difference",
            Self::DoubleGradient => "double_gradient",
            Self::Median => "median",
            Self::Blockhash => "blockhash",
        }
    }

    fn to_hash_alg(self) -> HashAlg {
        match self {
            Self::Average | Self::Perceptual => HashAlg::Mean,
            Self::Difference => HashAlg::Gradient,
            Self::DoubleGradient => HashAlg::DoubleGradient,
            Self::Median => HashAlg::Median,
            Self::Blockhash => HashAlg::Blockhash,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = SaberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['_', '-'], "").as_str() {
            "average" | "mean" => Ok(Self::Average),
            "perceptual" | "phash" => Ok(Self::Perceptual),
            "difference" | "gradient" | "dhash" => Ok(Self::Difference),
            "doublegradient" => Ok(Self::DoubleGradient),
            "median" => Ok(Self::Median),
            "blockhash" => Ok(Self::Blockhash),
            other => Err(SaberError::Config(format!(
                "Unknown hash algorithm: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = SaberError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Computed perceptual hash with metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualHash {
    /// The hash bytes
    pub hash: Vec<u8>,
    /// Algorithm used to compute the hash
    pub algorithm: HashAlgorithm,
    /// Hash size in bits
    pub bit_size: u32,
}

impl PerceptualHash {
    pub fn from_bytes(hash: Vec<u8>, algorithm: HashAlgorithm) -> Self {
        let bit_size = (hash.len() * 8) as u32;
        Self {
            hash,
            algorithm,
            bit_size,
        }
    }

    /// Number of differing bits between the two hashes.
    ///
    /// Hashes of different widths are compared over the overlapping bytes,
    /// with a penalty of 8 per byte of size difference.
    pub fn distance(&self, other: &Self) -> u32 {
        hamming_distance(&self.hash, &other.hash)
    }

    /// Near-equality: the distance does not exceed `threshold`.
    pub fn is_within(&self, other: &Self, threshold: u32) -> bool {
        is_match(self.distance(other), threshold)
    }

    /// Hex encoding, used as the index key.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    pub fn from_hex(hex_str: &str, algorithm: HashAlgorithm) -> Result<Self> {
        let hash = hex::decode(hex_str)
            .map_err(|e| SaberError::Config(format!("Invalid hash hex string: {e}")))?;
        Ok(Self::from_bytes(hash, algorithm))
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Perceptual hasher configuration and computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerceptualHasher {
    algorithm: HashAlgorithm,
    hash_size: u32,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_HASH_SIZE)
    }
}

impl PerceptualHasher {
    pub fn new(algorithm: HashAlgorithm, hash_size: u32) -> Self {
        Self {
            algorithm,
            hash_size: hash_size.max(1),
        }
    }

    /// Compute perceptual hash from raw image bytes.
    ///
    /// Supports JPEG, PNG, GIF, and WebP formats. The container does not
    /// matter, only the decoded pixels.
    pub fn hash_bytes(&self, image_data: &[u8]) -> Result<PerceptualHash> {
        let image = image::load_from_memory(image_data)
            .map_err(|e| SaberError::UnreadableImage(format!("Failed to decode image: {e}")))?;

        Ok(self.hash_image(&image))
    }

    /// [`hash_bytes`](Self::hash_bytes) on tokio's blocking pool.
    ///
    /// Decoding a full-size image is CPU-bound; concurrent workers only run
    /// in parallel when it happens off the async runtime threads.
    pub async fn hash_bytes_blocking<D>(&self, image_data: D) -> Result<PerceptualHash>
    where
        D: AsRef<[u8]> + Send + 'static,
    {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash_bytes(image_data.as_ref()))
            .await
            .map_err(|e| SaberError::Task(format!("Hash calculation task failed: {e}")))?
    }

    /// Compute perceptual hash from a DynamicImage.
    pub fn hash_image(&self, image: &DynamicImage) -> PerceptualHash {
        let mut config = HasherConfig::new()
            .hash_size(self.hash_size, self.hash_size)
            .hash_alg(self.algorithm.to_hash_alg());
        if self.algorithm == HashAlgorithm::Perceptual {
            config = config.preproc_dct();
        }

        let hash = config.to_hasher().hash_image(image);
        PerceptualHash::from_bytes(hash.as_bytes().to_vec(), self.algorithm)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    /// Identifies the algorithm/size pair; an index built with one signature
    /// cannot be compared against hashes of another.
    pub fn signature(&self) -> String {
        format!("{}:{}", self.algorithm, self.hash_size)
    }
}

/// Threshold policy shared by candidate and variant selection.
/// A distance equal to the threshold is still a match.
pub fn is_match(distance: u32, threshold: u32) -> bool {
    distance <= threshold
}

/// Compute Hamming distance between two hash byte arrays.
///
/// When sizes differ, compares the overlapping portion and adds a penalty
/// of 8 bits per byte of size difference.
pub fn hamming_distance(hash1: &[u8], hash2: &[u8]) -> u32 {
    let min_len = hash1.len().min(hash2.len());

    let distance: u32 = hash1[..min_len]
        .iter()
        .zip(hash2[..min_len].iter())
        .map(|(a, b)| (a ^ b).count_ones())
        .sum();

    let size_penalty = (hash1.len().abs_diff(hash2.len()) * 8) as u32;

    distance + size_penalty
}
