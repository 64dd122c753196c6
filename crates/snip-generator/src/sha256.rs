use crate::Generator;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use snip_core::ShortCode;
use typed_builder::TypedBuilder;

/// Number of digest bytes kept by default. Six bytes encode to eight
/// base64 characters with no padding.
pub const DEFAULT_PREFIX_LEN: usize = 6;

const MIN_PREFIX_LEN: usize = 3;
// 24 bytes encode to 32 characters, the longest short code accepted.
const MAX_PREFIX_LEN: usize = 24;

/// A content-addressable generator.
///
/// Hashes the trimmed URL with SHA-256, keeps a fixed-size prefix of the
/// digest and encodes it with the URL-safe base64 alphabet, padding stripped.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Sha256Generator {
    #[builder(default = DEFAULT_PREFIX_LEN)]
    prefix_len: usize,
}

impl Sha256Generator {
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Digest bytes kept per code, clamped to the range that produces a
    /// valid [`ShortCode`].
    pub fn prefix_len(&self) -> usize {
        self.prefix_len.clamp(MIN_PREFIX_LEN, MAX_PREFIX_LEN)
    }

    pub fn hash(&self, url: &str) -> ShortCode {
        let digest = Sha256::digest(url.trim().as_bytes());
        let encoded = URL_SAFE_NO_PAD.encode(&digest[..self.prefix_len()]);
        ShortCode::new_unchecked(encoded)
    }
}

impl Default for Sha256Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for Sha256Generator {
    type Output = ShortCode;

    fn generate(&self, url: &str) -> Self::Output {
        self.hash(url)
    }
}
