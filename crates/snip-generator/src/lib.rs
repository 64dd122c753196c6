pub mod sha256;

pub use sha256::Sha256Generator;

use snip_core::ShortCode;

/// Trait for deriving short codes from URLs.
///
/// Implementations are pure functions of their input: they don't interact
/// with storage and the same URL always yields the same code. This is what
/// makes re-shortening idempotent and lets batch items be hashed
/// independently.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortCode>;

    /// Derives the short code for `url`.
    fn generate(&self, url: &str) -> Self::Output;
}
