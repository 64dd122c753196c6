use crate::error::ShortenerError;
use crate::record::{Stats, UrlRecord};
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, ShortenerError>;

/// One entry of a batch shorten request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequestItem {
    /// Caller token echoed back in the response. Generated when empty.
    #[serde(default)]
    pub correlation_id: String,
    pub original_url: String,
}

/// One entry of a batch shorten response, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponseItem {
    pub correlation_id: String,
    pub short_url: String,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens a URL on behalf of `user_id` and returns the full short URL.
    async fn shorten(&self, original_url: &str, user_id: &str) -> Result<String>;

    /// Shortens every item or none of them.
    async fn shorten_batch(
        &self,
        items: Vec<BatchRequestItem>,
        user_id: &str,
    ) -> Result<Vec<BatchResponseItem>>;

    /// Resolves a short code to its original URL.
    ///
    /// Fails with `NotFound` for unknown codes and `Gone` for tombstoned ones.
    async fn resolve(&self, code: &ShortCode) -> Result<String>;

    /// Lists every record owned by `user_id`, tombstoned ones included.
    async fn user_urls(&self, user_id: &str) -> Result<Vec<UrlRecord>>;

    /// Tombstones the codes owned by `user_id`; other codes are ignored.
    async fn delete_user_urls(&self, codes: Vec<ShortCode>, user_id: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    async fn stats(&self) -> Result<Stats>;
}
