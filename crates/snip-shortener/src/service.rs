use crate::config::ShortenerConfig;
use async_trait::async_trait;
use snip_core::{
    BatchRequestItem, BatchResponseItem, ShortCode, Shortener, ShortenerError, Stats,
    StorageBackend, StorageError, UrlRecord,
};
use snip_generator::{Generator, Sha256Generator};
use snip_storage::open_storage;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

/// A concrete implementation of the `Shortener` trait.
///
/// Codes come from the generator, so shortening the same URL twice yields
/// the same short URL. Persistence is delegated to the storage backend,
/// which rejects a code already bound to a different URL.
pub struct ShortenerService<S: ?Sized = dyn StorageBackend, G = Sha256Generator> {
    storage: Arc<S>,
    generator: Arc<G>,
    base_url: Arc<str>,
}

impl<S: ?Sized, G> Clone for ShortenerService<S, G> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            generator: Arc::clone(&self.generator),
            base_url: Arc::clone(&self.base_url),
        }
    }
}

impl ShortenerService {
    /// Opens the configured backend and builds a service on top of it.
    pub async fn open(config: &ShortenerConfig) -> Result<Self, StorageError> {
        let storage = open_storage(&config.storage).await?;
        Ok(Self::from_config(storage, config))
    }
}

impl<S: StorageBackend + ?Sized> ShortenerService<S, Sha256Generator> {
    pub fn from_config(storage: Arc<S>, config: &ShortenerConfig) -> Self {
        let generator = Sha256Generator::builder()
            .prefix_len(config.code_bytes)
            .build();
        Self::with_shared(storage, generator, config.base_url.as_str())
    }
}

impl<S: StorageBackend + ?Sized, G: Generator> ShortenerService<S, G> {
    /// Creates a service that shares an already opened backend.
    pub fn with_shared(storage: Arc<S>, generator: G, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            storage,
            generator: Arc::new(generator),
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    fn generate_code(&self, url: &str) -> ShortCode {
        self.generator.generate(url).into()
    }

    async fn delete_owned(
        &self,
        codes: &[ShortCode],
        user_id: &str,
    ) -> Result<usize, StorageError> {
        if codes.is_empty() {
            return Ok(0);
        }
        self.storage.delete_urls(codes, user_id).await
    }

    /// Tombstones `codes` owned by `user_id` on a detached task.
    ///
    /// Returns immediately. Failures are logged and never reach the caller;
    /// the handle only lets tests and shutdown code wait for completion.
    pub fn schedule_delete(
        &self,
        codes: Vec<ShortCode>,
        user_id: impl Into<String>,
    ) -> JoinHandle<()> {
        let service = self.clone();
        let user_id = user_id.into();

        tokio::spawn(async move {
            match service.delete_owned(&codes, &user_id).await {
                Ok(deleted) => debug!(
                    user_id = %user_id,
                    requested = codes.len(),
                    deleted,
                    "scheduled delete finished"
                ),
                Err(err) => error!(
                    user_id = %user_id,
                    requested = codes.len(),
                    error = %err,
                    "scheduled delete failed"
                ),
            }
        })
    }

    /// Resolves a raw, unvalidated code.
    ///
    /// A string that is not a valid short code has no record, so it is
    /// `NotFound` rather than a validation error.
    pub async fn resolve_raw(&self, code: &str) -> Result<String, ShortenerError> {
        match code.parse::<ShortCode>() {
            Ok(code) => self.resolve(&code).await,
            Err(_) => Err(ShortenerError::NotFound(code.to_string())),
        }
    }

    /// Flushes and releases the backend.
    pub async fn close(&self) -> Result<(), ShortenerError> {
        self.storage.close().await?;
        info!("shortener service closed");
        Ok(())
    }
}

impl<S: ?Sized, G> ShortenerService<S, G> {
    fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.base_url)
    }
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl<S: StorageBackend + ?Sized, G: Generator> Shortener for ShortenerService<S, G> {
    async fn shorten(&self, original_url: &str, user_id: &str) -> Result<String, ShortenerError> {
        let url = original_url.trim();
        if url.is_empty() {
            return Err(ShortenerError::Validation("URL cannot be empty".to_string()));
        }

        let code = self.generate_code(url);
        let record = UrlRecord::new(code.clone(), url, user_id)
            .with_correlation_id(new_correlation_id());

        self.storage.save(record).await?;
        debug!(code = %code, user_id, "shortened url");

        Ok(self.short_url(&code))
    }

    async fn shorten_batch(
        &self,
        items: Vec<BatchRequestItem>,
        user_id: &str,
    ) -> Result<Vec<BatchResponseItem>, ShortenerError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        if let Some((position, item)) = items
            .iter()
            .enumerate()
            .find(|(_, item)| item.original_url.trim().is_empty())
        {
            return Err(ShortenerError::Validation(format!(
                "batch item {position} ({}): URL cannot be empty",
                item.correlation_id
            )));
        }

        let mut records = Vec::with_capacity(items.len());
        let mut responses = Vec::with_capacity(items.len());

        for item in items {
            let url = item.original_url.trim();
            let correlation_id = if item.correlation_id.is_empty() {
                new_correlation_id()
            } else {
                item.correlation_id
            };
            let code = self.generate_code(url);

            responses.push(BatchResponseItem {
                correlation_id: correlation_id.clone(),
                short_url: self.short_url(&code),
            });
            records.push(UrlRecord::new(code, url, user_id).with_correlation_id(correlation_id));
        }

        self.storage.save_batch(records).await?;
        debug!(count = responses.len(), user_id, "shortened batch");

        Ok(responses)
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String, ShortenerError> {
        trace!(code = %code, "resolving short code");

        match self.storage.get(code).await? {
            None => Err(ShortenerError::NotFound(code.to_string())),
            Some(record) if record.is_deleted => Err(ShortenerError::Gone(code.to_string())),
            Some(record) => Ok(record.original_url),
        }
    }

    async fn user_urls(&self, user_id: &str) -> Result<Vec<UrlRecord>, ShortenerError> {
        Ok(self.storage.urls_by_user(user_id).await?)
    }

    async fn delete_user_urls(
        &self,
        codes: Vec<ShortCode>,
        user_id: &str,
    ) -> Result<(), ShortenerError> {
        let deleted = self.delete_owned(&codes, user_id).await?;
        debug!(user_id, requested = codes.len(), deleted, "deleted user urls");
        Ok(())
    }

    async fn ping(&self) -> Result<(), ShortenerError> {
        Ok(self.storage.ping().await?)
    }

    async fn stats(&self) -> Result<Stats, ShortenerError> {
        Ok(self.storage.stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_storage::{FileStorage, InMemoryStorage, StorageConfig};
    use std::time::Duration;

    const BASE_URL: &str = "http://localhost:8080";

    fn test_service() -> ShortenerService<InMemoryStorage> {
        ShortenerService::with_shared(
            Arc::new(InMemoryStorage::new()),
            Sha256Generator::new(),
            BASE_URL,
        )
    }

    fn code(value: &str) -> ShortCode {
        ShortCode::new(value).unwrap()
    }

    fn batch_item(correlation_id: &str, url: &str) -> BatchRequestItem {
        BatchRequestItem {
            correlation_id: correlation_id.to_string(),
            original_url: url.to_string(),
        }
    }

    /// Maps every URL to the same code.
    struct CollidingGenerator;

    impl Generator for CollidingGenerator {
        type Output = ShortCode;

        fn generate(&self, _url: &str) -> ShortCode {
            ShortCode::new_unchecked("clash1")
        }
    }

    #[tokio::test]
    async fn shorten_returns_base_url_and_hash_code() {
        let service = test_service();

        let short_url = service.shorten("https://example.com", "u1").await.unwrap();
        assert_eq!(short_url, "http://localhost:8080/EAaArVRs");

        let stored = service.storage().get(&code("EAaArVRs")).await.unwrap().unwrap();
        assert_eq!(stored.user_id, "u1");
        assert!(Uuid::parse_str(&stored.correlation_id).is_ok());
    }

    #[tokio::test]
    async fn shorten_trims_input_and_base_url_slash() {
        let service = ShortenerService::with_shared(
            Arc::new(InMemoryStorage::new()),
            Sha256Generator::new(),
            "https://sn.ip/",
        );

        let short_url = service.shorten("  https://example.com\n", "").await.unwrap();
        assert_eq!(short_url, "https://sn.ip/EAaArVRs");
        assert_eq!(
            service.resolve(&code("EAaArVRs")).await.unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn shorten_is_idempotent() {
        let service = test_service();

        let first = service.shorten("https://rust-lang.org", "u1").await.unwrap();
        let second = service.shorten("https://rust-lang.org", "u2").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.stats().await.unwrap(), Stats { urls: 1, users: 1 });
    }

    #[tokio::test]
    async fn shorten_rejects_empty_url() {
        let service = test_service();

        for url in ["", "   ", "\t\n"] {
            let err = service.shorten(url, "u1").await.unwrap_err();
            assert!(matches!(err, ShortenerError::Validation(_)));
        }
        assert_eq!(service.stats().await.unwrap().urls, 0);
    }

    #[tokio::test]
    async fn colliding_code_is_reported_as_conflict() {
        let service = ShortenerService::with_shared(
            Arc::new(InMemoryStorage::new()),
            CollidingGenerator,
            BASE_URL,
        );

        service.shorten("https://one.example", "u1").await.unwrap();
        let err = service.shorten("https://two.example", "u1").await.unwrap_err();

        assert!(matches!(err, ShortenerError::Conflict(_)));
        assert_eq!(
            service.resolve(&code("clash1")).await.unwrap(),
            "https://one.example"
        );
    }

    #[tokio::test]
    async fn batch_preserves_order_and_correlation_ids() {
        let service = test_service();

        let responses = service
            .shorten_batch(vec![batch_item("1", "a.com"), batch_item("2", "b.com")], "u1")
            .await
            .unwrap();

        assert_eq!(
            responses,
            vec![
                BatchResponseItem {
                    correlation_id: "1".to_string(),
                    short_url: "http://localhost:8080/1sF1Tbvw".to_string(),
                },
                BatchResponseItem {
                    correlation_id: "2".to_string(),
                    short_url: "http://localhost:8080/6mfWA_En".to_string(),
                },
            ]
        );

        let listed = service.user_urls("u1").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn batch_generates_missing_correlation_ids() {
        let service = test_service();

        let responses = service
            .shorten_batch(vec![batch_item("", "https://example.com")], "")
            .await
            .unwrap();

        assert_eq!(responses.len(), 1);
        assert!(Uuid::parse_str(&responses[0].correlation_id).is_ok());
    }

    #[tokio::test]
    async fn empty_batch_is_empty_response() {
        let service = test_service();
        assert!(service.shorten_batch(Vec::new(), "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_with_empty_url_stores_nothing() {
        let service = test_service();

        let err = service
            .shorten_batch(
                vec![
                    batch_item("1", "a.com"),
                    batch_item("2", " "),
                    batch_item("3", "b.com"),
                ],
                "u1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShortenerError::Validation(_)));
        assert_eq!(service.stats().await.unwrap().urls, 0);
    }

    #[tokio::test]
    async fn batch_collision_fails_as_a_unit() {
        let service = ShortenerService::with_shared(
            Arc::new(InMemoryStorage::new()),
            CollidingGenerator,
            BASE_URL,
        );

        let err = service
            .shorten_batch(vec![batch_item("1", "a.com"), batch_item("2", "b.com")], "u1")
            .await
            .unwrap_err();

        assert!(matches!(err, ShortenerError::Conflict(_)));
        assert_eq!(service.stats().await.unwrap().urls, 0);
    }

    #[tokio::test]
    async fn resolve_unknown_code_is_not_found() {
        let service = test_service();

        let err = service.resolve(&code("missing")).await.unwrap_err();
        assert!(matches!(err, ShortenerError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_raw_code_is_not_found() {
        let service = test_service();
        service.shorten("https://example.com", "u1").await.unwrap();

        for raw in ["ab", "abc=", "has space", ""] {
            let err = service.resolve_raw(raw).await.unwrap_err();
            assert!(matches!(err, ShortenerError::NotFound(_)), "{raw:?}: {err:?}");
        }
        assert_eq!(
            service.resolve_raw("EAaArVRs").await.unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn delete_makes_owned_codes_gone() {
        let service = test_service();
        service.shorten("https://example.com", "u1").await.unwrap();
        service.shorten("https://rust-lang.org", "u2").await.unwrap();

        service
            .delete_user_urls(vec![code("EAaArVRs"), code("q_J7B_j7"), code("ghost1")], "u1")
            .await
            .unwrap();

        let err = service.resolve(&code("EAaArVRs")).await.unwrap_err();
        assert!(matches!(err, ShortenerError::Gone(_)));
        assert_eq!(
            service.resolve(&code("q_J7B_j7")).await.unwrap(),
            "https://rust-lang.org"
        );

        // the owner still sees the tombstoned record
        let listed = service.user_urls("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_deleted);
    }

    #[tokio::test]
    async fn anonymous_owner_deletes_anonymous_records() {
        let service = test_service();
        service.shorten("https://example.com", "").await.unwrap();
        service.shorten("https://rust-lang.org", "u1").await.unwrap();

        service
            .delete_user_urls(vec![code("EAaArVRs"), code("q_J7B_j7")], "")
            .await
            .unwrap();

        assert!(matches!(
            service.resolve(&code("EAaArVRs")).await,
            Err(ShortenerError::Gone(_))
        ));
        assert_eq!(
            service.resolve(&code("q_J7B_j7")).await.unwrap(),
            "https://rust-lang.org"
        );
    }

    #[tokio::test]
    async fn resave_after_delete_stays_gone() {
        let service = test_service();
        service.shorten("https://example.com", "u1").await.unwrap();
        service
            .delete_user_urls(vec![code("EAaArVRs")], "u1")
            .await
            .unwrap();

        service.shorten("https://example.com", "u1").await.unwrap();

        let err = service.resolve(&code("EAaArVRs")).await.unwrap_err();
        assert!(matches!(err, ShortenerError::Gone(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduled_delete_completes_in_background() {
        let service = test_service();
        service.shorten("https://example.com", "u1").await.unwrap();

        // dropping the handle detaches the task
        drop(service.schedule_delete(vec![code("EAaArVRs")], "u1"));

        let observer = service.clone();
        awaitility::at_most(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(20))
            .until_async(|| {
                let observer = observer.clone();
                async move {
                    matches!(
                        observer.resolve(&ShortCode::new_unchecked("EAaArVRs")).await,
                        Err(ShortenerError::Gone(_))
                    )
                }
            })
            .await;
    }

    #[tokio::test]
    async fn scheduled_delete_swallows_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::open(dir.path().join("storage.txt")).await.unwrap());
        let service = ShortenerService::with_shared(storage, Sha256Generator::new(), BASE_URL);
        service.shorten("https://example.com", "u1").await.unwrap();
        service.close().await.unwrap();

        // the closed log refuses the write; the task logs and finishes
        service
            .schedule_delete(vec![code("EAaArVRs")], "u1")
            .await
            .unwrap();

        let record = service.storage().get(&code("EAaArVRs")).await.unwrap().unwrap();
        assert!(!record.is_deleted);
    }

    #[tokio::test]
    async fn stats_and_ping() {
        let service = test_service();
        service
            .shorten_batch(
                vec![batch_item("1", "a.com"), batch_item("2", "b.com")],
                "u1",
            )
            .await
            .unwrap();
        service.shorten("https://example.com", "u2").await.unwrap();
        service.shorten("https://rust-lang.org", "").await.unwrap();

        assert_eq!(service.stats().await.unwrap(), Stats { urls: 4, users: 2 });
        service.ping().await.unwrap();
    }

    #[tokio::test]
    async fn file_backed_service_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShortenerConfig::builder()
            .storage(StorageConfig::File {
                path: dir.path().join("storage.txt"),
            })
            .build();

        {
            let service = ShortenerService::open(&config).await.unwrap();
            service.shorten("https://example.com", "u1").await.unwrap();
            service.shorten("https://rust-lang.org", "u1").await.unwrap();
            service
                .delete_user_urls(vec![code("q_J7B_j7")], "u1")
                .await
                .unwrap();
            service.close().await.unwrap();
        }

        let service = ShortenerService::open(&config).await.unwrap();
        assert_eq!(
            service.resolve(&code("EAaArVRs")).await.unwrap(),
            "https://example.com"
        );
        assert!(matches!(
            service.resolve(&code("q_J7B_j7")).await,
            Err(ShortenerError::Gone(_))
        ));
        assert_eq!(service.stats().await.unwrap(), Stats { urls: 2, users: 1 });
    }

    #[tokio::test]
    async fn wider_codes_from_config() {
        let config = ShortenerConfig::builder().code_bytes(9).build();
        let service = ShortenerService::open(&config).await.unwrap();

        let short_url = service.shorten("https://example.com", "").await.unwrap();
        assert_eq!(short_url, "http://localhost:8080/EAaArVRs5qV3");
    }
}
