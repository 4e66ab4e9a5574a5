//! The offline cache controller.
//!
//! Install warms the seed assets, activate sweeps stale generations, and
//! fetch applies network-first with cache fallback and opportunistic
//! population. No failure in any phase is ever surfaced to the page: the
//! worst case is behaving as if the controller were absent.

use std::sync::Arc;

use futures::future::join_all;
use http::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use quire_cache::{CacheEntry, CacheError, CacheStorage, RequestKey};
use quire_common::{task, with_timeout};
use quire_net::{NetError, NetworkBackend, Request, Response};

use crate::config::{ConfigError, ControllerConfig};
use crate::lifecycle::HostRuntime;
use crate::policy;

/// Why a seed warm-up failed. Swallowed by the install phase after
/// logging; seeds are best-effort.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Seed asset {url} answered {status}")]
    BadStatus { url: Url, status: StatusCode },
}

/// The offline cache controller.
///
/// Storage, network, and host signals are explicit handles so each phase
/// can be driven against fakes; nothing is reached through globals.
pub struct OfflineController {
    config: ControllerConfig,
    seeds: Vec<Url>,
    fallback_key: RequestKey,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn NetworkBackend>,
    host: Arc<dyn HostRuntime>,
}

impl OfflineController {
    /// Create a controller, resolving the configured paths up front.
    pub fn new(
        config: ControllerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn NetworkBackend>,
        host: Arc<dyn HostRuntime>,
    ) -> Result<Self, ConfigError> {
        let seeds = config.seed_urls()?;
        let fallback_key = RequestKey::get(&config.fallback_url()?);

        Ok(Self {
            config,
            seeds,
            fallback_key,
            storage,
            network,
            host,
        })
    }

    /// The controller's configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Install phase: open the current-generation bucket and warm it with
    /// the seed assets, then request eager takeover.
    ///
    /// Always completes; the seed warm-up is best-effort and a failed
    /// group never blocks activation.
    pub async fn on_install(&self) {
        info!(generation = %self.config.generation, "install started");

        match self.warm_seed_cache().await {
            Ok(()) => debug!(assets = self.seeds.len(), "seed assets cached"),
            Err(e) => warn!(error = %e, "seed warm-up failed, continuing install"),
        }

        self.host.skip_waiting();
    }

    /// Activate phase: sweep every bucket that is not the current
    /// generation, then claim open clients.
    ///
    /// Always completes. Deletions run concurrently and independently; the
    /// phase waits for all of them to settle but none of them can fail it.
    pub async fn on_activate(&self) {
        info!(generation = %self.config.generation, "activate started");

        let names = match self.storage.names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "bucket enumeration failed, skipping sweep");
                Vec::new()
            }
        };

        let stale = names
            .into_iter()
            .filter(|name| name != &self.config.generation);

        join_all(stale.map(|name| {
            let storage = Arc::clone(&self.storage);
            async move {
                match storage.delete(&name).await {
                    Ok(true) => debug!(bucket = %name, "stale bucket deleted"),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(bucket = %name, error = %e, "stale bucket deletion failed")
                    }
                }
            }
        }))
        .await;

        self.host.claim_clients();
    }

    /// Fetch interception: network-first with cache fallback.
    ///
    /// `None` means the controller produced no response, either because
    /// the request is outside the policy (non-GET, extension scheme) or
    /// because both the network and the cache came up empty; the host's
    /// default failure behavior applies.
    pub async fn on_fetch(&self, request: Request) -> Option<Response> {
        if !policy::should_intercept(&request) {
            return None;
        }

        match self.fetch_over_network(&request).await {
            Ok(response) => {
                // The stored copy must exist before the original is handed
                // back; a response body is consumed once.
                let copy = response.duplicate();

                if response.status == StatusCode::OK
                    && policy::is_static_path(&request.url, &self.config.static_segment)
                {
                    self.store_in_background(RequestKey::from_request(&request), copy);
                }

                Some(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed, trying cache");
                self.serve_from_cache(&request).await
            }
        }
    }

    async fn fetch_over_network(&self, request: &Request) -> Result<Response, NetError> {
        match self.config.network_timeout() {
            Some(limit) => with_timeout(limit, self.network.fetch(request))
                .await
                .map_err(|elapsed| NetError::Timeout(elapsed.limit))?,
            None => self.network.fetch(request).await,
        }
    }

    /// Store a response copy without sitting on the response path.
    ///
    /// The task is detached on purpose: the page already has its response,
    /// and a failed store must stay invisible to it.
    fn store_in_background(&self, key: RequestKey, response: Response) {
        let storage = Arc::clone(&self.storage);
        let bucket = self.config.generation.clone();

        task::detach(async move {
            let entry = CacheEntry::from_response(&response);
            let result = async {
                storage.open(&bucket).await?;
                storage.put(&bucket, key, entry).await
            }
            .await;

            if let Err(e) = result {
                debug!(bucket = %bucket, error = %e, "opportunistic store failed");
            }
        });
    }

    async fn serve_from_cache(&self, request: &Request) -> Option<Response> {
        let bucket = &self.config.generation;
        let key = RequestKey::from_request(request);

        match self.storage.match_entry(bucket, &key).await {
            Ok(Some(entry)) => return Some(entry.into_response()),
            Ok(None) => {}
            // A broken cache lookup degrades to a miss.
            Err(e) => warn!(key = %key, error = %e, "cache lookup failed"),
        }

        if request.is_navigation() {
            match self.storage.match_entry(bucket, &self.fallback_key).await {
                Ok(Some(entry)) => {
                    debug!(url = %request.url, "serving offline fallback document");
                    return Some(entry.into_response());
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "fallback lookup failed"),
            }
        }

        None
    }

    /// Fetch and store the whole seed list as a group: nothing is written
    /// unless every asset came back with an unqualified 200.
    async fn warm_seed_cache(&self) -> Result<(), SeedError> {
        self.storage.open(&self.config.generation).await?;

        let mut fetched = Vec::with_capacity(self.seeds.len());
        for url in &self.seeds {
            let request = Request::get(url.clone());
            let response = self.network.fetch(&request).await?;
            if response.status != StatusCode::OK {
                return Err(SeedError::BadStatus {
                    url: url.clone(),
                    status: response.status,
                });
            }
            fetched.push((RequestKey::get(url), CacheEntry::from_response(&response)));
        }

        for (key, entry) in fetched {
            self.storage
                .put(&self.config.generation, key, entry)
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{Client, Registration, RegistrationHost};
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderMap, Method};
    use quire_cache::MemoryStorage;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::sleep;

    const ORIGIN: &str = "https://shop.example";

    fn abs(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            origin: ORIGIN.to_string(),
            ..Default::default()
        }
    }

    /// Network fake scripted per URL. Unknown URLs answer 404; the offline
    /// flag makes every fetch fail outright.
    struct ScriptedBackend {
        routes: StdMutex<HashMap<String, (StatusCode, &'static [u8])>>,
        offline: AtomicBool,
        hits: StdMutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                routes: StdMutex::new(HashMap::new()),
                offline: AtomicBool::new(false),
                hits: StdMutex::new(Vec::new()),
            }
        }

        fn with_seeds() -> Self {
            let backend = Self::new();
            backend.route("/", 200, b"home");
            backend.route("/static/css/store.css", 200, b"body{}");
            backend.route("/static/js/store.js", 200, b"init();");
            backend.route("/static/images/logo.png", 200, b"\x89PNG");
            backend
        }

        fn route(&self, path: &str, status: u16, body: &'static [u8]) {
            let status = StatusCode::from_u16(status).unwrap();
            self.routes
                .lock()
                .unwrap()
                .insert(abs(path).to_string(), (status, body));
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn hit_count(&self) -> usize {
            self.hits.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NetworkBackend for ScriptedBackend {
        async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(NetError::RequestFailed("offline".to_string()));
            }
            self.hits.lock().unwrap().push(request.url.to_string());

            let routes = self.routes.lock().unwrap();
            match routes.get(request.url.as_str()) {
                Some((status, body)) => Ok(Response::new(
                    *status,
                    HeaderMap::new(),
                    Bytes::from_static(body),
                )),
                None => Ok(Response::new(
                    StatusCode::NOT_FOUND,
                    HeaderMap::new(),
                    Bytes::new(),
                )),
            }
        }
    }

    /// Backend whose requests never resolve within any test's patience.
    struct HangingBackend;

    #[async_trait]
    impl NetworkBackend for HangingBackend {
        async fn fetch(&self, _request: &Request) -> Result<Response, NetError> {
            sleep(Duration::from_secs(3600)).await;
            Err(NetError::RequestFailed("unreachable".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        skip_waiting: AtomicBool,
        claimed: AtomicBool,
    }

    impl HostRuntime for RecordingHost {
        fn skip_waiting(&self) {
            self.skip_waiting.store(true, Ordering::SeqCst);
        }

        fn claim_clients(&self) {
            self.claimed.store(true, Ordering::SeqCst);
        }
    }

    fn controller_with(
        config: ControllerConfig,
        storage: Arc<MemoryStorage>,
        network: Arc<dyn NetworkBackend>,
    ) -> (OfflineController, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::default());
        let controller =
            OfflineController::new(config, storage, network, host.clone()).unwrap();
        (controller, host)
    }

    /// The fetch-path store is detached; poll until it lands.
    async fn wait_for_entry(
        storage: &MemoryStorage,
        bucket: &str,
        key: &RequestKey,
    ) -> Option<CacheEntry> {
        for _ in 0..100 {
            if let Ok(Some(entry)) = storage.match_entry(bucket, key).await {
                return Some(entry);
            }
            sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::with_seeds());
        let (controller, host) = controller_with(test_config(), storage.clone(), backend);

        controller.on_install().await;
        controller.on_install().await;

        assert_eq!(storage.names().await.unwrap(), vec!["quire-v1"]);
        assert_eq!(storage.entry_count("quire-v1").await, Some(4));
        assert!(host.skip_waiting.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_install_swallows_seed_failure() {
        let storage = Arc::new(MemoryStorage::new());
        // Logo missing in this deploy; its seed fetch answers 404.
        let backend = Arc::new(ScriptedBackend::new());
        backend.route("/", 200, b"home");
        backend.route("/static/css/store.css", 200, b"body{}");
        backend.route("/static/js/store.js", 200, b"init();");

        let (controller, host) = controller_with(test_config(), storage.clone(), backend);
        controller.on_install().await;

        // The seed group is all-or-nothing, so nothing was stored, but the
        // bucket exists and install still succeeded.
        assert!(storage.has("quire-v1").await.unwrap());
        assert_eq!(storage.entry_count("quire-v1").await, Some(0));
        assert!(host.skip_waiting.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_activate_sweeps_stale_generations() {
        let storage = Arc::new(MemoryStorage::new());
        for bucket in ["quire-v1", "quire-v2", "quire-v3"] {
            storage.open(bucket).await.unwrap();
        }

        let config = ControllerConfig {
            generation: "quire-v3".to_string(),
            ..test_config()
        };
        let backend = Arc::new(ScriptedBackend::with_seeds());
        let (controller, host) = controller_with(config, storage.clone(), backend);

        controller.on_activate().await;

        assert_eq!(storage.names().await.unwrap(), vec!["quire-v3"]);
        assert!(host.claimed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_network_first_populates_static_entry() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::new());
        backend.route("/static/css/store.css", 200, b"fresh{}");

        let (controller, _host) = controller_with(test_config(), storage.clone(), backend);

        let request = Request::get(abs("/static/css/store.css"));
        let key = RequestKey::from_request(&request);
        let response = controller.on_fetch(request).await.unwrap();

        assert!(!response.from_cache);
        assert_eq!(&response.body[..], b"fresh{}");

        let entry = wait_for_entry(&storage, "quire-v1", &key).await.unwrap();
        assert_eq!(entry.body, b"fresh{}");
    }

    #[tokio::test]
    async fn test_dynamic_paths_never_cached() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::new());
        backend.route("/products/", 200, b"<html>catalog</html>");

        let (controller, _host) = controller_with(test_config(), storage.clone(), backend);

        let request = Request::get(abs("/products/"));
        let key = RequestKey::from_request(&request);
        let response = controller.on_fetch(request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        sleep(Duration::from_millis(50)).await;
        assert!(storage
            .match_entry("quire-v1", &key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_non_200_passed_through_uncached() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::new());

        let (controller, _host) = controller_with(test_config(), storage.clone(), backend);

        let request = Request::get(abs("/static/js/gone.js"));
        let key = RequestKey::from_request(&request);
        let response = controller.on_fetch(request).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.from_cache);

        sleep(Duration::from_millis(50)).await;
        assert!(storage
            .match_entry("quire-v1", &key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_offline_serves_cached_subresource() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::with_seeds());
        let (controller, _host) =
            controller_with(test_config(), storage.clone(), backend.clone());

        controller.on_install().await;
        backend.set_offline(true);

        let cached = controller
            .on_fetch(Request::get(abs("/static/css/store.css")))
            .await
            .unwrap();
        assert!(cached.from_cache);
        assert_eq!(&cached.body[..], b"body{}");

        // A sub-resource miss gets no silent fallback to the shell.
        let miss = controller
            .on_fetch(Request::get(abs("/static/js/other.js")))
            .await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back_to_shell() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::with_seeds());
        let (controller, _host) =
            controller_with(test_config(), storage.clone(), backend.clone());

        controller.on_install().await;
        backend.set_offline(true);

        let fallback = controller
            .on_fetch(Request::navigate(abs("/product/leather-journal/")))
            .await
            .unwrap();
        assert!(fallback.from_cache);
        assert_eq!(&fallback.body[..], b"home");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_shell_yields_nothing() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_offline(true);

        let (controller, _host) = controller_with(test_config(), storage.clone(), backend);

        let result = controller
            .on_fetch(Request::navigate(abs("/product/leather-journal/")))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_non_get_bypasses_entirely() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::with_seeds());
        let (controller, _host) =
            controller_with(test_config(), storage.clone(), backend.clone());

        let request = Request::new(Method::POST, abs("/cart/add/"));
        assert!(controller.on_fetch(request).await.is_none());

        // Never looked up, never written, never sent to the network.
        assert_eq!(backend.hit_count(), 0);
        assert!(storage.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extension_scheme_bypasses() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::with_seeds());
        let (controller, _host) =
            controller_with(test_config(), storage.clone(), backend.clone());

        let url = Url::parse("chrome-extension://abcdef/content.js").unwrap();
        assert!(controller.on_fetch(Request::get(url)).await.is_none());
        assert_eq!(backend.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_hung_network_falls_back_to_cache() {
        let storage = Arc::new(MemoryStorage::new());
        storage.open("quire-v1").await.unwrap();

        let url = abs("/static/css/store.css");
        let entry = CacheEntry::from_response(&Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(b"stale{}"),
        ));
        storage
            .put("quire-v1", RequestKey::get(&url), entry)
            .await
            .unwrap();

        let config = ControllerConfig {
            network_timeout_ms: Some(50),
            ..test_config()
        };
        let (controller, _host) = controller_with(config, storage, Arc::new(HangingBackend));

        let response = controller.on_fetch(Request::get(url)).await.unwrap();
        assert!(response.from_cache);
        assert_eq!(&response.body[..], b"stale{}");
    }

    #[tokio::test]
    async fn test_full_cycle_takes_over_eagerly_and_claims_clients() {
        let (registration, _rx) = Registration::new();
        let shared = Arc::new(StdMutex::new(registration));
        {
            let mut registration = shared.lock().unwrap();
            registration
                .clients_mut()
                .add(Client::new("page-1", abs("/products/")));
            registration.register("quire-v1");
        }

        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(ScriptedBackend::with_seeds());
        let host = Arc::new(RegistrationHost::new(Arc::clone(&shared)));
        let controller =
            OfflineController::new(test_config(), storage, backend, host).unwrap();

        controller.on_install().await;
        shared.lock().unwrap().install_complete();
        assert!(shared.lock().unwrap().active().unwrap().is_active());

        controller.on_activate().await;
        let registration = shared.lock().unwrap();
        assert_eq!(
            registration.clients().get("page-1").unwrap().controlled_by,
            Some("quire-v1".to_string())
        );
    }
}
