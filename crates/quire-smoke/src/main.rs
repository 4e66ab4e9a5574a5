//! Quire Smoke Harness
//!
//! Drives the offline cache controller through a full install → activate →
//! fetch cycle against a real origin, then replays a navigation with the
//! network cut to exercise the offline fallback. Prints a single JSON
//! verdict line for scripting.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use url::Url;

use quire_cache::{CacheStorage, MemoryStorage};
use quire_common::{init_logging, LogConfig};
use quire_net::{HttpBackend, NetError, NetworkBackend, Request, Response};
use quire_sw::{Client, ControllerConfig, OfflineController, Registration, RegistrationHost};

/// Backend for the offline replay: every fetch fails outright.
struct OfflineBackend;

#[async_trait]
impl NetworkBackend for OfflineBackend {
    async fn fetch(&self, _request: &Request) -> Result<Response, NetError> {
        Err(NetError::RequestFailed("offline probe".to_string()))
    }
}

/// Parse command line arguments
struct Args {
    origin: String,
    generation: String,
    timeout_ms: u64,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut origin = "https://shop.quire.example".to_string();
        let mut generation = "quire-v1".to_string();
        let mut timeout_ms = 10_000u64;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--origin" => {
                    if let Some(val) = args.next() {
                        origin = val;
                    }
                }
                "--generation" => {
                    if let Some(val) = args.next() {
                        generation = val;
                    }
                }
                "--timeout-ms" => {
                    if let Some(val) = args.next() {
                        timeout_ms = val.parse().unwrap_or(10_000);
                    }
                }
                _ => {}
            }
        }

        Self {
            origin,
            generation,
            timeout_ms,
        }
    }
}

fn fetch_report(url: &Url, response: &Option<Response>) -> serde_json::Value {
    match response {
        Some(r) => json!({
            "url": url.as_str(),
            "served": true,
            "status": r.status.as_u16(),
            "from_cache": r.from_cache,
            "body_len": r.body.len(),
        }),
        None => json!({
            "url": url.as_str(),
            "served": false,
        }),
    }
}

#[tokio::main]
async fn main() {
    init_logging(LogConfig::default());

    let args = Args::parse();
    info!(
        origin = %args.origin,
        generation = %args.generation,
        timeout_ms = args.timeout_ms,
        "starting quire smoke harness"
    );

    let config = ControllerConfig {
        generation: args.generation.clone(),
        origin: args.origin.clone(),
        network_timeout_ms: Some(args.timeout_ms),
        ..Default::default()
    };
    let origin = config.origin_url().expect("invalid --origin");

    let storage = Arc::new(MemoryStorage::new());
    // A leftover generation from a previous deploy; activation must sweep it.
    storage
        .open("quire-v0")
        .await
        .expect("in-memory open cannot fail");

    let (registration, mut events) = Registration::new();
    let shared = Arc::new(Mutex::new(registration));
    {
        let mut registration = shared.lock().expect("registration lock");
        registration
            .clients_mut()
            .add(Client::new("page-1", origin.clone()));
        registration.register(&args.generation);
    }

    let backend = Arc::new(HttpBackend::new().expect("http backend"));
    let controller = OfflineController::new(
        config.clone(),
        storage.clone(),
        backend,
        Arc::new(RegistrationHost::new(Arc::clone(&shared))),
    )
    .expect("invalid controller configuration");

    // Install: seed warm-up is best-effort, so this phase always completes
    // even when the origin is unreachable.
    controller.on_install().await;
    shared.lock().expect("registration lock").install_complete();
    let seeded = storage
        .entry_count(&args.generation)
        .await
        .unwrap_or_default();

    // Activate: sweep stale generations, claim the open page.
    controller.on_activate().await;
    let buckets = storage.names().await.expect("in-memory names cannot fail");

    // Live fetches: one navigation, one static asset.
    let shell_url = origin.clone();
    let asset_url = origin
        .join(&config.seed_assets[1])
        .expect("seed asset resolves");

    let shell = controller.on_fetch(Request::navigate(shell_url.clone())).await;
    let asset = controller.on_fetch(Request::get(asset_url.clone())).await;

    // Offline replay: same storage, dead network.
    let offline = OfflineController::new(
        config,
        storage.clone(),
        Arc::new(OfflineBackend),
        Arc::new(RegistrationHost::new(Arc::clone(&shared))),
    )
    .expect("invalid controller configuration");
    let offline_nav = offline.on_fetch(Request::navigate(shell_url.clone())).await;

    let mut event_count = 0usize;
    while events.try_recv().is_ok() {
        event_count += 1;
    }

    let claimed = {
        let registration = shared.lock().expect("registration lock");
        registration.clients().controlled_by(&args.generation).len()
    };

    let swept = buckets == vec![args.generation.clone()];
    let status = if swept && claimed == 1 { "pass" } else { "fail" };
    let result = json!({
        "status": status,
        "origin": args.origin,
        "generation": args.generation,
        "install": { "seeded_entries": seeded },
        "activate": { "buckets": buckets, "clients_claimed": claimed },
        "fetch": {
            "navigation": fetch_report(&shell_url, &shell),
            "static_asset": fetch_report(&asset_url, &asset),
        },
        "offline_replay": { "navigation": fetch_report(&shell_url, &offline_nav) },
        "lifecycle_events": event_count,
    });
    println!("{}", result);
}
