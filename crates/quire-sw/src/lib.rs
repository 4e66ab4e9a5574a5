//! # Quire SW
//!
//! The offline cache controller behind the quire storefront: a per-origin
//! background agent that warms a versioned cache bucket at install time,
//! sweeps prior generations at activation, and mediates every GET with a
//! network-first, cache-fallback policy.
//!
//! ## Architecture
//!
//! ```text
//! Registration
//!     ├── installing (Generation)
//!     ├── waiting    (Generation)      ← skip-waiting promotes eagerly
//!     ├── active     (Generation)
//!     └── Clients                      ← claimed at activation
//!
//! OfflineController
//!     ├── on_install  ─→ seed bucket "quire-vN", signal skip-waiting
//!     ├── on_activate ─→ delete buckets ≠ "quire-vN", signal claim
//!     └── on_fetch    ─→ network first
//!                          ├── 200 + static path → detached store
//!                          └── failure → cache → shell fallback → nothing
//! ```
//!
//! Storage and network are injected handles ([`quire_cache::CacheStorage`],
//! [`quire_net::NetworkBackend`]), so every phase runs against fakes in
//! tests and against real backends in a host.

pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod policy;

pub use config::{ConfigError, ControllerConfig};
pub use controller::{OfflineController, SeedError};
pub use lifecycle::{
    Client, Clients, Generation, HostRuntime, LifecycleEvent, Registration, RegistrationHost,
    WorkerState,
};
