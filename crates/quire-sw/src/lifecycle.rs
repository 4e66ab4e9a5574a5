//! Controller lifecycle: generations, registration slots, and clients.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// Lifecycle state of one controller generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkerState {
    /// No install has begun.
    #[default]
    Uninstalled,
    /// Install phase running.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activate phase running.
    Activating,
    /// Active and controlling pages.
    Active,
    /// Superseded by a newer generation.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        }
    }
}

/// One installed version of the controller.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Generation name; doubles as the bucket name it owns.
    pub name: String,

    /// Current state.
    pub state: WorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl Generation {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: WorkerState::Installing,
            state_changed_at: Instant::now(),
        }
    }

    fn set_state(&mut self, state: WorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Active
    }
}

/// Lifecycle notifications emitted by a registration.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A new generation began installing.
    UpdateFound { generation: String },
    /// A generation changed state.
    StateChange {
        generation: String,
        state: WorkerState,
    },
    /// A client came under the control of a generation.
    ControllerChange {
        client_id: String,
        generation: String,
    },
}

/// A controlled page.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Generation controlling this client, if any.
    pub controlled_by: Option<String>,
}

impl Client {
    /// Create an uncontrolled client.
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controlled_by: None,
        }
    }
}

/// The set of open pages for this origin.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Register an open page.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Deregister a page.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// All clients controlled by the given generation.
    pub fn controlled_by(&self, generation: &str) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.controlled_by.as_deref() == Some(generation))
            .collect()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn claim(&mut self, generation: &str) -> Vec<String> {
        let mut claimed = Vec::new();
        for client in self.clients.values_mut() {
            if client.controlled_by.as_deref() != Some(generation) {
                client.controlled_by = Some(generation.to_string());
                claimed.push(client.id.clone());
            }
        }
        claimed
    }
}

/// Registration of the controller against its origin.
///
/// Holds up to three generation slots. Multiple installed-but-inactive
/// generations may coexist transiently; exactly one active generation
/// controls fetches at a time.
pub struct Registration {
    installing: Option<Generation>,
    waiting: Option<Generation>,
    active: Option<Generation>,
    skip_requested: bool,
    clients: Clients,
    events: mpsc::UnboundedSender<LifecycleEvent>,
}

impl Registration {
    /// Create an empty registration and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                installing: None,
                waiting: None,
                active: None,
                skip_requested: false,
                clients: Clients::default(),
                events,
            },
            receiver,
        )
    }

    /// The generation currently installing.
    pub fn installing(&self) -> Option<&Generation> {
        self.installing.as_ref()
    }

    /// The generation installed and waiting for activation.
    pub fn waiting(&self) -> Option<&Generation> {
        self.waiting.as_ref()
    }

    /// The active generation.
    pub fn active(&self) -> Option<&Generation> {
        self.active.as_ref()
    }

    /// The client set.
    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Mutable access to the client set (pages opening and closing).
    pub fn clients_mut(&mut self) -> &mut Clients {
        &mut self.clients
    }

    /// Begin installing a new generation.
    pub fn register(&mut self, generation: &str) {
        debug!(generation, "registration update");
        let gen = Generation::new(generation);
        self.emit(LifecycleEvent::UpdateFound {
            generation: gen.name.clone(),
        });
        self.emit(LifecycleEvent::StateChange {
            generation: gen.name.clone(),
            state: gen.state,
        });
        self.installing = Some(gen);
    }

    /// The installing generation finished its install phase.
    ///
    /// Moves it to the waiting slot; if eager takeover was requested during
    /// install, promotes it immediately.
    pub fn install_complete(&mut self) {
        if let Some(mut gen) = self.installing.take() {
            gen.set_state(WorkerState::Installed);
            self.emit(LifecycleEvent::StateChange {
                generation: gen.name.clone(),
                state: gen.state,
            });
            self.waiting = Some(gen);
        }
        if self.skip_requested {
            self.skip_requested = false;
            self.promote_waiting();
        }
    }

    /// Eager takeover: skip the grace period that waits for the old
    /// generation's clients to go away.
    ///
    /// Promotes the waiting generation now, or records the request if the
    /// install phase has not completed yet.
    pub fn skip_waiting(&mut self) {
        if self.waiting.is_some() {
            self.promote_waiting();
        } else {
            self.skip_requested = true;
        }
    }

    /// Take control of every open client immediately, without waiting for
    /// a reload.
    pub fn claim_clients(&mut self) {
        let generation = match self.active.as_ref() {
            Some(gen) => gen.name.clone(),
            None => return,
        };
        for client_id in self.clients.claim(&generation) {
            self.emit(LifecycleEvent::ControllerChange {
                client_id,
                generation: generation.clone(),
            });
        }
    }

    fn promote_waiting(&mut self) {
        let Some(mut gen) = self.waiting.take() else {
            return;
        };

        if let Some(mut old) = self.active.take() {
            old.set_state(WorkerState::Redundant);
            self.emit(LifecycleEvent::StateChange {
                generation: old.name.clone(),
                state: old.state,
            });
        }

        gen.set_state(WorkerState::Activating);
        self.emit(LifecycleEvent::StateChange {
            generation: gen.name.clone(),
            state: gen.state,
        });
        gen.set_state(WorkerState::Active);
        self.emit(LifecycleEvent::StateChange {
            generation: gen.name.clone(),
            state: gen.state,
        });
        self.active = Some(gen);
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }
}

/// Control signals the controller sends back to its host runtime.
pub trait HostRuntime: Send + Sync {
    /// Install-phase signal: proceed to activation without the usual
    /// no-active-clients delay.
    fn skip_waiting(&self);

    /// Activate-phase signal: take control of open pages now.
    fn claim_clients(&self);
}

/// [`HostRuntime`] that forwards signals to a shared [`Registration`].
pub struct RegistrationHost {
    registration: Arc<Mutex<Registration>>,
}

impl RegistrationHost {
    pub fn new(registration: Arc<Mutex<Registration>>) -> Self {
        Self { registration }
    }
}

impl HostRuntime for RegistrationHost {
    fn skip_waiting(&self) {
        if let Ok(mut registration) = self.registration.lock() {
            registration.skip_waiting();
        }
    }

    fn claim_clients(&self) {
        if let Ok(mut registration) = self.registration.lock() {
            registration.claim_clients();
        }
    }
}
