//! In-memory fakes for the service seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::services::{
    ApiError, CredentialError, CredentialStore, RatingPrompt, Services, SessionToken,
    SubscriptionApi, TunnelCredential, TunnelSystem, TunnelSystemError,
};
use crate::state::{Settings, SettingsError, SettingsStore, TunnelKind, TunnelStatus};

/// Records enable/disable requests; never reports status on its own.
#[derive(Default)]
pub struct FakeTunnels {
    statuses: Mutex<HashMap<TunnelKind, TunnelStatus>>,
    requests: Mutex<Vec<(TunnelKind, bool)>>,
    fail_enable: bool,
}

impl FakeTunnels {
    pub fn with_status(filter: TunnelStatus, secure: TunnelStatus) -> Self {
        let tunnels = Self::default();
        tunnels.set_status(TunnelKind::Filter, filter);
        tunnels.set_status(TunnelKind::SecureTunnel, secure);
        tunnels
    }

    pub fn failing_enable() -> Self {
        Self {
            fail_enable: true,
            ..Self::default()
        }
    }

    pub fn set_status(&self, kind: TunnelKind, status: TunnelStatus) {
        self.statuses.lock().unwrap().insert(kind, status);
    }

    pub fn requests(&self) -> Vec<(TunnelKind, bool)> {
        self.requests.lock().unwrap().clone()
    }
}

impl TunnelSystem for FakeTunnels {
    fn status(&self, kind: TunnelKind) -> TunnelStatus {
        self.statuses
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    fn set_enabled(&self, kind: TunnelKind, enabled: bool) -> Result<(), TunnelSystemError> {
        if enabled && self.fail_enable {
            return Err(TunnelSystemError::Command {
                kind,
                message: "permission denied".to_string(),
            });
        }
        self.requests.lock().unwrap().push((kind, enabled));
        Ok(())
    }
}

/// Scripted subscription API.
pub struct FakeApi {
    auth: Result<SessionToken, ApiError>,
    fetch: Result<TunnelCredential, ApiError>,
    auth_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    gate: Mutex<Option<Receiver<()>>>,
}

impl FakeApi {
    fn scripted(
        auth: Result<SessionToken, ApiError>,
        fetch: Result<TunnelCredential, ApiError>,
    ) -> Self {
        Self {
            auth,
            fetch,
            auth_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        }
    }

    pub fn succeeding() -> Self {
        Self::scripted(
            Ok(SessionToken("session".to_string())),
            Ok(TunnelCredential {
                id: "key-1".to_string(),
                key_base64: "c2VjcmV0LWtleQ==".to_string(),
            }),
        )
    }

    pub fn failing_auth(error: ApiError) -> Self {
        Self {
            auth: Err(error),
            ..Self::succeeding()
        }
    }

    pub fn failing_fetch(error: ApiError) -> Self {
        Self {
            fetch: Err(error),
            ..Self::succeeding()
        }
    }

    /// Make `authenticate` block until the returned sender fires or drops.
    pub fn held(self) -> (Self, Sender<()>) {
        let (release, gate) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(gate);
        (self, release)
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl SubscriptionApi for FakeApi {
    fn authenticate(&self) -> Result<SessionToken, ApiError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.auth.clone()
    }

    fn fetch_credential(&self, _session: &SessionToken) -> Result<TunnelCredential, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch.clone()
    }
}

#[derive(Default)]
pub struct FakeCredentials {
    installed: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeCredentials {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }
}

impl CredentialStore for FakeCredentials {
    fn install(&self, credential: &TunnelCredential) -> Result<(), CredentialError> {
        if self.fail {
            return Err(CredentialError::Storage("keychain locked".to_string()));
        }
        self.installed.lock().unwrap().push(credential.id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRating {
    requests: AtomicUsize,
}

impl FakeRating {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RatingPrompt for FakeRating {
    fn request_review(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Settings kept in memory; clones share storage.
#[derive(Clone, Default)]
pub struct MemorySettingsStore {
    settings: Arc<Mutex<Settings>>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn saved(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Settings {
        self.saved()
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.settings.lock().unwrap() = settings.clone();
        Ok(())
    }
}

/// The four fakes, kept so tests can inspect them after wiring.
pub struct Fakes {
    pub tunnels: Arc<FakeTunnels>,
    pub api: Arc<FakeApi>,
    pub credentials: Arc<FakeCredentials>,
    pub rating: Arc<FakeRating>,
}

impl Fakes {
    pub fn new(tunnels: FakeTunnels, api: FakeApi) -> Self {
        Self {
            tunnels: Arc::new(tunnels),
            api: Arc::new(api),
            credentials: Arc::new(FakeCredentials::default()),
            rating: Arc::new(FakeRating::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            tunnels: self.tunnels.clone(),
            api: self.api.clone(),
            credentials: self.credentials.clone(),
            rating: self.rating.clone(),
        }
    }
}
