//! Holder for the active VM session.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::VmSession;

/// Shared slot holding the session commands run against.
///
/// Cloning yields another handle to the same slot. Readers see whatever
/// was registered last; nothing is cached, so swapping the session takes
/// effect for every later call. Calls already in flight keep the handle
/// they read.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    slot: Arc<RwLock<Option<Arc<dyn VmSession>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, for hosts that run a single session.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Register `session`, or clear the slot with `None`.
    pub fn register(&self, session: Option<Arc<dyn VmSession>>) {
        let present = session.is_some();
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = session;
        tracing::debug!(present, "VM session registration changed");
    }

    /// Clear the slot.
    pub fn revoke(&self) {
        self.register(None);
    }

    /// The session registered right now.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn VmSession>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a session is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}
