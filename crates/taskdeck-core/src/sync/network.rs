use std::sync::atomic::{AtomicBool, Ordering};

/// Last known connectivity, fed by online/offline notifications.
#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkMonitor {
    #[must_use]
    pub const fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a transition and return the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}
