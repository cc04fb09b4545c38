use tokio::sync::watch;

use crate::models::Identity;

/// Operator-editable fields. Writes are never validated; validation happens
/// when a request is triggered.
pub struct InputState {
    identity: watch::Sender<Identity>,
}

impl InputState {
    pub fn new() -> Self {
        let (identity, _) = watch::channel(Identity::default());
        Self { identity }
    }

    /// Returns `true` if the stored value changed.
    pub fn set_user(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.identity.send_if_modified(|identity| {
            if identity.user == value {
                return false;
            }
            identity.user = value;
            true
        })
    }

    /// Returns `true` if the stored value changed.
    pub fn set_device(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.identity.send_if_modified(|identity| {
            if identity.device == value {
                return false;
            }
            identity.device = value;
            true
        })
    }

    pub fn current_identity(&self) -> Identity {
        self.identity.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Identity> {
        self.identity.subscribe()
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}
