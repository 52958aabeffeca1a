use crate::peer::types::Role;
use std::sync::Mutex;

/// Descriptor of the call this tab is currently part of.
pub struct CallSession {
    pub room: String,
    pub display_name: String,
    pub role: Role,
}

// Primitive singleton (Mutex). One call per process is enough here.
use once_cell::sync::Lazy;
pub static SESSION: Lazy<Mutex<Option<CallSession>>> = Lazy::new(|| Mutex::new(None));

/// Snapshot of (room, display_name, role) for the active call, if any.
pub fn current() -> Option<(String, String, Role)> {
    SESSION
        .lock()
        .unwrap()
        .as_ref()
        .map(|s| (s.room.clone(), s.display_name.clone(), s.role))
}
