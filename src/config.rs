// Application configuration
// Logging can only be switched off in development builds

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // logging is on in debug builds

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // logging is off in production

// Extra toggles for development builds
#[cfg(debug_assertions)]
pub mod dev {
    // Set to false to silence logging entirely while developing.
    // NOTE: this switch only works in debug builds!
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    // Production builds carry no development toggles
    pub const ENABLE_LOGGING: bool = false;
}
