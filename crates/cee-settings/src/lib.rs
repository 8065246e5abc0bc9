//! # cee-settings
//!
//! Configuration management with layered sources for the cee engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CeeSettings::default()`]
//! 2. **User file**: `~/.cee/settings.json`, or the path in `CEE_SETTINGS`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `CEE_*` overrides (highest priority)
//!
//! The process-wide value is initialized once at startup ([`init_settings`])
//! and read through [`get_settings`]; components receive the sections they
//! need by value rather than reaching for the global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

use std::sync::Arc;

use parking_lot::RwLock;

/// Global settings cell. Swapped wholesale on reload; readers clone the `Arc`.
static SETTINGS: RwLock<Option<Arc<CeeSettings>>> = parking_lot::const_rwlock(None);

/// Get the global settings instance.
///
/// On first call, loads settings from disk with env var overrides. If
/// loading fails, logs a warning and returns compiled defaults.
pub fn get_settings() -> Arc<CeeSettings> {
    if let Some(ref s) = *SETTINGS.read() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    // Another thread may have initialized while we waited for the write lock
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            CeeSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Install a specific settings value as the global.
pub fn init_settings(settings: CeeSettings) -> Arc<CeeSettings> {
    let settings = Arc::new(settings);
    *SETTINGS.write() = Some(Arc::clone(&settings));
    settings
}
