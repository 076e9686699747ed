//! # pgcast-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PgcastSettings::default()`]
//! 2. **Settings file**: `$PGCAST_SETTINGS` or `~/.pgcast/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `PG_*` and `PGCAST_*` overrides
//!
//! Settings are read once at startup and passed down explicitly; there is
//! no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings_from_path, load_with_env, settings_path,
    validate,
};
pub use types::*;
