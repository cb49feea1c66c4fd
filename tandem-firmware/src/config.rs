//! Embedded platform configuration
//!
//! `build.rs` validates `platform.toml` and serializes it with postcard;
//! the blob is decoded once at boot.

use defmt::*;
use tandem_core::config::SystemConfig;

static CONFIG_BLOB: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/config.bin"));

/// Decode the embedded configuration, falling back to the defaults
pub fn load() -> SystemConfig {
    match SystemConfig::from_postcard(CONFIG_BLOB) {
        Ok(config) => {
            info!("Loaded embedded configuration ({} bytes)", CONFIG_BLOB.len());
            config
        }
        Err(e) => {
            // build.rs validated the same blob, so this is a toolchain mismatch
            error!("Failed to decode embedded config: {:?}", e);
            error!("Using default configuration");
            SystemConfig::default()
        }
    }
}
