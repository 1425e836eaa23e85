//! Implementations of [`Backend`](crate::api::Backend).
//!
//! The web build talks HTTP to the quoting service. Native builds have no browser
//! fetch and answer in process with the same pricing rules.

use std::sync::Arc;

use crate::api::Backend;
use crate::config::StudioConfig;

#[cfg(target_arch = "wasm32")]
mod http;
mod local;

#[cfg(target_arch = "wasm32")]
pub use http::HttpBackend;
pub use local::LocalBackend;

#[cfg(target_arch = "wasm32")]
pub fn platform_backend(config: &StudioConfig) -> Arc<dyn Backend> {
    Arc::new(HttpBackend::new(&config.api_base))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn platform_backend(config: &StudioConfig) -> Arc<dyn Backend> {
    log::info!("no HTTP transport on native builds, quoting locally instead of {}", config.api_base);
    Arc::new(LocalBackend::new())
}
