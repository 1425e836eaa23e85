//! Runtime settings.
//!
//! Web builds read a JSON object from `localStorage["printstudio.config"]`; native
//! builds read the JSON file named by `PRINTSTUDIO_CONFIG`. Any field may be left out.

use std::time::Duration;

use serde::Deserialize;

use crate::catalog::Locale;

pub const STORAGE_KEY: &str = "printstudio.config";
pub const CONFIG_ENV: &str = "PRINTSTUDIO_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Base URL of the quoting service, without trailing slash.
    pub api_base: String,
    pub debounce_ms: u64,
    pub fit_margin: f32,
    pub fov_y_degrees: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub zoom_step: f32,
    pub locale: Locale,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_owned(),
            debounce_ms: 100,
            fit_margin: 1.2,
            fov_y_degrees: 50.0,
            min_distance: 10.0,
            max_distance: 400.0,
            zoom_step: 1.2,
            locale: Locale::En,
        }
    }
}

impl StudioConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse `json`, falling back to defaults (with a warning) when it is malformed.
    pub fn from_json_or_default(json: &str) -> Self {
        match serde_json::from_str::<Self>(json) {
            Ok(cfg) => cfg.sanitized(),
            Err(e) => {
                log::warn!("ignoring malformed configuration: {e}");
                Self::default()
            }
        }
    }

    /// Replace values that would break the camera or the debounce with defaults.
    fn sanitized(mut self) -> Self {
        let d = Self::default();
        if !(self.fit_margin.is_finite() && self.fit_margin >= 1.0) {
            self.fit_margin = d.fit_margin;
        }
        if !(self.fov_y_degrees > 1.0 && self.fov_y_degrees < 179.0) {
            self.fov_y_degrees = d.fov_y_degrees;
        }
        if !(self.min_distance > 0.0 && self.min_distance < self.max_distance) {
            self.min_distance = d.min_distance;
            self.max_distance = d.max_distance;
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 1.0) {
            self.zoom_step = d.zoom_step;
        }
        self.api_base = self.api_base.trim_end_matches('/').to_owned();
        self
    }

    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let stored = web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .and_then(|s| s.get_item(STORAGE_KEY).ok().flatten());
        match stored {
            Some(json) => Self::from_json_or_default(&json),
            None => Self::default(),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let Ok(path) = std::env::var(CONFIG_ENV) else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(json) => Self::from_json_or_default(&json),
            Err(e) => {
                log::warn!("cannot read {path}: {e}");
                Self::default()
            }
        }
    }
}
