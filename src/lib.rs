pub mod api;
pub mod app;
pub mod backend;
pub mod camera;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod mesh;
pub mod quote;
mod renderer;
pub mod runtime;
pub mod session;
pub mod token;
pub mod upload;
pub mod viewer;

pub use app::StudioApp;
pub use config::StudioConfig;
pub use session::Session;

// ── Web entry‑point ──
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    // Redirect `log` macros & panic messages to the browser console
    eframe::WebLogger::init(log::LevelFilter::Debug).ok();
    console_error_panic_hook::set_once();

    let canvas = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id("printstudio_canvas"))
        .ok_or_else(|| JsValue::from_str("missing <canvas id=\"printstudio_canvas\">"))?
        .dyn_into::<web_sys::HtmlCanvasElement>()?;

    eframe::WebRunner::new()
        .start(
            canvas,
            eframe::WebOptions::default(),
            Box::new(|cc| Ok(Box::new(StudioApp::new(cc)))),
        )
        .await?;

    Ok(())
}
