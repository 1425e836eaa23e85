// Desktop entry point for PrintStudio

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting PrintStudio...");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("PrintStudio")
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "PrintStudio",
        options,
        Box::new(|cc| Ok(Box::new(printstudio_ui::StudioApp::new(cc)))),
    )
}

// The browser build starts from the library's `start`.
#[cfg(target_arch = "wasm32")]
fn main() {}
