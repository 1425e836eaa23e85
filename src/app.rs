use std::sync::{Arc, Mutex};
use std::time::Duration;

use eframe::egui;
use rfd::AsyncFileDialog;

use crate::api::FileUpload;
use crate::backend;
use crate::camera::FitState;
use crate::catalog::{self, INFILL_PRESETS, Locale, MaterialId, Technology};
use crate::config::StudioConfig;
use crate::error::{Notice, NoticeLevel};
use crate::renderer::GpuLines;
use crate::runtime::{self, Executor};
use crate::session::Session;
use crate::upload::PlatformHandles;
use crate::viewer::Viewer;

/// How long a notice stays on screen, in seconds.
const NOTICE_TTL: f64 = 6.0;
/// Radians of orbit per dragged point.
const ORBIT_SPEED: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Configure,
    Cart,
    Batches,
}

enum CartAction {
    Quantity(String, u32),
    Remove(String),
    Launch,
}

pub struct StudioApp {
    locale: Locale,
    page: Page,
    session: Session<PlatformHandles>,
    viewer: Viewer,
    /// Filled by the file dialog task, taken on the next frame.
    picked: Arc<Mutex<Option<FileUpload>>>,
    notices: Vec<(Notice, f64)>,
    gpu: Option<Arc<Mutex<GpuLines>>>,
    gpu_failed: bool,
    /// Material the uploaded edge colors belong to.
    edge_material: Option<MaterialId>,
}

impl StudioApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let config = StudioConfig::load();
        log::info!("quoting service at {}", config.api_base);
        Self::with_config(config)
    }

    pub fn with_config(config: StudioConfig) -> Self {
        let session = Session::new(
            &config,
            backend::platform_backend(&config),
            PlatformHandles::default(),
            Box::new(Executor),
        );
        Self {
            locale: config.locale,
            page: Page::Configure,
            session,
            viewer: Viewer::new(&config),
            picked: Arc::new(Mutex::new(None)),
            notices: Vec::new(),
            gpu: None,
            gpu_failed: false,
            edge_material: None,
        }
    }

    fn push_notice(&mut self, notice: Notice, now: f64) {
        match notice.level {
            NoticeLevel::Error => log::error!("{notice}"),
            NoticeLevel::Warning => log::warn!("{notice}"),
            NoticeLevel::Info => log::info!("{notice}"),
        }
        self.notices.push((notice, now + NOTICE_TTL));
    }

    /// Hand a freshly picked file to the session and the viewer.
    fn take_picked_file(&mut self) {
        let picked = match self.picked.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(file) = picked else { return };
        let bytes = Arc::clone(&file.bytes);
        if let Some(model) = self.session.upload_file(file) {
            self.viewer.show(model, bytes, self.session.spawner());
        }
    }

    fn open_page(&mut self, page: Page) {
        if self.page == page {
            return;
        }
        self.page = page;
        match page {
            Page::Cart => self.session.refresh_cart(),
            Page::Batches => self.session.refresh_batches(),
            Page::Configure => {}
        }
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("PrintStudio");
                ui.separator();
                let mut page = self.page;
                ui.selectable_value(&mut page, Page::Configure, "Configure");
                ui.selectable_value(&mut page, Page::Cart, "Cart");
                ui.selectable_value(&mut page, Page::Batches, "Batches");
                self.open_page(page);

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.selectable_value(&mut self.locale, Locale::Cn, "CN");
                    ui.selectable_value(&mut self.locale, Locale::En, "EN");
                });
            });
        });
    }

    fn notice_bar(&mut self, ctx: &egui::Context, now: f64) {
        self.notices.retain(|(_, until)| *until > now);
        if self.notices.is_empty() {
            return;
        }
        egui::TopBottomPanel::bottom("notices").show(ctx, |ui| {
            for (notice, _) in &self.notices {
                let color = match notice.level {
                    NoticeLevel::Info => egui::Color32::LIGHT_GREEN,
                    NoticeLevel::Warning => egui::Color32::YELLOW,
                    NoticeLevel::Error => egui::Color32::LIGHT_RED,
                };
                ui.colored_label(color, notice.text.as_str());
            }
        });
    }

    fn configure_panel(&mut self, ctx: &egui::Context, now: Duration) {
        let locale = self.locale;
        egui::SidePanel::left("side_panel")
            .resizable(false)
            .min_width(220.0)
            .show(ctx, |ui| {
                ui.heading("Model");
                if ui.button("Import STL…").clicked() {
                    spawn_file_picker(Arc::clone(&self.picked), ctx.clone());
                }
                match self.session.upload().current() {
                    Some(asset) => ui.label(asset.name()),
                    None => ui.weak("No file loaded"),
                };

                ui.separator();
                ui.heading("Technology");
                let selection = self.session.quote().selection();
                ui.horizontal_wrapped(|ui| {
                    for tech in Technology::ALL {
                        if ui.selectable_label(selection.technology == tech, tech.label(locale)).clicked()
                            && selection.technology != tech
                        {
                            self.session.set_technology(tech, now);
                        }
                    }
                });

                ui.label("Material");
                egui::ComboBox::from_id_salt("material")
                    .selected_text(selection.material.name(locale))
                    .show_ui(ui, |ui| {
                        for m in catalog::materials(selection.technology, locale) {
                            let text = egui::RichText::new(m.name).color(m.color);
                            if ui.selectable_label(selection.material == m.id, text).clicked() {
                                self.session.set_material(m.id, now);
                            }
                        }
                    });

                if selection.technology.has_infill() {
                    ui.label("Infill");
                    ui.horizontal(|ui| {
                        for preset in INFILL_PRESETS {
                            let label = format!("{preset}%");
                            if ui.selectable_label(selection.infill == preset, label).clicked() {
                                self.session.set_infill(preset, now);
                            }
                        }
                    });
                }

                ui.separator();
                self.price_card(ui, now);

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Zoom in").clicked() {
                        self.viewer.zoom_in();
                    }
                    if ui.button("Zoom out").clicked() {
                        self.viewer.zoom_out();
                    }
                });
            });
    }

    fn price_card(&mut self, ui: &mut egui::Ui, now: Duration) {
        let quote = self.session.quote();
        let q = quote.quote();
        ui.heading("Estimate");
        if quote.is_computing() {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Calculating…");
            });
        } else if q.is_priced() {
            ui.label(egui::RichText::new(format!("{:.2} €", q.price)).size(24.0).strong());
        } else {
            ui.label(egui::RichText::new("-- €").size(24.0));
        }
        if let Some(volume) = quote.volume_cm3() {
            ui.label(format!("Volume: {volume:.2} cm³"));
        } else if self.session.upload().is_analyzing() {
            ui.label("Analyzing…");
        }
        if q.is_priced() {
            ui.label(format!("Weight: {:.1} g", q.weight_g));
        }

        let retryable = quote.volume_cm3().is_some() && !quote.is_computing() && !quote.is_current();
        if retryable && ui.button("Retry price").clicked() {
            self.session.retry_quote(now);
        }

        let label = if self.session.is_committing() { "Saving…" } else { "Add to cart" };
        if ui.add_enabled(self.session.can_commit(), egui::Button::new(label)).clicked() {
            if let Err(e) = self.session.commit() {
                log::debug!("commit refused: {e}");
            }
        }
    }

    fn viewport(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let edge_material = self.session.quote().selection().material;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.set_min_size(ui.available_size());
            let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());

            if response.dragged() && ui.input(|i| i.pointer.primary_down()) {
                let delta = response.drag_delta();
                self.viewer.camera_mut().orbit(delta.x * ORBIT_SPEED, delta.y * ORBIT_SPEED);
            }
            if response.hovered() {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll.abs() > 0.0 {
                    self.viewer.camera_mut().dolly((scroll * 0.001).exp());
                }
            }

            if self.viewer.fit_state() == FitState::Idle {
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Import an STL file to preview it",
                    egui::FontId::proportional(16.0),
                    ui.visuals().weak_text_color(),
                );
            }

            let Some(gl) = frame.gl() else { return };
            if self.gpu.is_none() && !self.gpu_failed {
                match unsafe { GpuLines::new(gl) } {
                    Ok(gpu) => self.gpu = Some(Arc::new(Mutex::new(gpu))),
                    Err(e) => {
                        log::error!("line renderer unavailable: {e}");
                        self.gpu_failed = true;
                    }
                }
            }
            let Some(gpu) = &self.gpu else { return };

            let dirty = self.viewer.take_dirty();
            if dirty || self.edge_material != Some(edge_material) {
                let color = edge_material.color();
                let rgb = [color.r(), color.g(), color.b()].map(|c| f32::from(c) / 255.0);
                let verts = self.viewer.geometry().map(|g| g.edge_vertices(rgb)).unwrap_or_default();
                if let Ok(mut gpu) = gpu.lock() {
                    unsafe { gpu.upload_vertices(gl, &verts) };
                }
                self.edge_material = Some(edge_material);
            }

            let aspect = rect.width() / rect.height().max(1.0);
            self.viewer.set_viewport_aspect(aspect);
            let mvp = self.viewer.camera().view_proj(aspect);
            let gpu_for_cb = Arc::clone(gpu);
            let callback = egui_glow::CallbackFn::new(move |_info, painter| {
                if let Ok(gpu) = gpu_for_cb.lock() {
                    unsafe { gpu.paint(painter.gl(), mvp) };
                }
            });
            ui.painter().add(egui::PaintCallback { rect, callback: Arc::new(callback) });
        });
    }

    fn cart_page(&mut self, ctx: &egui::Context) {
        let locale = self.locale;
        let mut actions = Vec::new();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Cart");
                if self.session.cart().is_loading() {
                    ui.spinner();
                } else if ui.button("Refresh").clicked() {
                    self.session.refresh_cart();
                }
            });
            let cart = self.session.cart();
            if cart.items().is_empty() {
                ui.weak("The cart is empty");
                return;
            }
            egui::Grid::new("cart_items").striped(true).num_columns(7).show(ui, |ui| {
                for header in ["File", "Technology", "Material", "Infill", "Unit price", "Quantity", ""] {
                    ui.strong(header);
                }
                ui.end_row();
                for item in cart.items() {
                    let c = &item.config;
                    ui.label(item.filename.as_str());
                    ui.label(c.tech.label(locale));
                    ui.label(c.material.name(locale));
                    ui.label(format!("{}%", c.infill));
                    ui.label(format!("{:.2} €", c.price));
                    ui.horizontal(|ui| {
                        if ui.add_enabled(item.quantity > 1, egui::Button::new("−")).clicked() {
                            actions.push(CartAction::Quantity(item.id.clone(), item.quantity - 1));
                        }
                        ui.label(item.quantity.to_string());
                        if ui.button("+").clicked() {
                            actions.push(CartAction::Quantity(item.id.clone(), item.quantity + 1));
                        }
                    });
                    if ui.button("Remove").clicked() {
                        actions.push(CartAction::Remove(item.id.clone()));
                    }
                    ui.end_row();
                }
            });
            ui.separator();
            ui.label(egui::RichText::new(format!("Total: {:.2} €", cart.total())).strong());
            if ui.button("Launch production").clicked() {
                actions.push(CartAction::Launch);
            }
        });

        for action in actions {
            match action {
                CartAction::Quantity(id, qty) => {
                    self.session.set_quantity(&id, qty);
                }
                CartAction::Remove(id) => self.session.remove_item(&id),
                CartAction::Launch => self.session.launch_production(),
            }
        }
    }

    fn batches_page(&mut self, ctx: &egui::Context) {
        let mut selected = None;
        egui::SidePanel::left("batch_list").min_width(260.0).show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Batches");
                if self.session.history().is_loading() {
                    ui.spinner();
                } else if ui.button("Refresh").clicked() {
                    self.session.refresh_batches();
                }
            });
            let history = self.session.history();
            egui::ScrollArea::vertical().show(ui, |ui| {
                for batch in history.batches() {
                    let text = format!("{}  {}  ({})", batch.id, batch.status, batch.progress);
                    let is_selected = history.selected() == Some(batch.id.as_str());
                    if ui.selectable_label(is_selected, text).clicked() {
                        selected = Some(batch.id.clone());
                    }
                }
                if history.batches().is_empty() && !history.is_loading() {
                    ui.weak("No batches yet");
                }
            });
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            let history = self.session.history();
            if history.is_loading_detail() {
                ui.spinner();
                return;
            }
            let Some(detail) = history.detail() else {
                ui.weak("Select a batch");
                return;
            };
            egui::Grid::new("batch_items").striped(true).show(ui, |ui| {
                ui.strong("File");
                ui.strong("Status");
                ui.strong("Configuration");
                ui.end_row();
                for item in &detail.items {
                    ui.label(item.filename.as_str());
                    ui.label(item.status.as_str());
                    ui.monospace(item.config.to_string());
                    ui.end_row();
                }
            });
            ui.separator();
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.monospace(detail.content.as_str());
            });
        });
        if let Some(id) = selected {
            self.session.select_batch(&id);
        }
    }
}

impl eframe::App for StudioApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let clock = ctx.input(|i| i.time);
        let now = Duration::from_secs_f64(clock.max(0.0));

        self.take_picked_file();
        self.session.poll(now);
        for notice in self.session.drain_notices() {
            self.push_notice(notice, clock);
        }
        if self.session.current_model().is_none() && self.viewer.fit_state() != FitState::Idle {
            self.viewer.clear();
        }
        if let Some(notice) = self.viewer.poll() {
            self.push_notice(notice, clock);
        }

        self.top_bar(ctx);
        self.notice_bar(ctx, clock);
        match self.page {
            Page::Configure => {
                self.configure_panel(ctx, now);
                self.viewport(ctx, frame);
            }
            Page::Cart => self.cart_page(ctx),
            Page::Batches => self.batches_page(ctx),
        }

        let loading = matches!(self.viewer.fit_state(), FitState::Loading(_));
        if self.session.is_busy() || loading {
            ctx.request_repaint_after(Duration::from_millis(30));
        } else if !self.notices.is_empty() {
            ctx.request_repaint_after(Duration::from_secs(1));
        }
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        if let (Some(gl), Some(gpu)) = (gl, &self.gpu) {
            if let Ok(gpu) = gpu.lock() {
                unsafe { gpu.destroy(gl) };
            }
        }
    }
}

fn spawn_file_picker(target: Arc<Mutex<Option<FileUpload>>>, ctx: egui::Context) {
    runtime::execute(async move {
        if let Some(handle) = AsyncFileDialog::new()
            .add_filter("STL mesh", &["stl"])
            .pick_file()
            .await
        {
            let name = handle.file_name();
            let bytes = handle.read().await;
            if let Ok(mut slot) = target.lock() {
                *slot = Some(FileUpload { name, bytes: Arc::from(bytes) });
            }
            ctx.request_repaint();
        }
    });
}
