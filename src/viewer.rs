//! The 3D preview: decodes meshes in the background and keeps them framed.

use std::sync::Arc;

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::camera::{AutoFit, FitState, OrbitCamera};
use crate::config::StudioConfig;
use crate::error::Notice;
use crate::mesh::{self, ModelGeometry};
use crate::runtime::{self, Spawn};
use crate::upload::ModelId;

struct Decoded {
    model: ModelId,
    result: anyhow::Result<ModelGeometry>,
}

pub struct Viewer {
    camera: OrbitCamera,
    autofit: AutoFit,
    geometry: Option<ModelGeometry>,
    zoom_step: f32,
    /// Width over height of the viewport the camera renders into.
    aspect: f32,
    /// Geometry changed since the renderer last took it.
    dirty: bool,
    tx: UnboundedSender<Decoded>,
    rx: UnboundedReceiver<Decoded>,
}

impl Viewer {
    pub fn new(config: &StudioConfig) -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self {
            camera: OrbitCamera::new(config.fov_y_degrees, config.min_distance, config.max_distance),
            autofit: AutoFit::new(config.fit_margin),
            geometry: None,
            zoom_step: config.zoom_step,
            aspect: 1.0,
            dirty: true,
            tx,
            rx,
        }
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn fit_state(&self) -> FitState {
        self.autofit.state()
    }

    pub fn geometry(&self) -> Option<&ModelGeometry> {
        self.geometry.as_ref()
    }

    /// Viewport shape used when framing the next model.
    pub fn set_viewport_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn zoom_in(&mut self) {
        self.camera.zoom_in(self.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.camera.zoom_out(self.zoom_step);
    }

    /// Display `model`, decoding `bytes` off the UI flow.
    pub fn show(&mut self, model: ModelId, bytes: Arc<[u8]>, spawner: &dyn Spawn) {
        if !self.autofit.show(model) {
            return;
        }
        self.geometry = None;
        self.dirty = true;
        let tx = self.tx.clone();
        spawner.spawn(runtime::boxed(async move {
            let result = mesh::decode_stl(model, &bytes);
            // The viewer may be gone already; nothing to report to then.
            let _ = tx.unbounded_send(Decoded { model, result });
        }));
    }

    pub fn clear(&mut self) {
        self.autofit.clear();
        self.geometry = None;
        self.dirty = true;
    }

    /// Take decoded meshes and advance the auto-fit state machine.
    pub fn poll(&mut self) -> Option<Notice> {
        let mut notice = None;
        while let Ok(decoded) = self.rx.try_recv() {
            if self.autofit.model() != Some(decoded.model) {
                log::debug!("dropping decoded mesh of replaced model {}", decoded.model);
                continue;
            }
            match decoded.result {
                Ok(mut geometry) => {
                    if self.autofit.on_mesh_decoded(&mut geometry) {
                        self.geometry = Some(geometry);
                        self.dirty = true;
                    }
                }
                Err(e) => {
                    log::warn!("cannot display model {}: {e:#}", decoded.model);
                    notice = Some(Notice::warning(format!("Preview unavailable: {e}")));
                }
            }
        }
        if let Some(geometry) = &self.geometry {
            self.autofit.frame(geometry, &mut self.camera, self.aspect);
        }
        notice
    }

    /// Whether geometry changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}
