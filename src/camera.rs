//! Orbit camera and automatic framing of freshly loaded models.

use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, UnitQuaternion, Vector3};

use crate::mesh::{Aabb, ModelGeometry};
use crate::upload::ModelId;

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub rotation: UnitQuaternion<f32>,
    pub target: Point3<f32>,
    pub distance: f32,
    fov_y: f32,
    min_distance: f32,
    max_distance: f32,
}

impl OrbitCamera {
    pub fn new(fov_y_degrees: f32, min_distance: f32, max_distance: f32) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            target: Point3::origin(),
            distance: min_distance.max(10.0).min(max_distance),
            fov_y: fov_y_degrees.to_radians(),
            min_distance,
            max_distance,
        }
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    /// left-drag → rotate
    pub fn orbit(&mut self, yaw: f32, pitch: f32) {
        self.rotation = UnitQuaternion::from_euler_angles(0.0, yaw, 0.0)
            * UnitQuaternion::from_euler_angles(pitch, 0.0, 0.0)
            * self.rotation;
    }

    /// Move towards the target by `factor` (> 1 closer, < 1 further), within limits.
    ///
    /// A distance already outside the limits (after a fit) is never pushed further
    /// out of them, and a step never reverses direction.
    pub fn dolly(&mut self, factor: f32) {
        if !(factor > 0.0 && factor.is_finite()) {
            return;
        }
        let next = self.distance / factor;
        self.distance = if factor > 1.0 {
            next.max(self.min_distance.min(self.distance))
        } else {
            next.min(self.max_distance.max(self.distance))
        };
    }

    pub fn zoom_in(&mut self, step: f32) {
        self.dolly(step);
    }

    pub fn zoom_out(&mut self, step: f32) {
        self.dolly(1.0 / step);
    }

    /// Look at the box center from far enough that its bounding sphere, grown by
    /// `margin`, fits the narrower of the vertical and horizontal fields of view.
    pub fn fit(&mut self, bounds: &Aabb, margin: f32, aspect: f32) {
        let radius = (bounds.radius() * margin).max(f32::EPSILON);
        self.target = bounds.center();
        self.distance = radius / self.narrowest_half_fov(aspect).sin();
    }

    fn narrowest_half_fov(&self, aspect: f32) -> f32 {
        let half_y = self.fov_y * 0.5;
        if !(aspect.is_finite() && aspect > 0.0) {
            return half_y;
        }
        let half_x = (half_y.tan() * aspect).atan();
        half_y.min(half_x)
    }

    pub fn eye(&self) -> Point3<f32> {
        self.target + Vector3::new(0.0, 0.0, self.distance)
    }

    /// Build an MVP matrix; the model is rotated about the target.
    pub fn view_proj(&self, aspect: f32) -> Matrix4<f32> {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        let far = (self.distance * 10.0).max(10_000.0);
        let proj = Perspective3::new(aspect, self.fov_y, 0.1, far).to_homogeneous();
        let view = Isometry3::look_at_rh(&self.eye(), &self.target, &Vector3::y()).to_homogeneous();
        let pivot = self.target.coords;
        let model = Matrix4::new_translation(&pivot)
            * self.rotation.to_homogeneous()
            * Matrix4::new_translation(&-pivot);
        proj * view * model
    }
}

/// Framing progress for the displayed model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitState {
    Idle,
    /// Waiting for the mesh of `ModelId` to decode.
    Loading(ModelId),
    /// Geometry moved onto the origin, camera not yet adjusted.
    Centered { model: ModelId, bounds: Aabb },
    Framed { model: ModelId, bounds: Aabb },
}

/// Keeps the camera framed on the current model identity.
///
/// Each identity is centered once and framed once; switching identity drops any
/// pending work for the previous one. Manual zoom never touches this state.
#[derive(Debug, Clone)]
pub struct AutoFit {
    state: FitState,
    margin: f32,
}

impl AutoFit {
    pub fn new(margin: f32) -> Self {
        Self { state: FitState::Idle, margin }
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn model(&self) -> Option<ModelId> {
        match self.state {
            FitState::Idle => None,
            FitState::Loading(model)
            | FitState::Centered { model, .. }
            | FitState::Framed { model, .. } => Some(model),
        }
    }

    /// Start showing `model`. Re-showing the current identity is a no-op.
    pub fn show(&mut self, model: ModelId) -> bool {
        if self.model() == Some(model) {
            return false;
        }
        self.state = FitState::Loading(model);
        true
    }

    pub fn clear(&mut self) {
        self.state = FitState::Idle;
    }

    /// Center freshly decoded geometry if it belongs to the model being loaded.
    pub fn on_mesh_decoded(&mut self, geometry: &mut ModelGeometry) -> bool {
        let FitState::Loading(model) = self.state else {
            return false;
        };
        if model != geometry.model() {
            log::debug!("ignoring geometry of {} while loading {model}", geometry.model());
            return false;
        }
        if geometry.center().is_none() {
            log::warn!("model {model} has no geometry to center");
            return false;
        }
        let Some(bounds) = geometry.bounds() else {
            return false;
        };
        self.state = FitState::Centered { model, bounds };
        true
    }

    /// Frame the centered geometry. Does nothing once framed.
    pub fn frame(&mut self, geometry: &ModelGeometry, camera: &mut OrbitCamera, aspect: f32) -> bool {
        let FitState::Centered { model, .. } = self.state else {
            return false;
        };
        if model != geometry.model() {
            return false;
        }
        let Some(bounds) = geometry.bounds() else {
            return false;
        };
        camera.fit(&bounds, self.margin, aspect);
        log::info!(
            "framed model {model}: radius {:.2}, camera distance {:.2}",
            bounds.radius(),
            camera.distance
        );
        self.state = FitState::Framed { model, bounds };
        true
    }
}
