//! Cameras.
//!
//! All camera variants implement [`ViewCamera`]; they share no state beyond
//! that interface and the small [`Camera`] pose type.
//!
//! - [`StaticCamera`] frames the scene bounds and stays put
//! - [`OrbitCamera`] circles the centre of the scene bounds
//! - [`FirstPersonCamera`] is steered by yaw/pitch input and a movement vector
//!
//! A camera attached to a [`SceneBoundsBroadcaster`](crate::bounds::SceneBoundsBroadcaster)
//! through [`attach_camera`](crate::bounds::attach_camera) keeps the returned
//! subscription and must be disposed before it is dropped.

use std::f32::consts::FRAC_PI_2;

use cgmath::{InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, perspective};
use instant::Duration;

use crate::{
    bounds::{BoundsSubscriber, BoundsSubscription},
    data_structures::aabb::Aabb,
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

pub trait ViewCamera: BoundsSubscriber {
    fn view_matrix(&self) -> Matrix4<f32>;

    fn position(&self) -> Point3<f32>;

    fn update(&mut self, dt: Duration);

    /// Keeps the subscription so `dispose` can cancel it.
    fn attach(&mut self, subscription: BoundsSubscription);

    /// Cancels the bounds subscription, if any.
    fn dispose(&mut self);
}

/// Position plus yaw/pitch orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        let mut camera = Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
        };
        camera.clamp_pitch();
        camera
    }

    pub fn forward(&self) -> Vector3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }

    /// Turns the camera towards `target`.
    pub fn look_at(&mut self, target: Point3<f32>) {
        let dir = target - self.position;
        self.yaw = Rad(dir.z.atan2(dir.x));
        self.pitch = Rad(dir.y.atan2((dir.x * dir.x + dir.z * dir.z).sqrt()));
        self.clamp_pitch();
    }

    /// Places the camera on the far corner of `bounds` looking at the near
    /// one. Depends on nothing but the box.
    pub fn fit_to(&mut self, bounds: &Aabb) {
        self.position = bounds.max;
        self.look_at(bounds.min);
    }

    fn clamp_pitch(&mut self) {
        self.pitch = Rad(self.pitch.0.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2));
    }
}

pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Camera data as laid out in a uniform buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_position: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &dyn ViewCamera, projection: &Projection) {
        self.view_position = camera.position().to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.view_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames the scene bounds and otherwise never moves.
pub struct StaticCamera {
    pub camera: Camera,
    subscription: Option<BoundsSubscription>,
}

impl StaticCamera {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            subscription: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }
}

impl BoundsSubscriber for StaticCamera {
    fn on_bounds_changed(&mut self, bounds: Option<&Aabb>) {
        if let Some(bounds) = bounds {
            self.camera.fit_to(bounds);
        }
    }
}

impl ViewCamera for StaticCamera {
    fn view_matrix(&self) -> Matrix4<f32> {
        self.camera.calc_matrix()
    }

    fn position(&self) -> Point3<f32> {
        self.camera.position
    }

    fn update(&mut self, _: Duration) {}

    fn attach(&mut self, subscription: BoundsSubscription) {
        if let Some(previous) = self.subscription.replace(subscription) {
            previous.cancel();
        }
    }

    fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

/// Circles `target` at `radius`, advancing `speed` radians per second.
pub struct OrbitCamera {
    pub target: Point3<f32>,
    pub radius: f32,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
    pub speed: f32,
    subscription: Option<BoundsSubscription>,
}

impl OrbitCamera {
    pub fn new(target: Point3<f32>, radius: f32, speed: f32) -> Self {
        Self {
            target,
            radius,
            yaw: Rad(0.0),
            pitch: Rad(0.3),
            speed,
            subscription: None,
        }
    }

    fn pose(&self) -> Camera {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        let offset = Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw) * self.radius;
        let mut camera = Camera::new(self.target + offset, Rad(0.0), Rad(0.0));
        camera.look_at(self.target);
        camera
    }
}

impl BoundsSubscriber for OrbitCamera {
    /// Re-centres on the box and backs off to its diagonal; the orbit angle
    /// is kept.
    fn on_bounds_changed(&mut self, bounds: Option<&Aabb>) {
        if let Some(bounds) = bounds {
            self.target = bounds.center();
            self.radius = bounds.diagonal().max(f32::EPSILON);
        }
    }
}

impl ViewCamera for OrbitCamera {
    fn view_matrix(&self) -> Matrix4<f32> {
        self.pose().calc_matrix()
    }

    fn position(&self) -> Point3<f32> {
        self.pose().position
    }

    fn update(&mut self, dt: Duration) {
        self.yaw += Rad(self.speed * dt.as_secs_f32());
    }

    fn attach(&mut self, subscription: BoundsSubscription) {
        if let Some(previous) = self.subscription.replace(subscription) {
            previous.cancel();
        }
    }

    fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

/// Free-flying camera. Input code sets `movement` (right, up, forward in
/// camera space, each in `[-1, 1]`) and calls [`rotate`](Self::rotate).
pub struct FirstPersonCamera {
    pub camera: Camera,
    pub movement: Vector3<f32>,
    pub speed: f32,
    pub sensitivity: f32,
    subscription: Option<BoundsSubscription>,
}

impl FirstPersonCamera {
    pub fn new(camera: Camera, speed: f32, sensitivity: f32) -> Self {
        Self {
            camera,
            movement: Vector3::new(0.0, 0.0, 0.0),
            speed,
            sensitivity,
            subscription: None,
        }
    }

    pub fn rotate(&mut self, dx: f64, dy: f64) {
        self.camera.yaw += Rad(dx as f32 * self.sensitivity);
        self.camera.pitch -= Rad(dy as f32 * self.sensitivity);
        self.camera.clamp_pitch();
    }
}

impl BoundsSubscriber for FirstPersonCamera {
    fn on_bounds_changed(&mut self, bounds: Option<&Aabb>) {
        if let Some(bounds) = bounds {
            self.camera.fit_to(bounds);
        }
    }
}

impl ViewCamera for FirstPersonCamera {
    fn view_matrix(&self) -> Matrix4<f32> {
        self.camera.calc_matrix()
    }

    fn position(&self) -> Point3<f32> {
        self.camera.position
    }

    fn update(&mut self, dt: Duration) {
        let dt = dt.as_secs_f32();
        let forward = self.camera.forward();
        let right = forward.cross(Vector3::unit_y());
        let right = if right.magnitude2() > 0.0 {
            right.normalize()
        } else {
            Vector3::unit_x()
        };
        let step = right * self.movement.x + Vector3::unit_y() * self.movement.y
            + forward * self.movement.z;
        self.camera.position += step * self.speed * dt;
    }

    fn attach(&mut self, subscription: BoundsSubscription) {
        if let Some(previous) = self.subscription.replace(subscription) {
            previous.cancel();
        }
    }

    fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}
