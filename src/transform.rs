// World / view / projection matrices
//
// Composition follows the row-vector convention: a point goes through world,
// then view, then projection. With glam's column vectors that is P * V * W.

use glam::Mat4;

use crate::config::CameraConfig;

#[derive(Debug, Clone, Copy)]
pub struct Projection {
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn from_config(camera: &CameraConfig) -> Self {
        Self {
            fov_y: camera.fov_degrees.to_radians(),
            near: camera.near,
            far: camera.far,
        }
    }

    /// Left-handed perspective with depth in [0, 1]
    pub fn matrix(&self, width: f32, height: f32) -> Mat4 {
        let aspect = width.max(1.0) / height.max(1.0);
        Mat4::perspective_lh(self.fov_y, aspect, self.near, self.far)
    }
}

#[derive(Debug, Clone)]
pub struct Transforms {
    pub world: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Transforms {
    /// Uniform world scale, camera view and a projection for the given
    /// surface size
    pub fn new(scale: f32, view: Mat4, projection: &Projection, width: f32, height: f32) -> Self {
        Self {
            world: Mat4::from_scale(glam::Vec3::splat(scale)),
            view,
            projection: projection.matrix(width, height),
        }
    }

    /// world x view x projection
    pub fn world_view_projection(&self) -> Mat4 {
        self.projection * self.view * self.world
    }
}
