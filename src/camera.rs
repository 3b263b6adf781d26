// Orbit camera
//
// Sits on a sphere around the origin and always looks at it. Angles are kept
// in degrees, the same representation callers pass in.

use glam::{Mat4, Vec3};

/// Elevation limit in degrees; keeps the camera away from the poles
pub const MAX_ELEVATION: f32 = 80.0;

/// Smallest radius allowed, so the eye never sits on the focus point
pub const MIN_RADIUS: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct OrbitCamera {
    radius: f32,
    azimuth: f32,
    elevation: f32,
    view: Mat4,
}

impl OrbitCamera {
    pub fn new(radius: f32, azimuth: f32, elevation: f32) -> Self {
        let mut camera = Self {
            radius,
            azimuth,
            elevation,
            view: Mat4::IDENTITY,
        };
        camera.set_position(radius, azimuth, elevation);
        camera
    }

    /// Place the camera. Angles are in degrees; elevation is clamped to
    /// [-80, 80].
    pub fn set_position(&mut self, radius: f32, azimuth: f32, elevation: f32) {
        self.radius = radius.max(MIN_RADIUS);
        self.azimuth = azimuth;
        self.elevation = elevation.clamp(-MAX_ELEVATION, MAX_ELEVATION);

        self.view = Mat4::look_at_lh(self.eye(), Vec3::ZERO, Vec3::Y);
    }

    /// Current (radius, azimuth, elevation), angles in degrees
    pub fn position(&self) -> (f32, f32, f32) {
        (self.radius, self.azimuth, self.elevation)
    }

    /// Eye position in world space
    pub fn eye(&self) -> Vec3 {
        let alpha = self.azimuth.to_radians();
        let beta = self.elevation.to_radians();

        Vec3::new(
            self.radius * beta.cos() * alpha.cos(),
            self.radius * beta.sin(),
            self.radius * beta.cos() * alpha.sin(),
        )
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    /// Move along the sphere by the given angles in degrees
    pub fn orbit(&mut self, d_azimuth: f32, d_elevation: f32) {
        let azimuth = (self.azimuth + d_azimuth) % 360.0;
        self.set_position(self.radius, azimuth, self.elevation + d_elevation);
    }

    pub fn zoom(&mut self, d_radius: f32) {
        self.set_position(self.radius + d_radius, self.azimuth, self.elevation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!(a.abs_diff_eq(b, EPS), "{a:?} != {b:?}");
    }

    #[test]
    fn elevation_is_clamped() {
        let mut camera = OrbitCamera::new(10.0, 0.0, 95.0);
        assert_eq!(camera.position().2, 80.0);

        camera.set_position(10.0, 0.0, -120.0);
        assert_eq!(camera.position().2, -80.0);

        camera.set_position(10.0, 0.0, 80.0);
        assert_eq!(camera.position().2, 80.0);

        camera.set_position(10.0, 0.0, -45.0);
        assert_eq!(camera.position().2, -45.0);
    }

    #[test]
    fn orbiting_past_the_pole_stops_at_the_limit() {
        let mut camera = OrbitCamera::new(10.0, 0.0, 75.0);
        camera.orbit(0.0, 10.0);
        assert_eq!(camera.position().2, 80.0);
        assert!(camera.eye().y > 0.0);
    }

    #[test]
    fn position_round_trips() {
        let camera = OrbitCamera::new(15.0, -270.0, 30.0);
        assert_eq!(camera.position(), (15.0, -270.0, 30.0));
    }

    #[test]
    fn eye_on_the_axes() {
        assert_vec_eq(OrbitCamera::new(10.0, 0.0, 0.0).eye(), Vec3::new(10.0, 0.0, 0.0));
        assert_vec_eq(OrbitCamera::new(10.0, 90.0, 0.0).eye(), Vec3::new(0.0, 0.0, 10.0));
        assert_vec_eq(OrbitCamera::new(10.0, 180.0, 0.0).eye(), Vec3::new(-10.0, 0.0, 0.0));
        assert_vec_eq(OrbitCamera::new(10.0, -90.0, 0.0).eye(), Vec3::new(0.0, 0.0, -10.0));
    }

    #[test]
    fn eye_quadrants() {
        // Second quadrant seen from above
        let eye = OrbitCamera::new(10.0, 135.0, 45.0).eye();
        assert!(eye.x < 0.0 && eye.y > 0.0 && eye.z > 0.0, "{eye:?}");

        // Fourth quadrant seen from below
        let eye = OrbitCamera::new(10.0, -45.0, -30.0).eye();
        assert!(eye.x > 0.0 && eye.y < 0.0 && eye.z < 0.0, "{eye:?}");

        // Start-up position: -270 degrees is the same direction as +90
        let eye = OrbitCamera::new(15.0, -270.0, 30.0).eye();
        assert_vec_eq(eye, Vec3::new(0.0, 7.5, 15.0 * 30f32.to_radians().cos()));
    }

    #[test]
    fn eye_stays_on_the_sphere() {
        for (az, el) in [(12.0, 34.0), (-200.0, 79.0), (359.0, -80.0)] {
            let eye = OrbitCamera::new(7.5, az, el).eye();
            assert!((eye.length() - 7.5).abs() < EPS);
        }
    }

    #[test]
    fn view_looks_at_the_origin() {
        let camera = OrbitCamera::new(15.0, 30.0, 20.0);
        let view = camera.view_matrix();

        // Left-handed: the focus point ends up straight ahead on +Z
        assert_vec_eq(view.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, 15.0));
        assert_vec_eq(view.transform_point3(camera.eye()), Vec3::ZERO);
    }

    #[test]
    fn view_keeps_world_up_on_screen_up() {
        let view = OrbitCamera::new(10.0, 0.0, 0.0).view_matrix();
        let up = view.transform_vector3(Vec3::Y);
        assert_vec_eq(up, Vec3::Y);
    }

    #[test]
    fn radius_never_collapses() {
        let mut camera = OrbitCamera::new(1.0, 0.0, 0.0);
        camera.zoom(-5.0);
        assert_eq!(camera.position().0, MIN_RADIUS);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn azimuth_wraps_while_orbiting() {
        let mut camera = OrbitCamera::new(10.0, 350.0, 0.0);
        camera.orbit(20.0, 0.0);
        assert!((camera.position().1 - 10.0).abs() < EPS);
    }

    #[test]
    fn reset_after_moving_restores_the_start() {
        let mut camera = OrbitCamera::new(5.0, 30.0, 20.0);
        let start_eye = camera.eye();

        camera.orbit(250.0, -45.0);
        camera.zoom(-4.5);
        camera.set_position(5.0, 30.0, 20.0);

        assert_eq!(camera.position(), (5.0, 30.0, 20.0));
        assert_vec_eq(camera.eye(), start_eye);
    }
}
