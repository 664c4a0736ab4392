use ash::vk;
use glam::{Mat4, Vec3};

/// Fixed orbit-style camera looking at a pivot, with +Z as the world up axis
pub struct Camera {
    position: Vec3,
    pivot: Vec3,
    world_up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 45.0;

    pub fn new() -> Self {
        Self {
            position: Vec3::splat(2.0),
            pivot: Vec3::ZERO,
            world_up: Vec3::Z,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 10.0,
        }
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.pivot, self.world_up)
    }

    /// Vulkan clip space has Y pointing down, so the projection flips it
    pub fn get_proj_mat(&self, extent: vk::Extent2D) -> Mat4 {
        let aspect_ratio = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 480, height: 480 };

    #[test]
    fn test_view_moves_eye_to_origin() {
        let camera = Camera::new();
        let eye = camera.get_view_mat().transform_point3(camera.position);
        assert!(eye.length() < 1e-5);
    }

    #[test]
    fn test_pivot_lies_on_negative_view_z() {
        let camera = Camera::new();
        let pivot = camera.get_view_mat().transform_point3(camera.pivot);
        assert!(pivot.x.abs() < 1e-5);
        assert!(pivot.y.abs() < 1e-5);
        assert!(pivot.z < 0.0);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::new();
        let unflipped = Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 10.0);
        let proj = camera.get_proj_mat(EXTENT);
        assert_eq!(proj.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(proj.x_axis.x, unflipped.x_axis.x);
    }

    #[test]
    fn test_projection_maps_near_and_far_to_unit_depth() {
        let camera = Camera::new();
        let proj = camera.get_proj_mat(EXTENT);
        let near = proj * Vec4::new(0.0, 0.0, -camera.near, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -camera.far, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_aspect_follows_extent() {
        let camera = Camera::new();
        let wide = camera.get_proj_mat(vk::Extent2D { width: 960, height: 480 });
        let square = camera.get_proj_mat(EXTENT);
        assert!((square.x_axis.x / wide.x_axis.x - 2.0).abs() < 1e-5);
    }
}
