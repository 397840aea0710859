//! Vertex/index buffers and the per-frame transform for the demo quad.

use crate::context::GpuContext;
use crate::error::Result;
use crate::memory::HostBuffer;
use crate::pipeline::Vertex;
use ash::vk;
use glam::{Mat4, Vec3};

/// Unit quad centered on the origin, one color per corner.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0]),
];

/// Two counter-clockwise triangles.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Degrees per second the quad turns about +Z.
pub const QUAD_SPIN_DEGREES_PER_SECOND: f32 = 90.0;

/// Model-view-projection for the quad at `elapsed_seconds`.
///
/// The camera sits at (2, 2, 2) looking at the origin with +Z up. The
/// projection flips Y for Vulkan clip space.
pub fn quad_transform(elapsed_seconds: f32, aspect: f32) -> Mat4 {
    let model = Mat4::from_rotation_z((elapsed_seconds * QUAD_SPIN_DEGREES_PER_SECOND).to_radians());
    let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);
    let mut projection = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);
    projection.y_axis.y *= -1.0;

    projection * view * model
}

/// Host-visible vertex and index buffers, uploaded once.
pub struct MeshBuffers {
    vertices: HostBuffer,
    indices: HostBuffer,
    index_count: u32,
}

impl MeshBuffers {
    /// Allocate and fill both buffers.
    pub fn new(gpu: &GpuContext, vertices: &[Vertex], indices: &[u16]) -> Result<Self> {
        let mut allocator = gpu.allocator().lock();

        let mut vertex_buffer =
            allocator.upload(vertices, vk::BufferUsageFlags::VERTEX_BUFFER, "mesh vertices")?;
        let index_buffer =
            match allocator.upload(indices, vk::BufferUsageFlags::INDEX_BUFFER, "mesh indices") {
                Ok(buffer) => buffer,
                Err(e) => {
                    allocator.free(&mut vertex_buffer)?;
                    return Err(e);
                }
            };

        tracing::debug!(
            vertices = vertices.len(),
            indices = indices.len(),
            "Mesh buffers uploaded"
        );

        Ok(Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: indices.len() as u32,
        })
    }

    /// The demo quad.
    pub fn quad(gpu: &GpuContext) -> Result<Self> {
        Self::new(gpu, &QUAD_VERTICES, &QUAD_INDICES)
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.indices.handle()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Free both buffers.
    ///
    /// # Safety
    /// No in-flight work may reference the buffers.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let mut allocator = gpu.allocator().lock();
        allocator.free(&mut self.indices)?;
        allocator.free(&mut self.vertices)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Vec4;

    fn to_ndc(transform: Mat4, point: Vec3) -> Vec3 {
        let clip = transform * point.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn origin_projects_to_screen_center() {
        for t in [0.0, 0.37, 2.5] {
            let ndc = to_ndc(quad_transform(t, 16.0 / 9.0), Vec3::ZERO);
            assert_abs_diff_eq!(ndc.x, 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(ndc.y, 0.0, epsilon = 1e-5);
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn spins_a_quarter_turn_per_second() {
        let start = quad_transform(0.0, 1.0);
        let later = quad_transform(1.0, 1.0);

        // +X rotated by 90 degrees lands on +Y.
        let rotated = later * Vec4::new(0.5, 0.0, 0.0, 1.0);
        let expected = start * Vec4::new(0.0, 0.5, 0.0, 1.0);
        for i in 0..4 {
            assert_abs_diff_eq!(rotated[i], expected[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn full_turn_every_four_seconds() {
        let a = quad_transform(0.5, 1.5).to_cols_array();
        let b = quad_transform(4.5, 1.5).to_cols_array();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-4);
        }
    }

    #[test]
    fn up_is_negative_y_in_clip_space() {
        let ndc = to_ndc(quad_transform(0.0, 1.0), Vec3::new(0.0, 0.0, 0.5));
        assert!(ndc.y < 0.0, "ndc.y = {}", ndc.y);
    }

    #[test]
    fn quad_indices_reference_every_vertex() {
        for i in 0..QUAD_VERTICES.len() as u16 {
            assert!(QUAD_INDICES.contains(&i));
        }
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }
}
