//! Procedural meshes and their GPU buffers

use std::collections::HashMap;
use std::f32::consts::PI;

use glam::Vec3;
use lumen_ecs::components::MeshSource;
use tracing::{debug, info};

use crate::arena::{Handle, ResourceArena};
use crate::error::RenderError;
use crate::gpu::{BufferId, BufferUsage, GpuBackend};
use crate::vertex::{MeshVertex, SkyVertex};

/// Generated mesh data
#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Mesh for one of the built-in sources, at unit size
    pub fn from_source(source: MeshSource) -> Self {
        match source {
            MeshSource::Cube => Self::cube(1.0),
            MeshSource::Plane => Self::plane(1.0, 1),
            MeshSource::Sphere => Self::sphere(0.5, 24, 16),
            MeshSource::Capsule => Self::capsule(2.0, 0.5, 16, 16),
        }
    }

    /// Axis-aligned cube with flat normals (4 vertices per face)
    pub fn cube(size: f32) -> Self {
        let h = size / 2.0;
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Y, Vec3::Z),
            (Vec3::Y, Vec3::NEG_Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::Z, Vec3::X),
            (Vec3::Z, Vec3::Y, Vec3::X),
            (Vec3::NEG_Z, Vec3::Y, Vec3::NEG_X),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, up, right) in faces {
            let base = vertices.len() as u32;
            let center = normal * h;
            for (u, v) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = center + right * (u * h) + up * (v * h);
                vertices.push(MeshVertex::new(p.to_array(), normal.to_array()));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self { vertices, indices }
    }

    /// Generate a flat plane mesh on the XZ plane
    pub fn plane(size: f32, subdivisions: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        let subdivisions = subdivisions.max(1);
        let half_size = size / 2.0;
        let step = size / subdivisions as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                let px = -half_size + x as f32 * step;
                let pz = -half_size + z as f32 * step;

                vertices.push(MeshVertex::new([px, 0.0, pz], [0.0, 1.0, 0.0]));
            }
        }

        grid_indices(&mut indices, subdivisions, subdivisions);

        Self { vertices, indices }
    }

    /// Generate a UV sphere mesh
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = PI * ring as f32 / rings as f32;
            let y = radius * phi.cos();
            let ring_radius = radius * phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                let normal = Vec3::new(x, y, z).normalize_or_zero();
                vertices.push(MeshVertex::new([x, y, z], normal.to_array()));
            }
        }

        grid_indices(&mut indices, rings, segments);

        Self { vertices, indices }
    }

    /// Generate a capsule mesh (cylindrical body with hemispherical caps)
    pub fn capsule(height: f32, radius: f32, segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        let half_rings = (rings / 2).max(1);
        let half_height = (height - 2.0 * radius).max(0.0) / 2.0;

        let mut push_ring = |y: f32, ring_radius: f32, normal_y: f32| {
            for seg in 0..=segments {
                let theta = 2.0 * PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();
                let normal = Vec3::new(x, normal_y, z).normalize_or_zero();
                vertices.push(MeshVertex::new([x, y, z], normal.to_array()));
            }
        };

        // Top hemisphere
        for ring in 0..=half_rings {
            let phi = PI * 0.5 * (1.0 - ring as f32 / half_rings as f32);
            push_ring(
                phi.sin() * radius + half_height,
                phi.cos() * radius,
                phi.sin() * radius,
            );
        }

        // Cylinder body
        push_ring(half_height, radius, 0.0);
        push_ring(-half_height, radius, 0.0);

        // Bottom hemisphere
        for ring in 0..=half_rings {
            let phi = -PI * 0.5 * ring as f32 / half_rings as f32;
            push_ring(
                phi.sin() * radius - half_height,
                phi.cos() * radius,
                phi.sin() * radius,
            );
        }

        let total_rings = (half_rings + 1) * 2 + 2 - 1;
        grid_indices(&mut indices, total_rings, segments);

        Self { vertices, indices }
    }
}

/// Two triangles per quad of a `rows x columns` grid of `(columns + 1)`-wide
/// vertex rows.
fn grid_indices(indices: &mut Vec<u32>, rows: u32, columns: u32) {
    for row in 0..rows {
        for col in 0..columns {
            let current = row * (columns + 1) + col;
            let next = current + columns + 1;

            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }
}

/// Sky dome mesh (inverted sphere for rendering from inside)
#[derive(Clone, Debug)]
pub struct SkyMesh {
    pub vertices: Vec<SkyVertex>,
    pub indices: Vec<u32>,
}

impl SkyMesh {
    /// Generate an inverted unit sphere; the sky shader keeps it centered on
    /// the camera
    pub fn dome(segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * PI * seg as f32 / segments as f32;
                vertices.push(SkyVertex::new([
                    ring_radius * theta.cos(),
                    y,
                    ring_radius * theta.sin(),
                ]));
            }
        }

        // Reversed winding for inside-out rendering
        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.extend_from_slice(&[current, current + 1, next]);
                indices.extend_from_slice(&[current + 1, next + 1, next]);
            }
        }

        Self { vertices, indices }
    }
}

/// Vertex and index buffers of one uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
}

impl GpuMesh {
    fn upload(
        backend: &mut dyn GpuBackend,
        vertices: &[u8],
        indices: &[u32],
    ) -> Result<Self, RenderError> {
        let vertex_buffer = backend.create_buffer(BufferUsage::Vertex, vertices)?;
        let index_buffer =
            match backend.create_buffer(BufferUsage::Index, bytemuck::cast_slice(indices)) {
                Ok(buffer) => buffer,
                Err(e) => {
                    backend.destroy_buffer(vertex_buffer);
                    return Err(e);
                }
            };
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }
}

/// Owns one GPU buffer pair per [`MeshSource`] plus the sky dome.
///
/// Meshes are uploaded on first request and live until
/// [`destroy`](Self::destroy), which frees every buffer exactly once.
#[derive(Default)]
pub struct MeshLibrary {
    meshes: ResourceArena<GpuMesh>,
    by_source: HashMap<MeshSource, Handle<GpuMesh>>,
    sky: Option<Handle<GpuMesh>>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload the mesh for `source` if it is not resident yet.
    pub fn ensure(
        &mut self,
        backend: &mut dyn GpuBackend,
        source: MeshSource,
    ) -> Result<GpuMesh, RenderError> {
        if let Some(mesh) = self.get(source) {
            return Ok(mesh);
        }
        let data = Mesh::from_source(source);
        let mesh = GpuMesh::upload(backend, bytemuck::cast_slice(&data.vertices), &data.indices)?;
        debug!(
            "uploaded {} mesh ({} vertices, {} indices)",
            source.name(),
            data.vertices.len(),
            data.indices.len()
        );
        self.by_source.insert(source, self.meshes.insert(mesh));
        Ok(mesh)
    }

    /// Upload every built-in mesh and the sky dome.
    pub fn upload_all(&mut self, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        for source in MeshSource::ALL {
            self.ensure(backend, source)?;
        }
        self.ensure_sky(backend)?;
        info!("mesh library resident ({} meshes)", self.meshes.len());
        Ok(())
    }

    pub fn ensure_sky(&mut self, backend: &mut dyn GpuBackend) -> Result<GpuMesh, RenderError> {
        if let Some(mesh) = self.sky() {
            return Ok(mesh);
        }
        let dome = SkyMesh::dome(32, 16);
        let mesh = GpuMesh::upload(backend, bytemuck::cast_slice(&dome.vertices), &dome.indices)?;
        self.sky = Some(self.meshes.insert(mesh));
        Ok(mesh)
    }

    pub fn get(&self, source: MeshSource) -> Option<GpuMesh> {
        self.by_source
            .get(&source)
            .and_then(|handle| self.meshes.get(*handle))
            .copied()
    }

    pub fn sky(&self) -> Option<GpuMesh> {
        self.sky.and_then(|handle| self.meshes.get(handle)).copied()
    }

    /// Number of resident meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Free every buffer. Safe to call more than once.
    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        self.by_source.clear();
        self.sky = None;
        for mesh in self.meshes.drain() {
            backend.destroy_buffer(mesh.vertex_buffer);
            backend.destroy_buffer(mesh.index_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{BackendEvent, HeadlessBackend};

    fn assert_indices_in_range(vertex_count: usize, indices: &[u32]) {
        assert!(!indices.is_empty());
        assert_eq!(indices.len() % 3, 0);
        assert!(indices.iter().all(|&i| (i as usize) < vertex_count));
    }

    #[test]
    fn built_in_meshes_are_well_formed() {
        for source in MeshSource::ALL {
            let mesh = Mesh::from_source(source);
            assert_indices_in_range(mesh.vertices.len(), &mesh.indices);
        }
        let dome = SkyMesh::dome(8, 4);
        assert_indices_in_range(dome.vertices.len(), &dome.indices);
    }

    #[test]
    fn cube_normals_point_outwards() {
        let cube = Mesh::cube(2.0);
        assert_eq!(cube.vertices.len(), 24);
        for v in &cube.vertices {
            let p = Vec3::from(v.position);
            let n = Vec3::from(v.normal);
            assert!((p.dot(n) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn capsule_spans_its_height() {
        let capsule = Mesh::capsule(2.0, 0.5, 8, 8);
        let (min, max) = capsule
            .vertices
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| {
                (lo.min(v.position[1]), hi.max(v.position[1]))
            });
        assert!((min + 1.0).abs() < 1e-5);
        assert!((max - 1.0).abs() < 1e-5);
    }

    #[test]
    fn library_uploads_once_and_frees_each_buffer_once() {
        let mut backend = HeadlessBackend::new();
        let log = backend.log();
        let mut library = MeshLibrary::new();

        let first = library.ensure(&mut backend, MeshSource::Cube).unwrap();
        let again = library.ensure(&mut backend, MeshSource::Cube).unwrap();
        assert_eq!(first, again);
        library.upload_all(&mut backend).unwrap();
        assert_eq!(library.len(), MeshSource::ALL.len() + 1);

        library.destroy(&mut backend);
        library.destroy(&mut backend);
        assert!(library.is_empty());
        assert!(library.get(MeshSource::Cube).is_none());

        let events = log.lock();
        let created = events
            .iter()
            .filter(|e| matches!(e, BackendEvent::CreateBuffer { .. }))
            .count();
        let destroyed = events
            .iter()
            .filter(|e| matches!(e, BackendEvent::DestroyBuffer(_)))
            .count();
        assert_eq!(created, 2 * library_mesh_count());
        assert_eq!(destroyed, created);
        assert_eq!(backend.live_buffers(), 0);
    }

    fn library_mesh_count() -> usize {
        MeshSource::ALL.len() + 1
    }
}
