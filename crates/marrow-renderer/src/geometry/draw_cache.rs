//! Batched surface geometry cache.
//!
//! Surface routines queue triangle fans here instead of issuing a draw
//! call each; the cache converts fans to triangle lists, groups draws
//! that share a texture, and flushes in one buffer upload. Callers must
//! flush before any layer transition that depends on prior draws being
//! visible (entering the glow layer, sprites over walls).

use std::collections::HashMap;

use rayon::prelude::*;

use marrow_common::shapes::BlendType;

use crate::gpu::{self, Release};
use crate::shader::{ShaderKind, SurfaceUniforms};
use crate::texture::{GpuTextureRef, TextureHandle};

use super::SurfaceVertex;

/// Above this many queued draws, batch grouping goes data-parallel.
const BATCH_PARALLEL_THRESHOLD: usize = 256;

/// Most dynamic lights the glow pass will carry into the shaders.
pub const MAX_DYNAMIC_LIGHTS: usize = 32;

/// One queued surface draw: a triangle-list range plus everything the
/// flush needs to replay it.
#[derive(Clone, PartialEq)]
pub struct SurfaceDraw {
    pub shader: ShaderKind,
    pub blend: Option<BlendType>,
    pub texture: TextureHandle,
    /// GPU-side binding for `texture`, when the assets live on a device.
    pub texture_gpu: Option<GpuTextureRef>,
    pub uniforms: SurfaceUniforms,
    pub first_vertex: u32,
    pub vertex_count: u32,
}

/// Draws sharing one texture, replayed together.
pub struct SurfaceBatch {
    pub texture: TextureHandle,
    pub draws: Vec<SurfaceDraw>,
}

/// A light gathered during the glow pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub surfaces: usize,
    pub vertices: usize,
    pub batches: usize,
    pub flushes: usize,
}

pub struct DrawCache {
    vertices: Vec<SurfaceVertex>,
    commands: Vec<SurfaceDraw>,
    lights: Vec<DynamicLight>,
    gathering_lights: bool,
    stats: CacheStats,
    gpu_buffer: Option<(ash::vk::Buffer, ash::vk::DeviceMemory)>,
}

impl Default for DrawCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawCache {
    pub fn new() -> Self {
        Self {
            vertices: Vec::with_capacity(4096),
            commands: Vec::with_capacity(256),
            lights: Vec::new(),
            gathering_lights: false,
            stats: CacheStats::default(),
            gpu_buffer: None,
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn pending_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn pending_draws(&self) -> usize {
        self.commands.len()
    }

    /// Queue a triangle fan. `positions` and `tex_coords` run in fan
    /// order; the cache re-winds them into a triangle list so batches
    /// can concatenate.
    pub fn queue_surface(
        &mut self,
        shader: ShaderKind,
        blend: Option<BlendType>,
        texture: TextureHandle,
        texture_gpu: Option<GpuTextureRef>,
        uniforms: SurfaceUniforms,
        positions: &[[f32; 3]],
        tex_coords: &[[f32; 2]],
        normal: [f32; 3],
    ) {
        let n = positions.len().min(tex_coords.len());
        if n < 3 {
            return;
        }

        let first_vertex = self.vertices.len() as u32;
        for i in 1..n - 1 {
            self.vertices
                .push(SurfaceVertex::new(positions[0], tex_coords[0], normal));
            self.vertices
                .push(SurfaceVertex::new(positions[i], tex_coords[i], normal));
            self.vertices
                .push(SurfaceVertex::new(positions[i + 1], tex_coords[i + 1], normal));
        }
        let vertex_count = self.vertices.len() as u32 - first_vertex;

        // Extend the previous draw when nothing about its state changed.
        if let Some(last) = self.commands.last_mut() {
            if last.shader == shader
                && last.blend == blend
                && last.texture == texture
                && last.uniforms == uniforms
                && last.first_vertex + last.vertex_count == first_vertex
            {
                last.vertex_count += vertex_count;
                self.stats.surfaces += 1;
                return;
            }
        }

        self.commands.push(SurfaceDraw {
            shader,
            blend,
            texture,
            texture_gpu,
            uniforms,
            first_vertex,
            vertex_count,
        });
        self.stats.surfaces += 1;
    }

    /// Queue pre-indexed triangles (skinned models). Positions,
    /// texcoords, and normals are parallel arrays; indices select
    /// triangles from them.
    #[allow(clippy::too_many_arguments)]
    pub fn queue_indexed(
        &mut self,
        shader: ShaderKind,
        blend: Option<BlendType>,
        texture: TextureHandle,
        texture_gpu: Option<GpuTextureRef>,
        uniforms: SurfaceUniforms,
        positions: &[[f32; 3]],
        tex_coords: &[[f32; 2]],
        normals: &[[f32; 3]],
        indices: &[u16],
    ) {
        if positions.is_empty() || indices.len() < 3 {
            return;
        }

        let first_vertex = self.vertices.len() as u32;
        for triangle in indices.chunks_exact(3) {
            // A triangle with any index out of range is dropped whole.
            if triangle.iter().any(|&i| i as usize >= positions.len()) {
                continue;
            }
            for &index in triangle {
                let i = index as usize;
                let tc = tex_coords.get(i).copied().unwrap_or([0.0, 0.0]);
                let n = normals.get(i).copied().unwrap_or([0.0, 0.0, 1.0]);
                self.vertices.push(SurfaceVertex::new(positions[i], tc, n));
            }
        }
        let vertex_count = self.vertices.len() as u32 - first_vertex;
        if vertex_count == 0 {
            return;
        }

        self.commands.push(SurfaceDraw {
            shader,
            blend,
            texture,
            texture_gpu,
            uniforms,
            first_vertex,
            vertex_count,
        });
        self.stats.surfaces += 1;
    }

    /// Group queued draws by texture, preserving first-seen order.
    fn build_batches(&mut self) -> Vec<SurfaceBatch> {
        if self.commands.is_empty() {
            return Vec::new();
        }

        let commands = std::mem::take(&mut self.commands);
        let grouped: HashMap<u64, Vec<SurfaceDraw>> = if commands.len() >= BATCH_PARALLEL_THRESHOLD {
            commands
                .into_par_iter()
                .fold(HashMap::new, |mut map: HashMap<u64, Vec<SurfaceDraw>>, cmd| {
                    map.entry(cmd.texture.0).or_default().push(cmd);
                    map
                })
                .reduce(HashMap::new, |mut a, b| {
                    for (k, mut v) in b {
                        a.entry(k).or_default().append(&mut v);
                    }
                    a
                })
        } else {
            let mut map: HashMap<u64, Vec<SurfaceDraw>> = HashMap::new();
            for cmd in commands {
                map.entry(cmd.texture.0).or_default().push(cmd);
            }
            map
        };

        let mut batches: Vec<SurfaceBatch> = grouped
            .into_iter()
            .map(|(id, draws)| SurfaceBatch {
                texture: TextureHandle(id),
                draws,
            })
            .collect();
        // HashMap order is arbitrary; keep replay deterministic.
        batches.sort_by_key(|b| b.draws.first().map(|d| d.first_vertex).unwrap_or(0));
        batches
    }

    /// Upload pending vertices and hand the batches to `replay`, along
    /// with the frame's vertex buffer when a device is present. The
    /// cache is empty afterwards whether or not a GPU is present.
    pub fn draw_all(&mut self, mut replay: impl FnMut(&SurfaceBatch, Option<ash::vk::Buffer>)) {
        if self.vertices.is_empty() {
            self.commands.clear();
            return;
        }

        self.upload_vertices();
        let vertex_buffer = self.vertex_buffer();

        let batches = self.build_batches();
        for batch in &batches {
            replay(batch, vertex_buffer);
        }

        self.stats.vertices += self.vertices.len();
        self.stats.batches += batches.len();
        self.stats.flushes += 1;
        self.vertices.clear();
    }

    fn upload_vertices(&mut self) {
        if let Some((buffer, memory)) = self.gpu_buffer.take() {
            gpu::defer_release(Release::Buffer(buffer));
            gpu::defer_release(Release::Memory(memory));
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        self.gpu_buffer = gpu::with_device(|ctx| {
            // SAFETY: main thread, valid context.
            unsafe { gpu::create_host_buffer(ctx, bytes, ash::vk::BufferUsageFlags::VERTEX_BUFFER) }
        })
        .flatten();
    }

    /// Current frame's vertex buffer, when a device is present.
    pub fn vertex_buffer(&self) -> Option<ash::vk::Buffer> {
        self.gpu_buffer.map(|(b, _)| b)
    }

    // --------------------------------------------------------
    //  Dynamic light gathering (glow pass)
    // --------------------------------------------------------

    pub fn start_gathering_lights(&mut self) {
        self.lights.clear();
        self.gathering_lights = true;
    }

    pub fn add_light(&mut self, position: [f32; 3], radius: f32, color: [f32; 4]) {
        if self.gathering_lights && self.lights.len() < MAX_DYNAMIC_LIGHTS {
            self.lights.push(DynamicLight {
                position,
                radius,
                color,
            });
        }
    }

    pub fn finish_gathering_lights(&mut self) {
        self.gathering_lights = false;
    }

    pub fn lights(&self) -> &[DynamicLight] {
        &self.lights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_positions() -> Vec<[f32; 3]> {
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]
    }

    fn quad_texcoords() -> Vec<[f32; 2]> {
        vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
    }

    fn queue_quad(cache: &mut DrawCache, texture: u64) {
        cache.queue_surface(
            ShaderKind::Wall,
            None,
            TextureHandle(texture),
            None,
            SurfaceUniforms::default(),
            &quad_positions(),
            &quad_texcoords(),
            [0.0, 0.0, 1.0],
        );
    }

    #[test]
    fn test_fan_to_triangle_vertex_count() {
        let mut cache = DrawCache::new();
        queue_quad(&mut cache, 1);
        // 4-vertex fan = 2 triangles = 6 vertices.
        assert_eq!(cache.pending_vertices(), 6);

        let pentagon: Vec<[f32; 3]> = (0..5).map(|i| [i as f32, 0.0, 0.0]).collect();
        let tcs: Vec<[f32; 2]> = (0..5).map(|i| [i as f32, 0.0]).collect();
        cache.queue_surface(
            ShaderKind::Wall,
            None,
            TextureHandle(2),
            None,
            SurfaceUniforms::default(),
            &pentagon,
            &tcs,
            [0.0, 0.0, 1.0],
        );
        // 5-vertex fan adds 3(n-2) = 9 vertices.
        assert_eq!(cache.pending_vertices(), 6 + 9);
    }

    #[test]
    fn test_degenerate_fan_ignored() {
        let mut cache = DrawCache::new();
        cache.queue_surface(
            ShaderKind::Wall,
            None,
            TextureHandle(1),
            None,
            SurfaceUniforms::default(),
            &[[0.0; 3], [1.0, 0.0, 0.0]],
            &[[0.0; 2], [1.0, 0.0]],
            [0.0, 0.0, 1.0],
        );
        assert_eq!(cache.pending_vertices(), 0);
        assert_eq!(cache.pending_draws(), 0);
    }

    #[test]
    fn test_identical_state_merges_into_one_draw() {
        let mut cache = DrawCache::new();
        queue_quad(&mut cache, 1);
        queue_quad(&mut cache, 1);
        assert_eq!(cache.pending_draws(), 1);
        queue_quad(&mut cache, 2);
        assert_eq!(cache.pending_draws(), 2);
    }

    #[test]
    fn test_batches_group_by_texture() {
        let mut cache = DrawCache::new();
        queue_quad(&mut cache, 1);
        queue_quad(&mut cache, 2);
        queue_quad(&mut cache, 1);

        let mut seen = Vec::new();
        cache.draw_all(|batch, _| seen.push((batch.texture.0, batch.draws.len())));
        // Texture 1 queued twice with texture 2 between: 2 batches.
        assert_eq!(seen.len(), 2);
        let tex1 = seen.iter().find(|(t, _)| *t == 1).unwrap();
        assert_eq!(tex1.1, 2);
    }

    #[test]
    fn test_draw_all_clears_and_counts() {
        let mut cache = DrawCache::new();
        queue_quad(&mut cache, 1);
        cache.draw_all(|_, _| {});
        assert_eq!(cache.pending_vertices(), 0);
        assert_eq!(cache.pending_draws(), 0);
        let stats = cache.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.surfaces, 1);
        assert_eq!(stats.vertices, 6);

        // An empty flush is not counted.
        cache.draw_all(|_, _| {});
        assert_eq!(cache.stats().flushes, 1);
    }

    #[test]
    fn test_parallel_grouping_matches_serial() {
        // Enough draws to take the rayon path.
        let mut cache = DrawCache::new();
        for i in 0..(BATCH_PARALLEL_THRESHOLD + 8) {
            queue_quad(&mut cache, (i % 7) as u64);
        }
        let mut total_draws = 0;
        let mut textures = Vec::new();
        cache.draw_all(|batch, _| {
            total_draws += batch.draws.len();
            textures.push(batch.texture.0);
        });
        assert_eq!(textures.len(), 7);
        textures.sort_unstable();
        textures.dedup();
        assert_eq!(textures.len(), 7);
    }

    #[test]
    fn test_queue_indexed_counts_whole_triangles() {
        let mut cache = DrawCache::new();
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]];
        let tex_coords = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let normals = [[0.0, 0.0, 1.0]; 4];
        // Second triangle references a vertex that doesn't exist and
        // must be dropped whole.
        let indices = [0u16, 1, 2, 1, 3, 9];
        cache.queue_indexed(
            ShaderKind::Wall,
            None,
            TextureHandle(4),
            None,
            SurfaceUniforms::default(),
            &positions,
            &tex_coords,
            &normals,
            &indices,
        );
        assert_eq!(cache.pending_vertices(), 3);
        assert_eq!(cache.pending_draws(), 1);
    }

    #[test]
    fn test_light_gathering_caps_and_clears() {
        let mut cache = DrawCache::new();
        // Ignored outside a gathering window.
        cache.add_light([0.0; 3], 100.0, [1.0; 4]);
        assert!(cache.lights().is_empty());

        cache.start_gathering_lights();
        for i in 0..(MAX_DYNAMIC_LIGHTS + 10) {
            cache.add_light([i as f32, 0.0, 0.0], 100.0, [1.0; 4]);
        }
        cache.finish_gathering_lights();
        assert_eq!(cache.lights().len(), MAX_DYNAMIC_LIGHTS);

        cache.start_gathering_lights();
        cache.finish_gathering_lights();
        assert!(cache.lights().is_empty());
    }
}
