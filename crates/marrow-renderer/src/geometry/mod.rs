//! Geometry batching.

mod draw_cache;
mod vertex;

pub use draw_cache::{CacheStats, DrawCache, DynamicLight, SurfaceBatch, SurfaceDraw, MAX_DYNAMIC_LIGHTS};
pub use vertex::SurfaceVertex;
