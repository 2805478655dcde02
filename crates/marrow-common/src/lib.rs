#![allow(clippy::needless_return, clippy::manual_range_contains)]

pub mod shapes;
pub mod world;
