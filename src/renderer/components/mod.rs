//! Concrete scene components. Registration order on the scene object is
//! transform, texture, model: descriptor sets are bound before the draw.
//! Each component binds at the set index the scene assigns when collecting layouts.

pub mod model;
pub mod texture;
pub mod transform;
