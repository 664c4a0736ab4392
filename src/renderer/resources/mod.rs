//! "Resources" are GPU objects paired with the memory that backs them.
//! Each one releases both halves when dropped.

pub mod buffer;
pub mod image;
pub mod memory;
pub mod mesh;
pub mod vertex;
