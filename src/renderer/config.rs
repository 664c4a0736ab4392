use std::path::PathBuf;

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Contains configuration options for the renderer like the resolution, validation, and other settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub enable_validation: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub prefer_mailbox: bool,
    pub clear_color: [f32; 4],
    pub texture_path: PathBuf,
    pub shader_dir: PathBuf,
    pub animate: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            window_width: 480,
            window_height: 480,
            prefer_mailbox: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            texture_path: PathBuf::from("assets/texture.jpg"),
            shader_dir: PathBuf::from("shaders-built"),
            animate: false,
        }
    }
}
