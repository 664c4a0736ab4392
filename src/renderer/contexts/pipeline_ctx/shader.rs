use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::error::RenderError;

pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    /// Loads `<dir>/<name>.vert.spv` and `<dir>/<name>.frag.spv`
    pub fn load(shader_dir: &Path, shader_name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let read = |stage: &str| {
            let path = shader_dir.join(format!("{}.{}.spv", shader_name, stage));
            std::fs::read(&path).wrap_err_with(|| format!("Failed to read shader {:?}", path))
        };
        let vert = read("vert")?;
        let frag = read("frag")?;
        Self::from_bytes(&vert, &frag, device)
    }

    pub fn from_bytes(vert: &[u8], frag: &[u8], device: Arc<ash::Device>) -> Result<Self> {
        let vert_mod = create_shader_module(vert, &device)?;
        let frag_mod = match create_shader_module(frag, &device) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(e);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

/// SPIR-V bytes as words. The blob is otherwise opaque; only its size is checked.
pub fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    Ok(ash::util::read_spv(&mut Cursor::new(code))
        .wrap_err("Shader bytecode size is not a multiple of 4")?)
}

fn create_shader_module(code: &[u8], device: &ash::Device) -> Result<vk::ShaderModule> {
    let words = spirv_words(code)?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&words);

    let shader_module = unsafe {
        device
            .create_shader_module(&shader_module_info, None)
            .map_err(RenderError::creation("shader module"))?
    };

    Ok(shader_module)
}
