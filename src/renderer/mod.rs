pub mod camera;
pub mod config;
pub mod error;

mod components;
mod contexts;
mod frame_loop;
mod resources;
mod scene;
mod shader_data;

use std::time::Instant;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::components::model::ModelComponent;
use crate::renderer::components::texture::{Pixels, TextureComponent};
use crate::renderer::components::transform::TransformComponent;
use crate::renderer::config::{RenderConfig, MAX_FRAMES_IN_FLIGHT};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::PresentationChain;
use crate::renderer::contexts::pipeline_ctx::PipelineState;
use crate::renderer::contexts::pipeline_ctx::render_pass::RenderPassPlan;
use crate::renderer::contexts::resource_ctx::{plan_descriptor_pool, RenderResourceContext};
use crate::renderer::frame_loop::FrameLoop;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::scene::SceneObject;

/// Owns every GPU object for the one scene. Fields drop top to bottom, so the
/// scene goes first and the device context last.
pub struct Renderer {
    frame_loop: FrameLoop,
    scene: SceneObject,
    pipeline: PipelineState,
    res: RenderResourceContext,
    plan: RenderPassPlan,
    chain: PresentationChain,
    dev: RenderDeviceContext,

    start_time: Instant,
}

impl Renderer {
    pub fn new(
        window: &Window,
        config: &RenderConfig,
    ) -> Result<Self> {
        let dev = RenderDeviceContext::new(window, config)?;
        let chain = PresentationChain::new(&dev, config)?;
        log::info!(
            "Swapchain: {} images, {:?}, {}x{}",
            chain.image_count(),
            chain.format(),
            chain.extent().width,
            chain.extent().height,
        );

        let mut plan = RenderPassPlan::build(
            dev.device.logical.clone(),
            chain.format(),
            chain.depth_format,
        )?;
        plan.build_framebuffers(&chain)?;

        let pixels = Pixels::load_or_checkerboard(&config.texture_path);
        let mut texture = TextureComponent::new(&dev, &pixels)?;
        let mut transform = TransformComponent::new(&dev.device, chain.extent(), config.animate)?;

        let pool_plan = plan_descriptor_pool(
            &[transform.demand().clone(), texture.demand().clone()],
            MAX_FRAMES_IN_FLIGHT,
        )?;
        let mut res = RenderResourceContext::new(dev.device.logical.clone(), pool_plan)?;
        transform.allocate_descriptor_sets(&mut res)?;
        texture.allocate_descriptor_sets(&mut res)?;

        // Set indices in the pipeline layout follow registration order
        let mut scene = SceneObject::new();
        scene.add_component(Box::new(transform));
        scene.add_component(Box::new(texture));

        let pipeline = PipelineState::build(
            dev.device.logical.clone(),
            &config.shader_dir,
            plan.render_pass,
            &scene.collect_layouts(),
        )?;

        // Drawn last, after every descriptor set is bound
        let model = ModelComponent::new(&dev, &Mesh::new_stacked_quads(), pipeline.pipeline)?;
        scene.add_component(Box::new(model));
        log::debug!(
            "Scene ready: {} components, {} descriptor set layouts",
            scene.component_count(),
            pipeline.set_layout_count(),
        );

        let frame_loop = FrameLoop::new(&dev.device, config.clear_color)?;

        Ok(Self {
            frame_loop,
            scene,
            pipeline,
            res,
            plan,
            chain,
            dev,
            start_time: Instant::now(),
        })
    }

    pub fn draw(&mut self) -> Result<()> {
        let elapsed_secs = self.start_time.elapsed().as_secs_f32();
        self.frame_loop.run_frame(
            &self.dev.device,
            &mut self.chain,
            &self.plan,
            &mut self.scene,
            self.pipeline.layout,
            elapsed_secs,
        )
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Nothing may be in flight once the fields start dropping. Fences are not
        // consulted: an abandoned frame can leave one unsignaled.
        if let Err(e) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle before teardown: {e:#}");
        }
        log::debug!("Releasing renderer, descriptor pool {:?}", self.res.pool);
    }
}
