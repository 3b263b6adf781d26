// =============================================================================
// GRAPHICS - Device/resource initialization and the per-frame render loop
// =============================================================================
//
// INITIALIZATION ORDER (each step reports its own InitError kind):
//  1. Device (instance, GPU, queue, allocator) + window surface
//  2. Multisampling capability query
//  3. Swapchain
//  4. Render target view (render pass + MSAA color target)
//  5. Depth-stencil buffer/view + framebuffers
//  6. Viewport
//  7. Shader effect
//  8. Input layout
//  9. Vertex/index buffers from the model file
// 10. Transform matrices
// 11. Rasterizer state, bound into one pipeline per technique pass
//
// Every resource is an owner that frees itself on drop, so an early `?`
// releases whatever was already created, newest first.
//
// FRAME FLOW:
// wait fence -> acquire image -> record (clear, bind, transform, draw per
// pass) -> submit -> present
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::HasDisplayHandle;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::render_target::{self, clear_values};
use crate::backend::swapchain::is_out_of_date;
use crate::backend::{
    CommandPool, DepthStencil, Effect, FrameSync, Framebuffers, GpuBuffer, GpuImage, InputLayout,
    PresentSemaphores, RasterizerState, RenderPass, Surface, Swapchain, Technique, VulkanDevice,
};
use crate::camera::OrbitCamera;
use crate::config::Config;
use crate::error::{InitError, InitStep};
use crate::model::Model;
use crate::transform::{Projection, Transforms};

/// Owns every GPU resource of the viewer.
///
/// Field order matters for Drop: objects are declared before the objects
/// they depend on, so they are destroyed first.
pub struct Graphics {
    // ─────────────────────────────────────────────────────────────────────────
    // PER-FRAME
    // ─────────────────────────────────────────────────────────────────────────
    frames: Vec<FrameSync>,
    commands: CommandPool,
    current_frame: usize,

    // ─────────────────────────────────────────────────────────────────────────
    // PIPELINE & GEOMETRY
    // ─────────────────────────────────────────────────────────────────────────
    technique: Technique,
    _effect: Effect,
    index_buffer: GpuBuffer,
    vertex_buffer: GpuBuffer,
    index_count: u32,

    // ─────────────────────────────────────────────────────────────────────────
    // RENDER TARGETS (recreated on resize)
    // ─────────────────────────────────────────────────────────────────────────
    framebuffers: Framebuffers,
    present_semaphores: PresentSemaphores,
    depth: DepthStencil,
    color_target: Option<GpuImage>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    surface: Surface,
    device: Arc<VulkanDevice>,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE
    // ─────────────────────────────────────────────────────────────────────────
    viewport: vk::Viewport,
    scissor: vk::Rect2D,
    camera: OrbitCamera,
    projection: Projection,
    transforms: Transforms,
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    depth_format: vk::Format,
    surface_size: (u32, u32),
    needs_resize: bool,
    is_minimized: bool,
}

impl Graphics {
    /// Run the initialization sequence for `window`
    pub fn new(window: &Window, config: &Config) -> Result<Self, InitError> {
        log::info!("Initializing graphics...");
        let size = window.inner_size();

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Device + surface
        // ─────────────────────────────────────────────────────────────────────
        // Validation only in debug builds
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let display = window
            .display_handle()
            .or_fail(InitError::CreateDevice)?
            .as_raw();
        let device = VulkanDevice::new(&config.window.title, enable_validation, display)
            .or_fail(InitError::CreateDevice)?;
        let surface = Surface::new(device.clone(), window).or_fail(InitError::CreateSurface)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Multisampling (falls back to 1 sample, never fails)
        // ─────────────────────────────────────────────────────────────────────
        let samples = device.max_usable_sample_count(config.graphics.msaa_samples);
        log::info!("Multisampling: {:?}", samples);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Swapchain
        // ─────────────────────────────────────────────────────────────────────
        let present_mode = config.get_present_mode();
        let swapchain = Swapchain::new(
            device.clone(),
            &surface,
            size.width,
            size.height,
            present_mode,
            None,
        )
        .or_fail(InitError::CreateSwapchain)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Render target view
        // ─────────────────────────────────────────────────────────────────────
        let depth_format = device
            .depth_stencil_format()
            .or_fail(InitError::CreateDepthStencilView)?;
        let render_pass = RenderPass::new(&device, swapchain.format, depth_format, samples)
            .or_fail(InitError::CreateRenderTargetView)?;
        let color_target = render_target::create_color_target(&device, &render_pass, &swapchain)
            .or_fail(InitError::CreateRenderTargetView)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Depth-stencil buffer, view, and binding to the render target
        // ─────────────────────────────────────────────────────────────────────
        let depth = DepthStencil::new(&device, depth_format, swapchain.extent, samples)
            .or_fail(InitError::CreateDepthStencilView)?;
        let framebuffers = Framebuffers::new(
            &device,
            &render_pass,
            &swapchain,
            color_target.as_ref(),
            &depth,
        )
        .or_fail(InitError::CreateDepthStencilView)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Viewport
        // ─────────────────────────────────────────────────────────────────────
        let (viewport, scissor) = viewport_for(swapchain.extent);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 7: Shader effect
        // ─────────────────────────────────────────────────────────────────────
        let effect = Effect::load(&device, &config.effect).or_fail(InitError::InitializeEffect)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 8: Input layout, matched against the first pass
        // ─────────────────────────────────────────────────────────────────────
        let input_layout =
            InputLayout::new(effect.vertex_signature()).or_fail(InitError::CreateInputLayout)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 9: Vertex and index buffers
        // ─────────────────────────────────────────────────────────────────────
        let model = Model::load(&config.model.path, config.model.color).or_fail(InitError::LoadModel)?;
        let vertex_buffer = GpuBuffer::immutable(
            &device,
            "model vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &model.vertices,
        )
        .or_fail(InitError::CreateBuffer)?;
        let index_buffer = GpuBuffer::immutable(
            &device,
            "model indices",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &model.indices,
        )
        .or_fail(InitError::CreateBuffer)?;
        let index_count = u32::try_from(model.indices.len()).or_fail(InitError::CreateBuffer)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 10: Transforms
        // ─────────────────────────────────────────────────────────────────────
        let camera = OrbitCamera::new(
            config.camera.radius,
            config.camera.azimuth,
            config.camera.elevation,
        );
        let projection = Projection::from_config(&config.camera);
        let transforms = Transforms::new(
            config.model.scale,
            camera.view_matrix(),
            &projection,
            swapchain.extent.width as f32,
            swapchain.extent.height as f32,
        );

        // ─────────────────────────────────────────────────────────────────────
        // STEP 11: Rasterizer state, bound by building the pass pipelines
        // ─────────────────────────────────────────────────────────────────────
        let rasterizer = RasterizerState::new(&config.graphics, device.supports_wireframe)
            .or_fail(InitError::CreateRasterizerState)?;
        let technique = Technique::new(&device, &effect, &input_layout, &rasterizer, &render_pass)
            .or_fail(InitError::CreateRasterizerState)?;

        // ─────────────────────────────────────────────────────────────────────
        // Command buffers and sync objects, one set per frame in flight
        // ─────────────────────────────────────────────────────────────────────
        let frames_in_flight = config.graphics.max_frames_in_flight.max(1);
        let commands =
            CommandPool::new(&device, frames_in_flight as u32).or_fail(InitError::CreateDevice)?;
        let frames = (0..frames_in_flight)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()
            .or_fail(InitError::CreateDevice)?;
        let present_semaphores = PresentSemaphores::new(&device, swapchain.images.len())
            .or_fail(InitError::CreateDevice)?;

        log::info!(
            "Graphics initialized: {}x{}, {} indices, {} pass(es)",
            swapchain.extent.width,
            swapchain.extent.height,
            index_count,
            technique.pipelines.len()
        );

        Ok(Self {
            frames,
            commands,
            current_frame: 0,
            technique,
            _effect: effect,
            index_buffer,
            vertex_buffer,
            index_count,
            framebuffers,
            present_semaphores,
            depth,
            color_target,
            render_pass,
            swapchain,
            surface,
            device,
            viewport,
            scissor,
            camera,
            projection,
            transforms,
            clear_color: config.graphics.clear_color,
            present_mode,
            depth_format,
            surface_size: (size.width, size.height),
            needs_resize: false,
            is_minimized: false,
        })
    }

    // =========================================================================
    // CAMERA
    // =========================================================================

    /// Place the camera; angles in degrees
    pub fn set_camera_position(&mut self, radius: f32, azimuth: f32, elevation: f32) {
        self.camera.set_position(radius, azimuth, elevation);
        self.transforms.view = self.camera.view_matrix();
    }

    /// (radius, azimuth, elevation), angles in degrees
    pub fn camera_position(&self) -> (f32, f32, f32) {
        self.camera.position()
    }

    pub fn orbit_camera(&mut self, d_azimuth: f32, d_elevation: f32) {
        self.camera.orbit(d_azimuth, d_elevation);
        self.transforms.view = self.camera.view_matrix();
    }

    pub fn zoom_camera(&mut self, d_radius: f32) {
        self.camera.zoom(d_radius);
        self.transforms.view = self.camera.view_matrix();
    }

    // =========================================================================
    // RESIZE
    // =========================================================================

    /// Note a new window size; the swapchain is rebuilt on the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
        if width == 0 || height == 0 {
            self.is_minimized = true;
        } else {
            self.is_minimized = false;
            self.needs_resize = true;
        }
    }

    pub fn request_resize(&mut self) {
        self.needs_resize = true;
    }

    /// Rebuild everything sized after the window
    fn recreate_swapchain(&mut self) -> Result<()> {
        // Wait for GPU to finish all work before destroying resources
        self.device.wait_idle()?;

        let (width, height) = self.surface_size;
        if width == 0 || height == 0 {
            self.is_minimized = true;
            return Ok(());
        }

        let swapchain = Swapchain::new(
            self.device.clone(),
            &self.surface,
            width,
            height,
            self.present_mode,
            Some(&self.swapchain),
        )?;

        if swapchain.format != self.render_pass.color_format {
            anyhow::bail!(
                "Surface format changed from {:?} to {:?}",
                self.render_pass.color_format,
                swapchain.format
            );
        }

        let color_target =
            render_target::create_color_target(&self.device, &self.render_pass, &swapchain)?;
        let depth = DepthStencil::new(
            &self.device,
            self.depth_format,
            swapchain.extent,
            self.render_pass.samples,
        )?;
        let framebuffers = Framebuffers::new(
            &self.device,
            &self.render_pass,
            &swapchain,
            color_target.as_ref(),
            &depth,
        )?;
        let present_semaphores = PresentSemaphores::new(&self.device, swapchain.images.len())?;

        // Replace users before what they use
        self.framebuffers = framebuffers;
        self.present_semaphores = present_semaphores;
        self.depth = depth;
        self.color_target = color_target;
        self.swapchain = swapchain;

        let extent = self.swapchain.extent;
        (self.viewport, self.scissor) = viewport_for(extent);
        self.transforms.projection = self
            .projection
            .matrix(extent.width as f32, extent.height as f32);

        self.needs_resize = false;
        log::info!("Swapchain recreated: {}x{}", extent.width, extent.height);
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render and present one frame. Returns false when nothing was drawn
    /// (minimized window or swapchain being recreated).
    pub fn render(&mut self) -> Result<bool> {
        // Skip rendering if minimized
        if self.is_minimized {
            return Ok(false);
        }

        if self.needs_resize {
            self.recreate_swapchain()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        let frame = &self.frames[self.current_frame];
        let (image_available, in_flight) = (frame.image_available, frame.in_flight_fence);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait until this frame slot's previous submission is done
        // ─────────────────────────────────────────────────────────────────────
        unsafe {
            self.device
                .device
                .wait_for_fences(&[in_flight], true, u64::MAX)?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let image_index = match self.swapchain.acquire_next_image(u64::MAX, image_available) {
            Ok((index, suboptimal)) => {
                // Suboptimal means swapchain still works but should be recreated
                if suboptimal {
                    self.needs_resize = true;
                }
                index
            }
            Err(e) if is_out_of_date(&e) => {
                self.needs_resize = true;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Record this frame's commands
        // ─────────────────────────────────────────────────────────────────────
        let cmd = self.commands.buffers[self.current_frame];
        self.record(cmd, image_index)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit
        // ─────────────────────────────────────────────────────────────────────
        let render_finished = self.present_semaphores.for_image(image_index)?;
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // Reset only once a submit is certain to follow, or the next wait hangs
        unsafe {
            self.device.device.reset_fences(&[in_flight])?;
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], in_flight)
                .context("Failed to submit frame")?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present
        // ─────────────────────────────────────────────────────────────────────
        let suboptimal =
            self.swapchain
                .present(self.device.graphics_queue, image_index, &signal_semaphores)?;
        if suboptimal {
            self.needs_resize = true;
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        Ok(true)
    }

    /// Clear, bind geometry, upload the transform and draw once per pass
    fn record(&self, cmd: vk::CommandBuffer, image_index: u32) -> Result<()> {
        let device = &self.device.device;
        let framebuffer = *self
            .framebuffers
            .framebuffers
            .get(image_index as usize)
            .context("Swapchain image without framebuffer")?;

        let clear_values = clear_values(self.clear_color);
        let world_view_projection = self.transforms.world_view_projection();

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            // Clears color and depth-stencil through the attachment load ops
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.render_pass)
                .framebuffer(framebuffer)
                .render_area(self.scissor)
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

            device.cmd_set_viewport(cmd, 0, &[self.viewport]);
            device.cmd_set_scissor(cmd, 0, &[self.scissor]);

            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT32);

            self.technique.set_transform(cmd, &world_view_projection);

            for &pipeline in &self.technique.pipelines {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
            }

            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)?;
        }

        Ok(())
    }
}

impl Drop for Graphics {
    fn drop(&mut self) {
        log::info!("Cleaning up graphics resources...");
        // Nothing may be in use when the fields start dropping
        let _ = self.device.wait_idle();
    }
}

/// Full-surface viewport, flipped vertically so +Y points up in clip space
/// like the left-handed projection expects
pub fn viewport_for(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_covers_the_surface_upside_down() {
        let (viewport, scissor) = viewport_for(vk::Extent2D { width: 800, height: 600 });

        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 600.0);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, -600.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!(scissor.extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
    }
}
