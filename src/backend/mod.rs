// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Every wrapper holds an Arc to the device and frees its handles on drop.

pub mod buffer;
pub mod command;
pub mod depth;
pub mod device;
pub mod effect;
pub mod image;
pub mod input_layout;
pub mod rasterizer;
pub mod render_target;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::GpuBuffer;
pub use command::CommandPool;
pub use depth::DepthStencil;
pub use device::VulkanDevice;
pub use effect::{Effect, Technique};
pub use image::GpuImage;
pub use input_layout::InputLayout;
pub use rasterizer::RasterizerState;
pub use render_target::{Framebuffers, RenderPass};
pub use shader::ShaderModule;
pub use surface::Surface;
pub use swapchain::Swapchain;
pub use sync::{FrameSync, PresentSemaphores};
