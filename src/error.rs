// Startup failures
//
// Every step of the graphics initialization sequence has its own variant so
// the caller can tell which resource could not be created. The underlying
// error is kept as the source.

use thiserror::Error;

pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to create the window")]
    CreateWindow(#[source] Cause),
    #[error("failed to create the Vulkan device")]
    CreateDevice(#[source] Cause),
    #[error("failed to create the window surface")]
    CreateSurface(#[source] Cause),
    #[error("failed to create the swapchain")]
    CreateSwapchain(#[source] Cause),
    #[error("failed to create the render target view")]
    CreateRenderTargetView(#[source] Cause),
    #[error("failed to create the depth-stencil view")]
    CreateDepthStencilView(#[source] Cause),
    #[error("failed to initialize the shader effect")]
    InitializeEffect(#[source] Cause),
    #[error("failed to create the input layout")]
    CreateInputLayout(#[source] Cause),
    #[error("failed to load the model")]
    LoadModel(#[source] Cause),
    #[error("failed to create a vertex or index buffer")]
    CreateBuffer(#[source] Cause),
    #[error("failed to create the rasterizer state")]
    CreateRasterizerState(#[source] Cause),
}

impl InitError {
    /// Short name of the step that failed
    pub fn stage(&self) -> &'static str {
        match self {
            InitError::CreateWindow(_) => "window",
            InitError::CreateDevice(_) => "device",
            InitError::CreateSurface(_) => "surface",
            InitError::CreateSwapchain(_) => "swapchain",
            InitError::CreateRenderTargetView(_) => "render target view",
            InitError::CreateDepthStencilView(_) => "depth-stencil view",
            InitError::InitializeEffect(_) => "effect",
            InitError::CreateInputLayout(_) => "input layout",
            InitError::LoadModel(_) => "model",
            InitError::CreateBuffer(_) => "buffer",
            InitError::CreateRasterizerState(_) => "rasterizer state",
        }
    }
}

/// Tag a fallible step with the failure kind it reports
pub trait InitStep<T> {
    fn or_fail(self, kind: fn(Cause) -> InitError) -> Result<T, InitError>;
}

impl<T, E: Into<Cause>> InitStep<T> for Result<T, E> {
    fn or_fail(self, kind: fn(Cause) -> InitError) -> Result<T, InitError> {
        self.map_err(|e| kind(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn step_failure_keeps_its_kind_and_cause() {
        let step: Result<(), ash::vk::Result> = Err(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = step.or_fail(InitError::CreateBuffer).unwrap_err();

        assert!(matches!(err, InitError::CreateBuffer(_)));
        assert_eq!(err.stage(), "buffer");
        assert_eq!(err.to_string(), "failed to create a vertex or index buffer");
        assert!(err.source().is_some());
    }

    #[test]
    fn anyhow_causes_are_accepted() {
        let step: anyhow::Result<u32> = Err(anyhow::anyhow!("no technique passes"));
        let err = step.or_fail(InitError::InitializeEffect).unwrap_err();

        assert_eq!(err.stage(), "effect");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("no technique passes"));
    }

    #[test]
    fn every_stage_has_a_distinct_message() {
        let errors = [
            InitError::CreateWindow("x".into()),
            InitError::CreateDevice("x".into()),
            InitError::CreateSurface("x".into()),
            InitError::CreateSwapchain("x".into()),
            InitError::CreateRenderTargetView("x".into()),
            InitError::CreateDepthStencilView("x".into()),
            InitError::InitializeEffect("x".into()),
            InitError::CreateInputLayout("x".into()),
            InitError::LoadModel("x".into()),
            InitError::CreateBuffer("x".into()),
            InitError::CreateRasterizerState("x".into()),
        ];
        let messages: std::collections::HashSet<String> =
            errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn event_loop_failure_is_a_window_failure() {
        let step: Result<(), winit::error::EventLoopError> =
            Err(winit::error::EventLoopError::RecreationAttempt);
        let err = step.or_fail(InitError::CreateWindow).unwrap_err();

        assert_eq!(err.stage(), "window");
        assert!(err.source().is_some());
    }
}
