// Window surface - platform-specific connection between Vulkan and the window
//
// Supports Win32, Xlib and Wayland windows through raw-window-handle.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

use super::VulkanDevice;

/// Instance extensions needed to create a surface on this display
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    use ash::extensions::khr;

    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => anyhow::bail!("Unsupported display type: {:?}", other),
    };

    Ok(vec![khr::Surface::name(), platform])
}

/// Presentation surface; destroyed before the instance it came from
pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::extensions::khr::Surface,
    device: Arc<VulkanDevice>,
}

impl Surface {
    pub fn new<W: HasWindowHandle + HasDisplayHandle>(
        device: Arc<VulkanDevice>,
        window: &W,
    ) -> Result<Self> {
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let entry = &device.entry;
        let instance = &device.instance;

        let surface = unsafe {
            match (display_handle, window_handle) {
                (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                    let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0)
                        as *const std::ffi::c_void;
                    let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
                    let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                        .hinstance(hinstance)
                        .hwnd(hwnd);
                    ash::extensions::khr::Win32Surface::new(entry, instance)
                        .create_win32_surface(&create_info, None)?
                }
                (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
                    let dpy = display
                        .display
                        .context("Xlib display pointer missing")?
                        .as_ptr();
                    let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                        .dpy(dpy as *mut _)
                        .window(handle.window);
                    ash::extensions::khr::XlibSurface::new(entry, instance)
                        .create_xlib_surface(&create_info, None)?
                }
                (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
                    let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                        .display(display.display.as_ptr())
                        .surface(handle.surface.as_ptr());
                    ash::extensions::khr::WaylandSurface::new(entry, instance)
                        .create_wayland_surface(&create_info, None)?
                }
                _ => anyhow::bail!("Unsupported window handle type"),
            }
        };

        let loader = ash::extensions::khr::Surface::new(entry, instance);

        Ok(Self {
            surface,
            loader,
            device,
        })
    }

    /// Whether the graphics queue can present to this surface
    pub fn supports_present(&self) -> Result<bool> {
        let supported = unsafe {
            self.loader.get_physical_device_surface_support(
                self.device.physical_device,
                self.device.graphics_queue_family,
                self.surface,
            )
        }?;
        Ok(supported)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, WindowsDisplayHandle};
    use std::ptr::NonNull;

    #[test]
    fn windows_needs_win32_surface() {
        let exts = required_extensions(RawDisplayHandle::Windows(WindowsDisplayHandle::new())).unwrap();
        assert!(exts.contains(&ash::extensions::khr::Surface::name()));
        assert!(exts.contains(&ash::extensions::khr::Win32Surface::name()));
    }

    #[test]
    fn wayland_needs_wayland_surface() {
        let mut dummy = 0u8;
        let display = WaylandDisplayHandle::new(NonNull::from(&mut dummy).cast());
        let exts = required_extensions(RawDisplayHandle::Wayland(display)).unwrap();
        assert!(exts.contains(&ash::extensions::khr::WaylandSurface::name()));
    }
}
