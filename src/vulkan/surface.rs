//! Native window handles and X11 surface creation.
//!
//! The renderer presents to exactly one surface type: an X11 window, reached
//! either through an Xlib display (what winit hands out) or an XCB connection.

use std::ffi::CStr;

use ash::{khr::surface, vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

use crate::{RenderError, Result, VkContext};

/// Connection + window identifier pair supplied by the windowing collaborator.
#[derive(Copy, Clone, Debug)]
pub struct NativeWindow {
    display: RawDisplayHandle,
    window: RawWindowHandle,
}

// SAFETY: the handles are opaque identifiers. The window thread keeps the
// connection and window alive until the render thread has been joined, and only
// the render thread issues Vulkan calls with them.
unsafe impl Send for NativeWindow {}

impl NativeWindow {
    pub fn new(display: RawDisplayHandle, window: RawWindowHandle) -> Self {
        Self { display, window }
    }

    /// Captures the raw handles of any window type (e.g. `winit::window::Window`).
    pub fn from_window<W: HasWindowHandle + HasDisplayHandle>(window: &W) -> Result<Self> {
        let display = window
            .display_handle()
            .map_err(|e| RenderError::Unsupported(format!("No display handle: {e}")))?
            .as_raw();
        let window = window
            .window_handle()
            .map_err(|e| RenderError::Unsupported(format!("No window handle: {e}")))?
            .as_raw();
        Ok(Self::new(display, window))
    }

    /// Instance extensions needed to create a surface for these handles.
    pub fn required_extensions(&self) -> Result<Vec<&'static CStr>> {
        let platform = match (self.display, self.window) {
            (RawDisplayHandle::Xlib(_), RawWindowHandle::Xlib(_)) => ash::khr::xlib_surface::NAME,
            (RawDisplayHandle::Xcb(_), RawWindowHandle::Xcb(_)) => ash::khr::xcb_surface::NAME,
            (display, window) => {
                return Err(RenderError::Unsupported(format!(
                    "Unsupported window handles: {display:?} / {window:?}"
                )))
            }
        };
        Ok(vec![surface::NAME, platform])
    }

    /// Creates the presentation surface.
    ///
    /// # Safety
    /// `instance` must have been created with [`Self::required_extensions`] enabled
    /// and the native window must outlive the returned surface.
    pub unsafe fn create_surface(&self, entry: &Entry, instance: &Instance) -> Result<vk::SurfaceKHR> {
        match (self.display, self.window) {
            (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
                let loader = ash::khr::xlib_surface::Instance::new(entry, instance);
                let dpy = display
                    .display
                    .map(|d| d.as_ptr())
                    .ok_or_else(|| RenderError::Unsupported("Xlib handle without display".into()))?;
                let create_info = vk::XlibSurfaceCreateInfoKHR::default()
                    .dpy(dpy as *mut _)
                    .window(window.window);
                loader
                    .create_xlib_surface(&create_info, None)
                    .context("Failed to create Xlib surface")
            }
            (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
                let loader = ash::khr::xcb_surface::Instance::new(entry, instance);
                let connection = display
                    .connection
                    .map(|c| c.as_ptr())
                    .ok_or_else(|| RenderError::Unsupported("XCB handle without connection".into()))?;
                let create_info = vk::XcbSurfaceCreateInfoKHR::default()
                    .connection(connection as *mut _)
                    .window(window.window.get());
                loader
                    .create_xcb_surface(&create_info, None)
                    .context("Failed to create XCB surface")
            }
            (display, window) => Err(RenderError::Unsupported(format!(
                "Unsupported window handles: {display:?} / {window:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, WaylandWindowHandle, XlibDisplayHandle, XlibWindowHandle};
    use std::ptr::NonNull;

    #[test]
    fn xlib_handles_request_xlib_surface() {
        let mut dangling = 0u8;
        let display = XlibDisplayHandle::new(NonNull::new(&mut dangling as *mut u8 as *mut _), 0);
        let window = XlibWindowHandle::new(42);
        let native = NativeWindow::new(display.into(), window.into());

        let extensions = native.required_extensions().unwrap();
        assert_eq!(extensions, vec![surface::NAME, ash::khr::xlib_surface::NAME]);
    }

    #[test]
    fn non_x11_handles_are_rejected() {
        let mut dangling = 0u8;
        let ptr = NonNull::new(&mut dangling as *mut u8 as *mut std::ffi::c_void).unwrap();
        let native = NativeWindow::new(
            WaylandDisplayHandle::new(ptr).into(),
            WaylandWindowHandle::new(ptr).into(),
        );
        assert!(matches!(
            native.required_extensions(),
            Err(RenderError::Unsupported(_))
        ));
    }
}
