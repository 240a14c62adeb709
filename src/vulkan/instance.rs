use std::ffi::{c_char, CStr};
use std::sync::Arc;

use ash::{ext::debug_utils, khr::surface, vk, Entry, Instance};
use log::{debug, error, info, warn};

use super::surface::NativeWindow;
use crate::renderer::config::RendererFlags;
use crate::renderer::tracker::{ResourceKind, ResourceTracker};
use crate::{Result, VkContext};

pub const API_VERSION: u32 = vk::API_VERSION_1_1;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper that owns the global instance, optional validation
/// messenger, and the window surface.
pub struct VulkanInstance {
    // Keeps the loader library mapped until the instance is gone.
    _entry: Entry,
    instance: Instance,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    tracker: Arc<ResourceTracker>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance configured for the provided window.
    pub fn new(window: &NativeWindow, flags: RendererFlags, tracker: Arc<ResourceTracker>) -> Result<Self> {
        unsafe {
            let entry = Entry::load()?;

            let enable_validation = flags.wants_validation();
            let validation_layers = if enable_validation {
                Self::query_validation_layers(&entry)?
            } else {
                Vec::new()
            };
            let validation_available = !validation_layers.is_empty();

            let mut extensions: Vec<*const c_char> = window
                .required_extensions()?
                .into_iter()
                .map(CStr::as_ptr)
                .collect();
            if validation_available {
                extensions.push(debug_utils::NAME.as_ptr());
            }
            let gpu_assisted = validation_available && flags.contains(RendererFlags::GPU_ASSISTED);
            if gpu_assisted {
                extensions.push(ash::ext::validation_features::NAME.as_ptr());
            }

            let app_info = vk::ApplicationInfo::default()
                .application_name(c"vfighter")
                .application_version(vk::make_api_version(0, 0, 1, 0))
                .engine_name(c"vfighter")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(API_VERSION);

            let mut create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_extension_names(&extensions)
                .enabled_layer_names(&validation_layers);

            let mut debug_create_info =
                validation_available.then_some(Self::debug_messenger_create_info());
            if let Some(ref mut info) = debug_create_info {
                create_info = create_info.push_next(info);
            }

            let enabled_features = [
                vk::ValidationFeatureEnableEXT::GPU_ASSISTED,
                vk::ValidationFeatureEnableEXT::GPU_ASSISTED_RESERVE_BINDING_SLOT,
            ];
            let mut validation_features =
                vk::ValidationFeaturesEXT::default().enabled_validation_features(&enabled_features);
            if gpu_assisted {
                create_info = create_info.push_next(&mut validation_features);
            }

            let instance = entry
                .create_instance(&create_info, None)
                .context("Failed to create Vulkan instance")?;
            tracker.created(ResourceKind::Instance);

            let debug = if validation_available {
                let utils = debug_utils::Instance::new(&entry, &instance);
                let messenger = utils
                    .create_debug_utils_messenger(&Self::debug_messenger_create_info(), None)
                    .context("Failed to create debug messenger")?;
                tracker.created(ResourceKind::DebugMessenger);
                Some((utils, messenger))
            } else {
                None
            };

            let surface = window.create_surface(&entry, &instance)?;
            tracker.created(ResourceKind::Surface);
            let surface_loader = surface::Instance::new(&entry, &instance);

            info!(
                "Vulkan instance created (validation: {}, gpu-assisted: {gpu_assisted})",
                debug.is_some()
            );

            Ok(Self {
                _entry: entry,
                instance,
                surface_loader,
                surface,
                debug,
                tracker,
            })
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn query_validation_layers(entry: &Entry) -> Result<Vec<*const c_char>> {
        unsafe {
            let available_layers = entry
                .enumerate_instance_layer_properties()
                .context("Failed to enumerate instance layer properties")?;

            let found = available_layers
                .iter()
                .any(|layer| CStr::from_ptr(layer.layer_name.as_ptr()) == VALIDATION_LAYER);

            if found {
                Ok(vec![VALIDATION_LAYER.as_ptr()])
            } else {
                warn!("Validation layer {VALIDATION_LAYER:?} not available, continuing without it");
                Ok(Vec::new())
            }
        }
    }

    fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
    }

    /// Destroys the surface, messenger and instance.
    ///
    /// # Safety
    /// The logical device and every object created from it must already be destroyed.
    pub unsafe fn destroy(&mut self) {
        self.surface_loader.destroy_surface(self.surface, None);
        self.surface = vk::SurfaceKHR::null();
        self.tracker.destroyed(ResourceKind::Surface);

        if let Some((utils, messenger)) = self.debug.take() {
            utils.destroy_debug_utils_messenger(messenger, None);
            self.tracker.destroyed(ResourceKind::DebugMessenger);
        }

        self.instance.destroy_instance(None);
        self.tracker.destroyed(ResourceKind::Instance);
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if !callback_data.is_null() && !(*callback_data).p_message.is_null() {
        CStr::from_ptr((*callback_data).p_message)
            .to_string_lossy()
            .into_owned()
    } else {
        String::from("<null>")
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{message_types:?}] {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{message_types:?}] {message}");
    } else {
        debug!(target: "vulkan", "[{message_types:?}] {message}");
    }

    vk::FALSE
}
