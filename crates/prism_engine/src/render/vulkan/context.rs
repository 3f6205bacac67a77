//! Vulkan context initialization
//!
//! Instance, surface, physical/logical device, queues, and the
//! command pool. The surface comes from GLFW, so the context must be
//! created on the thread that owns the window (the main thread).

use std::ffi::CString;

use ash::extensions::ext::ExtendedDynamicState;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Physical device selection result
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Whether line-mode rasterization is available
    pub fill_mode_non_solid: bool,
    /// Whether depth writes can be toggled at record time
    pub extended_dynamic_state: bool,
}

/// Owned Vulkan context with RAII cleanup
pub struct VulkanContext {
    /// Vulkan entry point; kept alive for the loaders
    _entry: Entry,
    instance: Instance,
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
    physical: PhysicalDeviceInfo,
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_pool: vk::CommandPool,
    extended_dynamic_state: Option<ExtendedDynamicState>,
}

impl VulkanContext {
    /// Create the full context over a GLFW window configured with
    /// `ClientApiHint::NoApi`
    pub fn new(
        glfw: &glfw::Glfw,
        window: &mut glfw::PWindow,
        app_name: &str,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("failed to load Vulkan: {e:?}"))
        })?;

        let instance = Self::create_instance(&entry, glfw, app_name)?;
        let surface_loader = Surface::new(&entry, &instance);

        let mut surface = vk::SurfaceKHR::null();
        let result = window.create_window_surface(instance.handle(), std::ptr::null(), &mut surface);
        if result != vk::Result::SUCCESS {
            unsafe { instance.destroy_instance(None) };
            return Err(VulkanError::Api(result));
        }

        let physical = Self::select_physical_device(&instance, &surface_loader, surface)?;
        log::info!(
            "selected GPU: {:?}",
            unsafe { std::ffi::CStr::from_ptr(physical.properties.device_name.as_ptr()) }
        );

        let device = Self::create_logical_device(&instance, &physical)?;
        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(physical.graphics_family);
        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let extended_dynamic_state = physical
            .extended_dynamic_state
            .then(|| ExtendedDynamicState::new(&instance, &device));

        Ok(Self {
            _entry: entry,
            instance,
            surface_loader,
            surface,
            physical,
            device,
            graphics_queue,
            present_queue,
            command_pool,
            extended_dynamic_state,
        })
    }

    fn create_instance(
        entry: &Entry,
        glfw: &glfw::Glfw,
        app_name: &str,
    ) -> VulkanResult<Instance> {
        let app_name_cstr = CString::new(app_name).unwrap_or_default();
        let engine_name_cstr = CString::new("prism_engine").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = glfw.get_required_instance_extensions().ok_or_else(|| {
            VulkanError::InitializationFailed("GLFW reports no Vulkan support".to_string())
        })?;
        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()).unwrap_or_default())
            .collect();
        let extension_ptrs: Vec<*const i8> =
            cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let layer_names = if cfg!(debug_assertions) {
            vec![CString::new("VK_LAYER_KHRONOS_validation").unwrap_or_default()]
        } else {
            vec![]
        };
        let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn select_physical_device(
        instance: &Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<PhysicalDeviceInfo> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            let Some(info) = Self::evaluate_device(instance, surface_loader, surface, device)?
            else {
                continue;
            };
            return Ok(info);
        }

        Err(VulkanError::InitializationFailed(
            "no Vulkan device with graphics and present support".to_string(),
        ))
    }

    fn evaluate_device(
        instance: &Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> VulkanResult<Option<PhysicalDeviceInfo>> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics_family.get_or_insert(index);
            }
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            if present_support {
                present_family.get_or_insert(index);
            }
        }
        let (Some(graphics_family), Some(present_family)) = (graphics_family, present_family)
        else {
            return Ok(None);
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let supports = |name: &std::ffi::CStr| {
            extensions.iter().any(|ext| {
                (unsafe { std::ffi::CStr::from_ptr(ext.extension_name.as_ptr()) }) == name
            })
        };
        if !supports(SwapchainLoader::name()) {
            return Ok(None);
        }

        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };

        Ok(Some(PhysicalDeviceInfo {
            device,
            properties,
            graphics_family,
            present_family,
            fill_mode_non_solid: features.fill_mode_non_solid == vk::TRUE,
            extended_dynamic_state: supports(ExtendedDynamicState::name()),
        }))
    }

    fn create_logical_device(
        instance: &Instance,
        physical: &PhysicalDeviceInfo,
    ) -> VulkanResult<Device> {
        let mut unique_families = vec![physical.graphics_family];
        if physical.present_family != physical.graphics_family {
            unique_families.push(physical.present_family);
        }
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::builder()
            .fill_mode_non_solid(physical.fill_mode_non_solid);

        let mut extension_ptrs = vec![SwapchainLoader::name().as_ptr()];
        if physical.extended_dynamic_state {
            extension_ptrs.push(ExtendedDynamicState::name().as_ptr());
        }

        let mut dynamic_state_features =
            vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::builder()
                .extended_dynamic_state(true);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);
        if physical.extended_dynamic_state {
            create_info = create_info.push_next(&mut dynamic_state_features);
        }

        unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Instance handle
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Logical device handle (cheap to clone, internally refcounted
    /// function table)
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Physical device info
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Command pool for per-frame and one-shot command buffers
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Extended dynamic state loader, when the extension is available
    pub fn extended_dynamic_state(&self) -> Option<&ExtendedDynamicState> {
        self.extended_dynamic_state.as_ref()
    }

    /// Record and submit a one-shot command buffer, waiting for
    /// completion. Used for uploads and layout transitions.
    pub fn submit_one_shot<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?[0]
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let result = unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)
                .and_then(|_| {
                    record(command_buffer);
                    self.device
                        .end_command_buffer(command_buffer)
                        .map_err(VulkanError::Api)
                })
                .and_then(|_| {
                    let buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
                    self.device
                        .queue_submit(self.graphics_queue, &[submit_info.build()], vk::Fence::null())
                        .map_err(VulkanError::Api)
                })
                .and_then(|_| {
                    self.device
                        .queue_wait_idle(self.graphics_queue)
                        .map_err(VulkanError::Api)
                })
        };

        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[command_buffer]);
        }
        result
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
