use std::sync::Arc;

use arrayvec::ArrayVec;
use wgpu::{
    Adapter, AdapterInfo, Backend, Backends, Device, DeviceDescriptor, DeviceType, Features, Instance,
    InstanceDescriptor, Limits, Queue,
};

use crate::FastHashMap;

/// Features required by the convolution pipelines.
pub const REQUIRED_FEATURES: Features = Features::PUSH_CONSTANTS;

/// Features used if they are available.
pub const OPTIONAL_FEATURES: Features = Features::FLOAT32_FILTERABLE;

/// Largest push constant block any program declares.
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

/// Smallest 2D texture dimension needed for the default lighting textures.
pub const MIN_TEXTURE_DIMENSION_2D: u32 = 2048;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LimitType {
    MaxTextureDimension2d,
    PushConstantSize,
}

#[derive(Debug, thiserror::Error)]
pub enum WgpuBackendError {
    #[error("no adapter satisfies the required features and limits")]
    MissingAdapter,
    #[error("device is missing required features {features:?}")]
    MissingDeviceFeatures { features: Features },
    #[error("device limit {ty:?} is {device_limit}, at least {required_limit} is required")]
    LowDeviceLimit {
        ty: LimitType,
        device_limit: u32,
        required_limit: u32,
    },
    #[error("failed to request device")]
    RequestDeviceFailed(#[from] wgpu::RequestDeviceError),
}

/// Checks the required features are present and returns those that will be enabled.
pub fn check_features(device: Features) -> Result<Features, WgpuBackendError> {
    let missing = REQUIRED_FEATURES - device;
    if !missing.is_empty() {
        return Err(WgpuBackendError::MissingDeviceFeatures { features: missing });
    }
    Ok(REQUIRED_FEATURES | (OPTIONAL_FEATURES & device))
}

fn check_limit(device_limit: u32, required_limit: u32, ty: LimitType) -> Result<u32, WgpuBackendError> {
    if device_limit < required_limit {
        Err(WgpuBackendError::LowDeviceLimit {
            ty,
            device_limit,
            required_limit,
        })
    } else {
        Ok(required_limit)
    }
}

/// Checks the adapter limits and returns the limits to request the device with.
pub fn check_limits(device_limits: &Limits) -> Result<Limits, WgpuBackendError> {
    Ok(Limits {
        max_texture_dimension_2d: check_limit(
            device_limits.max_texture_dimension_2d,
            MIN_TEXTURE_DIMENSION_2D,
            LimitType::MaxTextureDimension2d,
        )?,
        max_push_constant_size: check_limit(
            device_limits.max_push_constant_size,
            MAX_PUSH_CONSTANT_SIZE,
            LimitType::PushConstantSize,
        )?,
        ..Limits::downlevel_defaults().using_resolution(device_limits.clone())
    })
}

/// Validated set of features and limits for an adapter.
pub struct PotentialAdapter<T> {
    pub inner: T,
    pub info: AdapterInfo,
    pub features: Features,
    pub limits: Limits,
}

impl<T> PotentialAdapter<T> {
    pub fn new(
        inner: T,
        info: AdapterInfo,
        limits: Limits,
        features: Features,
    ) -> Result<Self, WgpuBackendError> {
        Ok(PotentialAdapter {
            inner,
            info,
            features: check_features(features)?,
            limits: check_limits(&limits)?,
        })
    }
}

/// Container for Instance/Adapter/Device/Queue.
pub struct InstanceAdapterDevice {
    pub instance: Arc<Instance>,
    pub adapter: Arc<Adapter>,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub info: AdapterInfo,
}

/// Creates an Instance/Adapter/Device/Queue, preferring discrete GPUs and the backends in
/// platform order.
///
/// `desired_device` is matched case insensitively against a substring of the adapter name.
pub async fn create_iad(
    desired_backend: Option<Backend>,
    desired_device: Option<String>,
) -> Result<InstanceAdapterDevice, WgpuBackendError> {
    profiling::scope!("create_iad");
    let default_backend_order = [Backend::Vulkan, Backend::Metal, Backend::Dx12, Backend::Gl];

    let instance = Instance::new(InstanceDescriptor {
        backends: Backends::PRIMARY | Backends::GL,
        ..Default::default()
    });

    let mut valid_adapters = FastHashMap::default();

    for backend in default_backend_order {
        let adapters = instance.enumerate_adapters(Backends::from(backend));

        let mut potential_adapters = ArrayVec::<PotentialAdapter<Adapter>, 4>::new();
        for (idx, adapter) in adapters.into_iter().enumerate() {
            let info = adapter.get_info();
            let limits = adapter.limits();
            let features = adapter.features();
            let potential = PotentialAdapter::new(adapter, info, limits, features);

            log::debug!(
                "{:?} Adapter {}: {:#?}",
                backend,
                idx,
                potential.as_ref().map(|p| &p.info)
            );

            let desired = match desired_device {
                Some(ref desired_device) => potential
                    .as_ref()
                    .map(|p| p.info.name.to_lowercase().contains(&desired_device.to_lowercase()))
                    .unwrap_or(false),
                None => true,
            };

            match (potential, desired) {
                (Ok(potential), true) if !potential_adapters.is_full() => potential_adapters.push(potential),
                (Err(e), _) => log::debug!("Adapter not usable: {e}"),
                _ => log::debug!("Adapter skipped"),
            }
        }
        valid_adapters.insert(backend, potential_adapters);
    }

    for backend_adapters in valid_adapters.values_mut() {
        backend_adapters.sort_by_key(|a| match a.info.device_type {
            DeviceType::DiscreteGpu => 0,
            DeviceType::IntegratedGpu => 1,
            DeviceType::VirtualGpu => 2,
            DeviceType::Cpu => 3,
            DeviceType::Other => 4,
        });
    }

    for backend in default_backend_order {
        if let Some(desired_backend) = desired_backend {
            if desired_backend != backend {
                log::debug!("Skipping unwanted backend {:?}", backend);
                continue;
            }
        }

        let adapter = valid_adapters.remove(&backend).and_then(|arr| arr.into_iter().next());

        if let Some(adapter) = adapter {
            log::debug!("Chosen adapter: {:#?}", adapter.info);
            log::debug!("Chosen features: {:#?}", adapter.features);
            log::debug!("Chosen limits: {:#?}", adapter.limits);

            let (device, queue) = adapter
                .inner
                .request_device(
                    &DeviceDescriptor {
                        label: Some("pbrview device"),
                        required_features: adapter.features,
                        required_limits: adapter.limits,
                    },
                    None,
                )
                .await?;

            return Ok(InstanceAdapterDevice {
                instance: Arc::new(instance),
                adapter: Arc::new(adapter.inner),
                device: Arc::new(device),
                queue: Arc::new(queue),
                info: adapter.info,
            });
        }
    }

    Err(WgpuBackendError::MissingAdapter)
}

#[cfg(test)]
mod tests {
    use wgpu::{Features, Limits};

    use super::{check_features, check_limits, LimitType, WgpuBackendError, MAX_PUSH_CONSTANT_SIZE};

    #[test]
    fn push_constants_are_required() {
        assert!(matches!(
            check_features(Features::FLOAT32_FILTERABLE),
            Err(WgpuBackendError::MissingDeviceFeatures { features }) if features == Features::PUSH_CONSTANTS
        ));
    }

    #[test]
    fn optional_features_are_kept_when_present() {
        let chosen = check_features(Features::all()).unwrap();
        assert_eq!(chosen, Features::PUSH_CONSTANTS | Features::FLOAT32_FILTERABLE);
    }

    #[test]
    fn push_constant_limit_is_checked() {
        let limits = Limits {
            max_push_constant_size: 64,
            ..Limits::default()
        };
        assert!(matches!(
            check_limits(&limits),
            Err(WgpuBackendError::LowDeviceLimit {
                ty: LimitType::PushConstantSize,
                device_limit: 64,
                ..
            })
        ));

        let limits = Limits {
            max_push_constant_size: 256,
            ..Limits::default()
        };
        assert_eq!(check_limits(&limits).unwrap().max_push_constant_size, MAX_PUSH_CONSTANT_SIZE);
    }
}
