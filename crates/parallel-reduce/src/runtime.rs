//! CubeCL runtime wrapper for GPU execution.
//!
//! Wraps a CubeCL compute client together with the [`DeviceInfo`] used to
//! size reductions, and provides host/device transfers.

use crate::device::DeviceInfo;
use crate::error::{ReduceError, Result};
use cubecl::prelude::*;
use cubecl::server::Handle;
use std::marker::PhantomData;

// Re-export CubeCL's Runtime trait so downstream crates don't need cubecl directly
pub use cubecl::Runtime as CubeclRuntime;

/// Compute units assumed for GPUs when the backend does not report them.
pub const DEFAULT_GPU_COMPUTE_UNITS: usize = 16;

/// Work-group size assumed for GPUs when the backend does not report it.
pub const DEFAULT_GPU_WORK_GROUP_SIZE: usize = 256;

/// GPU runtime context with a CubeCL client.
pub struct RuntimeContext<R: Runtime> {
    client: ComputeClient<R::Server, R::Channel>,
    info: DeviceInfo,
    _phantom: PhantomData<R>,
}

impl<R: Runtime> RuntimeContext<R> {
    /// Create a runtime context for `device`, described by `info`.
    pub fn new(device: R::Device, info: DeviceInfo) -> Self {
        Self {
            client: R::client(&device),
            info,
            _phantom: PhantomData,
        }
    }

    /// Get a reference to the compute client.
    pub fn client(&self) -> &ComputeClient<R::Server, R::Channel> {
        &self.client
    }

    /// Capabilities used to size launches on this device.
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Get the backend name (e.g. "cuda", "wgpu<wgsl>").
    pub fn backend_name(&self) -> &'static str {
        R::name()
    }

    /// Block until every enqueued kernel has completed.
    ///
    /// `client.read()` is a blocking sync point in CubeCL, so reading back a
    /// one-byte buffer flushes the whole pipeline.
    pub fn sync(&self) {
        let handle = self.client.empty(1);
        let _ = self.client.read(handle.binding());
    }
}

/// Device buffer wrapping a CubeCL handle.
pub struct GpuBuffer<R: Runtime> {
    handle: Handle,
    len: usize,
    _phantom: PhantomData<R>,
}

impl<R: Runtime> GpuBuffer<R> {
    /// Wrap a handle holding `len` elements.
    pub fn from_handle(handle: Handle, len: usize) -> Self {
        Self {
            handle,
            len,
            _phantom: PhantomData,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a reference to the underlying handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Copy host data into a new device buffer.
pub fn to_device<R: Runtime, T: CubePrimitive + bytemuck::Pod>(
    data: &[T],
    runtime: &RuntimeContext<R>,
) -> Result<GpuBuffer<R>> {
    let handle = runtime.client().create(bytemuck::cast_slice(data));
    Ok(GpuBuffer::from_handle(handle, data.len()))
}

/// Copy a device buffer back to the host.
pub fn to_cpu<R: Runtime, T: CubePrimitive + bytemuck::Pod>(
    buffer: &GpuBuffer<R>,
    runtime: &RuntimeContext<R>,
) -> Result<Vec<T>> {
    let bytes = runtime.client().read(buffer.handle().clone().binding());
    let data: Vec<T> = bytemuck::try_cast_slice(&bytes)
        .map_err(|e| ReduceError::CubeCLError(format!("unexpected readback layout: {e}")))?
        .to_vec();
    if data.len() != buffer.len() {
        return Err(ReduceError::InvalidBufferSize {
            expected: buffer.len(),
            actual: data.len(),
        });
    }
    Ok(data)
}

/// Allocate an uninitialized device buffer of `len` elements.
pub fn allocate<R: Runtime, T: CubePrimitive>(
    len: usize,
    runtime: &RuntimeContext<R>,
) -> Result<GpuBuffer<R>> {
    let handle = runtime.client().empty(len * std::mem::size_of::<T>());
    Ok(GpuBuffer::from_handle(handle, len))
}

/// Describe a GPU for which the backend reports no sizing capabilities.
pub fn gpu_device_info(name: &str) -> DeviceInfo {
    DeviceInfo::accelerator(name, DEFAULT_GPU_COMPUTE_UNITS, DEFAULT_GPU_WORK_GROUP_SIZE)
}

/// Initialize a CUDA runtime on device 0.
#[cfg(feature = "cuda")]
pub fn init_cuda_runtime() -> Result<RuntimeContext<cubecl_cuda::CudaRuntime>> {
    use cubecl_cuda::CudaDevice;

    let device = CudaDevice::new(0);
    Ok(RuntimeContext::new(device, gpu_device_info("CUDA device 0")))
}

/// Initialize a WGPU runtime on the best available adapter.
#[cfg(feature = "wgpu")]
pub fn init_wgpu_runtime() -> Result<RuntimeContext<cubecl_wgpu::WgpuRuntime>> {
    use cubecl_wgpu::WgpuDevice;

    let device = WgpuDevice::BestAvailable;
    Ok(RuntimeContext::new(device, gpu_device_info("WGPU best available")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_device_info_is_accelerator() {
        let info = gpu_device_info("test");
        assert!(!info.is_cpu());
        assert_eq!(info.max_work_group_size(), DEFAULT_GPU_WORK_GROUP_SIZE);
    }

    #[test]
    #[cfg(feature = "cuda")]
    fn test_cuda_roundtrip() {
        let Ok(runtime) = init_cuda_runtime() else {
            return;
        };
        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        let buffer = to_device(&data, &runtime).unwrap();
        let back: Vec<f32> = to_cpu(&buffer, &runtime).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    #[cfg(feature = "wgpu")]
    fn test_wgpu_roundtrip() {
        let Ok(runtime) = init_wgpu_runtime() else {
            return;
        };
        println!("Backend: {}", runtime.backend_name());
        let data = vec![10.0f32, 20.0, 30.0];
        let buffer = to_device(&data, &runtime).unwrap();
        let back: Vec<f32> = to_cpu(&buffer, &runtime).unwrap();
        assert_eq!(back, data);
        runtime.sync();
    }
}
