//! Device descriptions and the group-sizing heuristic.

use std::fmt;

/// Default per-group local memory reported for the host device (32 KiB).
pub const HOST_LOCAL_MEM_SIZE: usize = 32 * 1024;

/// Default per-group local memory reported for accelerators (48 KiB).
pub const ACCELERATOR_LOCAL_MEM_SIZE: usize = 48 * 1024;

/// Coarse device category used to pick group sizing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// General-purpose CPU.
    Cpu,
    /// GPU or other accelerator.
    Accelerator,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Cpu => write!(f, "cpu"),
            DeviceClass::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Capabilities of the device a queue is bound to.
///
/// Only the class and the three sizing capabilities drive the reduction; the
/// descriptive fields exist for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    name: String,
    vendor: String,
    platform: String,
    platform_vendor: String,
    version: String,
    profile: String,
    extensions: Vec<String>,
    class: DeviceClass,
    max_compute_units: usize,
    native_vector_width_double: usize,
    max_work_group_size: usize,
    local_mem_size: usize,
}

impl DeviceInfo {
    /// Describe the CPU this process runs on.
    ///
    /// The compute unit count is the available parallelism, and the native
    /// double vector width follows the widest SIMD extension the crate was
    /// compiled for.
    pub fn host() -> Self {
        let compute_units = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let (vector_width, extensions) = if cfg!(target_feature = "avx512f") {
            (8, vec!["avx512f".to_string(), "fp64".to_string()])
        } else if cfg!(target_feature = "avx") {
            (4, vec!["avx".to_string(), "fp64".to_string()])
        } else {
            (2, vec!["fp64".to_string()])
        };

        Self {
            name: format!("{} host ({} threads)", std::env::consts::ARCH, compute_units),
            vendor: "host".to_string(),
            platform: "parallel-reduce host".to_string(),
            platform_vendor: "parallel-reduce".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            profile: "FULL_PROFILE".to_string(),
            extensions,
            class: DeviceClass::Cpu,
            max_compute_units: compute_units,
            native_vector_width_double: vector_width,
            max_work_group_size: 8192,
            local_mem_size: HOST_LOCAL_MEM_SIZE,
        }
    }

    /// Describe an accelerator with the given capabilities.
    pub fn accelerator(
        name: impl Into<String>,
        max_compute_units: usize,
        max_work_group_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            vendor: "unknown".to_string(),
            platform: "unknown".to_string(),
            platform_vendor: "unknown".to_string(),
            version: "unknown".to_string(),
            profile: "FULL_PROFILE".to_string(),
            extensions: Vec::new(),
            class: DeviceClass::Accelerator,
            max_compute_units,
            native_vector_width_double: 1,
            max_work_group_size,
            local_mem_size: ACCELERATOR_LOCAL_MEM_SIZE,
        }
    }

    /// Override the device class.
    pub fn with_class(mut self, class: DeviceClass) -> Self {
        self.class = class;
        self
    }

    /// Override the compute unit count.
    pub fn with_compute_units(mut self, max_compute_units: usize) -> Self {
        self.max_compute_units = max_compute_units;
        self
    }

    /// Override the native vector width for doubles.
    pub fn with_native_vector_width_double(mut self, width: usize) -> Self {
        self.native_vector_width_double = width;
        self
    }

    /// Override the maximum work-group size.
    pub fn with_max_work_group_size(mut self, size: usize) -> Self {
        self.max_work_group_size = size;
        self
    }

    /// Override the local memory available to one group, in bytes.
    pub fn with_local_mem_size(mut self, bytes: usize) -> Self {
        self.local_mem_size = bytes;
        self
    }

    /// Override the vendor string.
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device vendor.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Name of the platform exposing this device.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Vendor of the platform.
    pub fn platform_vendor(&self) -> &str {
        &self.platform_vendor
    }

    /// Platform version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Platform profile.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Extensions advertised by the device.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Device class.
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Whether this is a general-purpose CPU.
    pub fn is_cpu(&self) -> bool {
        self.class == DeviceClass::Cpu
    }

    /// Number of compute units.
    pub fn max_compute_units(&self) -> usize {
        self.max_compute_units
    }

    /// Preferred number of doubles per vector register.
    pub fn native_vector_width_double(&self) -> usize {
        self.native_vector_width_double
    }

    /// Largest group the device can launch.
    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    /// Local memory available to one group, in bytes.
    pub fn local_mem_size(&self) -> usize {
        self.local_mem_size
    }
}

/// Number of groups and workers per group for one reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSizing {
    /// Groups launched in the first phase.
    pub num_groups: usize,
    /// Workers per group in the first phase.
    pub group_size: usize,
}

impl GroupSizing {
    /// Derive the sizing for reducing `n` elements on `device`.
    ///
    /// CPUs get `compute_units` groups of twice the native double vector
    /// width; accelerators get four groups per compute unit at the maximum
    /// work-group size. The group count never exceeds `n`. Neither number is
    /// rounded to a power of two.
    pub fn for_device(device: &DeviceInfo, n: usize) -> Self {
        let (num_groups, group_size) = match device.class() {
            DeviceClass::Cpu => (
                device.max_compute_units(),
                device.native_vector_width_double() * 2,
            ),
            DeviceClass::Accelerator => (
                device.max_compute_units() * 4,
                device.max_work_group_size(),
            ),
        };

        let sizing = Self {
            num_groups: num_groups.min(n),
            group_size,
        };
        tracing::debug!(
            class = %device.class(),
            n,
            num_groups = sizing.num_groups,
            group_size = sizing.group_size,
            "group sizing"
        );
        sizing
    }

    /// Total number of workers in the first phase.
    pub fn global_size(&self) -> usize {
        self.num_groups * self.group_size
    }

    /// Length an output buffer needs so that every group's strided slot
    /// `group * group_size` is in bounds.
    pub fn partial_len(&self) -> usize {
        self.num_groups.saturating_sub(1) * self.group_size + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_device() {
        let device = DeviceInfo::host();
        assert!(device.is_cpu());
        assert!(device.max_compute_units() >= 1);
        assert!(device.native_vector_width_double() >= 2);
        assert!(!device.name().is_empty());
    }

    #[test]
    fn test_cpu_sizing() {
        let device = DeviceInfo::host()
            .with_compute_units(8)
            .with_native_vector_width_double(4);
        let sizing = GroupSizing::for_device(&device, 1 << 20);
        assert_eq!(sizing.num_groups, 8);
        assert_eq!(sizing.group_size, 8);
        assert_eq!(sizing.global_size(), 64);
    }

    #[test]
    fn test_accelerator_sizing() {
        let device = DeviceInfo::accelerator("sim", 20, 256);
        let sizing = GroupSizing::for_device(&device, 1 << 20);
        assert_eq!(sizing.num_groups, 80);
        assert_eq!(sizing.group_size, 256);
    }

    #[test]
    fn test_group_count_clamped_to_input() {
        let device = DeviceInfo::accelerator("sim", 20, 256);
        let sizing = GroupSizing::for_device(&device, 3);
        assert_eq!(sizing.num_groups, 3);
        assert_eq!(sizing.group_size, 256);

        let device = DeviceInfo::host().with_compute_units(16);
        assert_eq!(GroupSizing::for_device(&device, 5).num_groups, 5);
    }

    #[test]
    fn test_group_size_not_rounded() {
        let device = DeviceInfo::host()
            .with_compute_units(2)
            .with_native_vector_width_double(3);
        assert_eq!(GroupSizing::for_device(&device, 100).group_size, 6);

        let device = DeviceInfo::accelerator("odd", 1, 192);
        assert_eq!(GroupSizing::for_device(&device, 100).group_size, 192);
    }

    #[test]
    fn test_partial_len() {
        let sizing = GroupSizing {
            num_groups: 4,
            group_size: 8,
        };
        assert_eq!(sizing.partial_len(), 25);

        let sizing = GroupSizing {
            num_groups: 1,
            group_size: 8,
        };
        assert_eq!(sizing.partial_len(), 1);
    }
}
