//! Device feature requirements of a case, and the final verdict of a run.

use crate::interface::ShaderInterface;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SupportError {
    #[error("{0}")]
    NotSupported(&'static str),
}

/// The capabilities of a device that decide whether a case can run on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFeatures {
    pub relaxed_block_layout: bool,
    pub storage_buffer_16bit_access: bool,
    pub storage_buffer_8bit_access: bool,
    pub scalar_block_layout: bool,
    pub buffer_device_address: bool,
    pub shader_storage_buffer_array_non_uniform_indexing: bool,
    pub runtime_descriptor_array: bool,
    pub max_per_stage_descriptor_storage_buffers: usize,
}

impl Default for DeviceFeatures {
    /// The minimum every Vulkan 1.0 implementation provides.
    fn default() -> Self {
        Self {
            relaxed_block_layout: false,
            storage_buffer_16bit_access: false,
            storage_buffer_8bit_access: false,
            scalar_block_layout: false,
            buffer_device_address: false,
            shader_storage_buffer_array_non_uniform_indexing: false,
            runtime_descriptor_array: false,
            max_per_stage_descriptor_storage_buffers: 4,
        }
    }
}

impl DeviceFeatures {
    /// A device supporting everything any case can ask for.
    pub fn all() -> Self {
        Self {
            relaxed_block_layout: true,
            storage_buffer_16bit_access: true,
            storage_buffer_8bit_access: true,
            scalar_block_layout: true,
            buffer_device_address: true,
            shader_storage_buffer_array_non_uniform_indexing: true,
            runtime_descriptor_array: true,
            max_per_stage_descriptor_storage_buffers: usize::MAX,
        }
    }
}

/// The features a case needs, as recorded in its metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportRequirements {
    pub relaxed_block_layout: bool,
    pub storage_buffer_16bit_access: bool,
    pub storage_buffer_8bit_access: bool,
    pub scalar_block_layout: bool,
    pub buffer_device_address: bool,
    pub descriptor_indexing: bool,
    /// One for the pass counter plus one per block instance.
    pub num_storage_buffers: usize,
}

impl SupportRequirements {
    pub fn of(interface: &ShaderInterface, use_physical_storage_buffer: bool) -> Self {
        Self {
            relaxed_block_layout: interface.uses_relaxed_layout(),
            storage_buffer_16bit_access: interface.uses_16bit_storage(),
            storage_buffer_8bit_access: interface.uses_8bit_storage(),
            scalar_block_layout: interface.uses_scalar_layout(),
            buffer_device_address: use_physical_storage_buffer,
            descriptor_indexing: interface.uses_descriptor_indexing(),
            num_storage_buffers: 1 + interface.num_block_instances(),
        }
    }

    pub fn check(&self, features: &DeviceFeatures) -> Result<(), SupportError> {
        let not_supported = |reason| Err(SupportError::NotSupported(reason));

        if self.relaxed_block_layout && !features.relaxed_block_layout {
            return not_supported("VK_KHR_relaxed_block_layout not supported");
        }
        if self.storage_buffer_16bit_access && !features.storage_buffer_16bit_access {
            return not_supported("storageBuffer16BitAccess not supported");
        }
        if self.storage_buffer_8bit_access && !features.storage_buffer_8bit_access {
            return not_supported("storageBuffer8BitAccess not supported");
        }
        if self.scalar_block_layout && !features.scalar_block_layout {
            return not_supported("scalarBlockLayout not supported");
        }
        if self.buffer_device_address && !features.buffer_device_address {
            return not_supported("Physical storage buffer pointers not supported");
        }
        if self.descriptor_indexing
            && !(features.shader_storage_buffer_array_non_uniform_indexing && features.runtime_descriptor_array)
        {
            return not_supported("Descriptor indexing over storage buffer not supported");
        }
        if self.num_storage_buffers > features.max_per_stage_descriptor_storage_buffers {
            return not_supported(
                "Descriptor set storage buffers count higher than the maximum supported by the driver",
            );
        }
        Ok(())
    }
}

/// Fails with the first missing feature `interface` needs, before any layout work.
pub fn check_support(
    interface: &ShaderInterface,
    use_physical_storage_buffer: bool,
    features: &DeviceFeatures,
) -> Result<(), SupportError> {
    SupportRequirements::of(interface, use_physical_storage_buffer).check(features)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum TestStatus {
    Pass(String),
    Fail(String),
    NotSupported(String),
}

impl TestStatus {
    /// Verdict of a run from whether the pass counter read 1 and whether the
    /// buffers matched the expected data.
    pub fn evaluate(counter_ok: bool, compare_ok: bool) -> Self {
        match (counter_ok, compare_ok) {
            (true, true) => TestStatus::Pass("Result comparison and counter values are OK".into()),
            (true, false) => TestStatus::Fail("Result comparison failed".into()),
            (false, true) => TestStatus::Fail("Counter value incorrect".into()),
            (false, false) => TestStatus::Fail("Result comparison and counter values are incorrect".into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, TestStatus::Pass(_))
    }

    pub fn message(&self) -> &str {
        match self {
            TestStatus::Pass(message) | TestStatus::Fail(message) | TestStatus::NotSupported(message) => message,
        }
    }
}

impl From<SupportError> for TestStatus {
    fn from(err: SupportError) -> Self {
        TestStatus::NotSupported(err.to_string())
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            TestStatus::Pass(_) => "Pass",
            TestStatus::Fail(_) => "Fail",
            TestStatus::NotSupported(_) => "NotSupported",
        };
        write!(f, "{kind} ({})", self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::{DataType, ScalarType};
    use crate::interface::{AccessFlags, BufferVar, LayoutFlags};
    use crate::var_type::VarType;

    fn interface(flags: LayoutFlags, ty: DataType, instances: usize) -> ShaderInterface {
        let mut interface = ShaderInterface::new();
        interface
            .alloc_block("Block")
            .set_instance_name("block")
            .set_array_size(instances)
            .set_flags(flags)
            .add_member(BufferVar::new("v", VarType::plain(ty), AccessFlags::READ));
        interface
    }

    #[test]
    fn missing_features_are_reported_in_order() {
        let relaxed_16bit = interface(
            LayoutFlags::RELAXED | LayoutFlags::STORAGE_16BIT,
            DataType::Scalar(ScalarType::Uint16),
            0,
        );
        assert_eq!(
            check_support(&relaxed_16bit, false, &DeviceFeatures::default()),
            Err(SupportError::NotSupported("VK_KHR_relaxed_block_layout not supported"))
        );

        let features = DeviceFeatures {
            relaxed_block_layout: true,
            ..DeviceFeatures::default()
        };
        assert_eq!(
            check_support(&relaxed_16bit, false, &features).unwrap_err().to_string(),
            "storageBuffer16BitAccess not supported"
        );
        assert!(check_support(&relaxed_16bit, false, &DeviceFeatures::all()).is_ok());
    }

    #[test]
    fn storage_buffer_count_includes_counter() {
        let features = DeviceFeatures::default();
        assert!(check_support(&interface(LayoutFlags::STD430, DataType::UINT, 3), false, &features).is_ok());
        assert_eq!(
            check_support(&interface(LayoutFlags::STD430, DataType::UINT, 4), false, &features),
            Err(SupportError::NotSupported(
                "Descriptor set storage buffers count higher than the maximum supported by the driver"
            ))
        );
    }

    #[test]
    fn physical_storage_buffers_need_device_address() {
        let interface = interface(LayoutFlags::STD140, DataType::FLOAT, 0);
        assert_eq!(
            TestStatus::from(check_support(&interface, true, &DeviceFeatures::default()).unwrap_err()),
            TestStatus::NotSupported("Physical storage buffer pointers not supported".into())
        );
    }

    #[test]
    fn verdicts() {
        assert!(TestStatus::evaluate(true, true).is_pass());
        assert_eq!(TestStatus::evaluate(true, false).message(), "Result comparison failed");
        assert_eq!(TestStatus::evaluate(false, true).message(), "Counter value incorrect");
        assert_eq!(
            TestStatus::evaluate(false, false).to_string(),
            "Fail (Result comparison and counter values are incorrect)"
        );
    }
}
