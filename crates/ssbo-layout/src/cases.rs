//! Test cases: an interface plus how it is exercised, and the canonical
//! handwritten interfaces.

use crate::compare::{CompareReport, compare_data};
use crate::data_type::{DataType, Precision, ScalarType};
use crate::interface::{AccessFlags, BufferBlock, BufferVar, LayoutFlags, ShaderInterface};
use crate::layout::{BufferLayout, compute_reference_layout};
use crate::shader_gen::{MatrixLoad, MatrixStore, generate_compute_shader};
use crate::storage::{BlockLocation, BufferMode, RefDataStorage, block_locations, compute_buffer_sizes};
use crate::support::{DeviceFeatures, SupportError, SupportRequirements, TestStatus};
use crate::values::{INITIAL_DATA_SALT, WRITE_DATA_SALT, copy_non_written_data, generate_values, seed_for};
use crate::var_type::VarType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which non-standard member offsets the shader compiler must accept.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetRules {
    #[default]
    Standard,
    Relaxed,
    Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsboCase {
    pub name: String,
    pub interface: ShaderInterface,
    pub buffer_mode: BufferMode,
    pub matrix_load: MatrixLoad,
    pub matrix_store: MatrixStore,
    pub use_physical_storage_buffer: bool,
}

impl SsboCase {
    pub fn new(name: impl Into<String>, interface: ShaderInterface, buffer_mode: BufferMode) -> Self {
        Self {
            name: name.into(),
            interface,
            buffer_mode,
            matrix_load: MatrixLoad::default(),
            matrix_store: MatrixStore::default(),
            use_physical_storage_buffer: false,
        }
    }

    pub fn requirements(&self) -> SupportRequirements {
        SupportRequirements::of(&self.interface, self.use_physical_storage_buffer)
    }

    pub fn check_support(&self, features: &DeviceFeatures) -> Result<(), SupportError> {
        self.requirements().check(features)
    }

    pub fn offset_rules(&self) -> OffsetRules {
        if self.interface.uses_scalar_layout() {
            OffsetRules::Scalar
        } else if self.interface.uses_relaxed_layout() {
            OffsetRules::Relaxed
        } else {
            OffsetRules::Standard
        }
    }

    /// Computes the layout, both data sets and the shader.
    ///
    /// The shader checks the buffers against the initial data and overwrites
    /// them with the write data. Members it never writes keep their initial
    /// values, so those are copied over to form the expected data.
    pub fn prepare(mut self) -> PreparedCase {
        let layout = compute_reference_layout(&mut self.interface);
        let sizes = compute_buffer_sizes(&self.interface, &layout);

        let mut initial_data = RefDataStorage::with_sizes(&sizes);
        let mut expected_data = RefDataStorage::with_sizes(&sizes);
        generate_values(
            &layout,
            &mut initial_data.block_ptrs_mut(&layout),
            seed_for(&self.name, INITIAL_DATA_SALT),
        );
        generate_values(
            &layout,
            &mut expected_data.block_ptrs_mut(&layout),
            seed_for(&self.name, WRITE_DATA_SALT),
        );
        copy_non_written_data(
            &self.interface,
            &layout,
            &initial_data.block_ptrs(&layout),
            &mut expected_data.block_ptrs_mut(&layout),
        );

        let shader_source = generate_compute_shader(
            &self.interface,
            &layout,
            &initial_data.block_ptrs(&layout),
            &expected_data.block_ptrs(&layout),
            self.matrix_load,
            self.matrix_store,
            self.use_physical_storage_buffer,
        );

        info!(
            name = %self.name,
            blocks = layout.blocks.len(),
            vars = layout.buffer_vars.len(),
            "prepared case"
        );
        PreparedCase {
            requirements: self.requirements(),
            offset_rules: self.offset_rules(),
            case: self,
            layout,
            sizes,
            initial_data,
            expected_data,
            shader_source,
        }
    }
}

/// Everything the device-side harness needs to run a case and judge the result.
#[derive(Clone, Debug)]
pub struct PreparedCase {
    pub case: SsboCase,
    pub layout: BufferLayout,
    /// Size of every block instance, in the order of `layout.blocks`.
    pub sizes: Vec<usize>,
    pub initial_data: RefDataStorage,
    pub expected_data: RefDataStorage,
    pub shader_source: String,
    pub requirements: SupportRequirements,
    pub offset_rules: OffsetRules,
}

impl PreparedCase {
    pub fn block_locations(&self, binding_alignment: usize) -> Vec<BlockLocation> {
        block_locations(&self.sizes, self.case.buffer_mode, binding_alignment)
    }

    pub fn compare_result(&self, result: &RefDataStorage) -> CompareReport {
        compare_data(
            &self.layout,
            &self.expected_data.block_ptrs(&self.layout),
            &self.layout,
            &result.block_ptrs(&self.layout),
        )
    }

    /// Judges a run from the final pass counter and buffer contents.
    pub fn evaluate(&self, counter: u32, result: &RefDataStorage) -> (TestStatus, CompareReport) {
        let report = self.compare_result(result);
        (TestStatus::evaluate(counter == 1, report.is_ok()), report)
    }
}

/// Settings shared by every handwritten case.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseOptions {
    pub layout: LayoutFlags,
    pub buffer_mode: BufferMode,
    pub matrix_load: MatrixLoad,
    pub matrix_store: MatrixStore,
    pub use_physical_storage_buffer: bool,
}

impl CaseOptions {
    fn build(&self, name: String, interface: ShaderInterface) -> SsboCase {
        SsboCase {
            name,
            interface,
            buffer_mode: self.buffer_mode,
            matrix_load: self.matrix_load,
            matrix_store: self.matrix_store,
            use_physical_storage_buffer: self.use_physical_storage_buffer,
        }
    }

    fn names_instances(&self, num_instances: usize) -> bool {
        self.use_physical_storage_buffer || num_instances > 0
    }
}

fn read_write(readonly: bool) -> AccessFlags {
    if readonly {
        AccessFlags::READ
    } else {
        AccessFlags::READ | AccessFlags::WRITE
    }
}

/// Storage capability flags the innermost basic type of `ty` needs.
fn storage_flags(ty: &VarType) -> LayoutFlags {
    match ty.innermost_basic_type() {
        Some(data_type) if data_type.is_16bit() => LayoutFlags::STORAGE_16BIT,
        Some(data_type) if data_type.is_8bit() => LayoutFlags::STORAGE_8BIT,
        _ => LayoutFlags::empty(),
    }
}

/// Gives every instance of `block` a trailing array length drawn from `seed`.
fn set_unsized_array_sizes(block: &mut BufferBlock, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for instance in 0..block.num_instances() {
        block.set_last_unsized_array_size(instance, rng.random_range(1..=5));
    }
}

/// Instance-named, possibly arrayed, single block case.
fn single_block<'a>(
    interface: &'a mut ShaderInterface,
    options: &CaseOptions,
    num_instances: usize,
    members: Vec<BufferVar>,
) -> &'a mut BufferBlock {
    let names_instances = options.names_instances(num_instances);
    let block = interface.alloc_block("Block");
    for member in members {
        block.add_member(member);
    }
    block.set_flags(options.layout);
    if names_instances {
        block.set_instance_name("block").set_array_size(num_instances);
    }
    block
}

/// One block holding `var` of type `ty`.
///
/// Under scalar layout, non-scalar types get a scalar member in front of them so
/// that `var` ends up aligned only to its component size.
pub fn basic_type(name: impl Into<String>, options: &CaseOptions, ty: VarType, num_instances: usize, readonly: bool) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let access = read_write(readonly);
    let flags = options.layout | storage_flags(&ty);

    let block = interface.alloc_block("Block");
    let is_scalar = ty.basic_type().is_some_and(DataType::is_scalar);
    if flags.contains(LayoutFlags::SCALAR) && !is_scalar {
        if let Some(data_type) = ty.innermost_basic_type() {
            let padding = DataType::Scalar(data_type.scalar_type());
            block.add_member(BufferVar::new("padding", VarType::plain(padding), access));
        }
    }
    block.add_member(BufferVar::new("var", ty, access)).set_flags(flags);
    if options.names_instances(num_instances) {
        block.set_array_size(num_instances).set_instance_name("block");
    }

    let options = CaseOptions {
        buffer_mode: BufferMode::PerBlock,
        ..*options
    };
    options.build(name.into(), interface)
}

/// One block holding a runtime-sized array of `element` with `array_size` elements.
pub fn basic_unsized_array(
    name: impl Into<String>,
    options: &CaseOptions,
    element: VarType,
    array_size: usize,
    readonly: bool,
) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let flags = options.layout | storage_flags(&element);

    let block = interface.alloc_block("Block");
    block
        .add_member(BufferVar::new("var", VarType::unsized_array(element), read_write(readonly)))
        .set_flags(flags)
        .set_last_unsized_array_size(0, array_size);
    if options.use_physical_storage_buffer {
        block.set_instance_name("block");
    }

    let options = CaseOptions {
        buffer_mode: BufferMode::PerBlock,
        ..*options
    };
    options.build(name.into(), interface)
}

/// `struct S { ivec3 a; mat3 b[4]; vec4 c; }`.
fn declare_s_with_mat3_array(interface: &mut ShaderInterface) -> VarType {
    let s = interface.alloc_struct("S");
    interface
        .struct_type_mut(s)
        .add_member("a", VarType::basic(DataType::vec(ScalarType::Int, 3), Precision::Highp))
        .add_member(
            "b",
            VarType::array(VarType::basic(DataType::mat(3, 3), Precision::Mediump), 4),
        )
        .add_member("c", VarType::basic(DataType::float_vec(4), Precision::Highp));
    VarType::structure(s)
}

/// `struct S { ivec3 a; ivec2 b[4]; vec4 c; }`.
fn declare_s_with_ivec2_array(interface: &mut ShaderInterface) -> VarType {
    let s = interface.alloc_struct("S");
    let ivec = |n| DataType::vec(ScalarType::Int, n);
    interface
        .struct_type_mut(s)
        .add_member("a", VarType::basic(ivec(3), Precision::Highp))
        .add_member("b", VarType::array(VarType::basic(ivec(2), Precision::Mediump), 4))
        .add_member("c", VarType::basic(DataType::float_vec(4), Precision::Highp));
    VarType::structure(s)
}

pub fn single_struct(name: impl Into<String>, options: &CaseOptions, num_instances: usize, readonly: bool) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = declare_s_with_mat3_array(&mut interface);
    single_block(
        &mut interface,
        options,
        num_instances,
        vec![BufferVar::new("s", s, read_write(readonly))],
    );
    options.build(name.into(), interface)
}

pub fn single_struct_array(name: impl Into<String>, options: &CaseOptions, num_instances: usize) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = declare_s_with_mat3_array(&mut interface);
    single_block(
        &mut interface,
        options,
        num_instances,
        vec![
            BufferVar::new("u", VarType::basic(DataType::UINT, Precision::Lowp), AccessFlags::empty()),
            BufferVar::new("s", VarType::array(s, 3), AccessFlags::READ | AccessFlags::WRITE),
            BufferVar::new(
                "v",
                VarType::basic(DataType::float_vec(4), Precision::Mediump),
                AccessFlags::WRITE,
            ),
        ],
    );
    options.build(name.into(), interface)
}

pub fn single_nested_struct(name: impl Into<String>, options: &CaseOptions, num_instances: usize) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = declare_s_with_mat3_array(&mut interface);
    let t = interface.alloc_struct("T");
    interface
        .struct_type_mut(t)
        .add_member("a", VarType::basic(DataType::mat(3, 3), Precision::Mediump))
        .add_member("b", s.clone());

    single_block(
        &mut interface,
        options,
        num_instances,
        vec![
            BufferVar::new("s", s, AccessFlags::READ),
            BufferVar::new("v", VarType::basic(DataType::float_vec(2), Precision::Lowp), AccessFlags::empty()),
            BufferVar::new("t", VarType::structure(t), AccessFlags::READ | AccessFlags::WRITE),
            BufferVar::new("u", VarType::basic(DataType::UINT, Precision::Highp), AccessFlags::WRITE),
        ],
    );
    options.build(name.into(), interface)
}

pub fn single_nested_struct_array(name: impl Into<String>, options: &CaseOptions, num_instances: usize) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = declare_s_with_ivec2_array(&mut interface);
    let t = interface.alloc_struct("T");
    interface
        .struct_type_mut(t)
        .add_member("a", VarType::basic(DataType::mat(3, 3), Precision::Mediump))
        .add_member("b", VarType::array(s.clone(), 3));

    single_block(
        &mut interface,
        options,
        num_instances,
        vec![
            BufferVar::new("s", s, AccessFlags::WRITE),
            BufferVar::new("v", VarType::basic(DataType::float_vec(2), Precision::Lowp), AccessFlags::empty()),
            BufferVar::new("t", VarType::array(VarType::structure(t), 2), AccessFlags::READ),
            BufferVar::new(
                "u",
                VarType::basic(DataType::UINT, Precision::Highp),
                AccessFlags::READ | AccessFlags::WRITE,
            ),
        ],
    );
    options.build(name.into(), interface)
}

pub fn unsized_struct_array(name: impl Into<String>, options: &CaseOptions, num_instances: usize) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = interface.alloc_struct("S");
    interface
        .struct_type_mut(s)
        .add_member(
            "a",
            VarType::basic(DataType::vec(ScalarType::Uint, 2), Precision::Highp),
        )
        .add_member(
            "b",
            VarType::array(VarType::basic(DataType::mat(2, 4), Precision::Mediump), 4),
        )
        .add_member("c", VarType::basic(DataType::float_vec(3), Precision::Highp));

    let block = single_block(
        &mut interface,
        options,
        num_instances,
        vec![
            BufferVar::new("u", VarType::basic(DataType::float_vec(2), Precision::Lowp), AccessFlags::empty()),
            BufferVar::new("v", VarType::basic(DataType::UINT, Precision::Mediump), AccessFlags::WRITE),
            BufferVar::new(
                "s",
                VarType::unsized_array(VarType::structure(s)),
                AccessFlags::READ | AccessFlags::WRITE,
            ),
        ],
    );
    set_unsized_array_sizes(block, 246);
    options.build(name.into(), interface)
}

pub fn two_level_unsized_struct_array(name: impl Into<String>, options: &CaseOptions, num_instances: usize) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = interface.alloc_struct("S");
    interface
        .struct_type_mut(s)
        .add_member(
            "a",
            VarType::basic(DataType::vec(ScalarType::Int, 3), Precision::Highp),
        )
        .add_member("c", VarType::basic(DataType::float_vec(4), Precision::Highp));

    let block = single_block(
        &mut interface,
        options,
        num_instances,
        vec![
            BufferVar::new("u", VarType::basic(DataType::UINT, Precision::Lowp), AccessFlags::empty()),
            BufferVar::new(
                "v",
                VarType::basic(DataType::float_vec(4), Precision::Mediump),
                AccessFlags::WRITE,
            ),
            BufferVar::new(
                "s",
                VarType::unsized_array(VarType::array(VarType::structure(s), 2)),
                AccessFlags::READ | AccessFlags::WRITE,
            ),
        ],
    );
    set_unsized_array_sizes(block, 2344);
    options.build(name.into(), interface)
}

pub fn unsized_nested_struct_array(name: impl Into<String>, options: &CaseOptions, num_instances: usize) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = interface.alloc_struct("S");
    interface
        .struct_type_mut(s)
        .add_member(
            "a",
            VarType::basic(DataType::vec(ScalarType::Uint, 3), Precision::Highp),
        )
        .add_member(
            "b",
            VarType::array(VarType::basic(DataType::float_vec(2), Precision::Mediump), 4),
        )
        .add_member("c", VarType::basic(DataType::float_vec(4), Precision::Highp));
    let t = interface.alloc_struct("T");
    interface
        .struct_type_mut(t)
        .add_member("a", VarType::basic(DataType::mat(4, 3), Precision::Mediump))
        .add_member("b", VarType::array(VarType::structure(s), 3))
        .add_member("c", VarType::basic(DataType::INT, Precision::Highp));

    let block = single_block(
        &mut interface,
        options,
        num_instances,
        vec![
            BufferVar::new("s", VarType::structure(s), AccessFlags::WRITE),
            BufferVar::new("v", VarType::basic(DataType::float_vec(2), Precision::Lowp), AccessFlags::empty()),
            BufferVar::new(
                "u",
                VarType::basic(DataType::UINT, Precision::Highp),
                AccessFlags::READ | AccessFlags::WRITE,
            ),
            BufferVar::new("t", VarType::unsized_array(VarType::structure(t)), AccessFlags::READ),
        ],
    );
    set_unsized_array_sizes(block, 7921);
    options.build(name.into(), interface)
}

/// `BlockA` laid out with the option flags and `BlockB` with `flags_b`.
pub fn multi_basic_types(
    name: impl Into<String>,
    options: &CaseOptions,
    flags_b: LayoutFlags,
    num_instances: usize,
) -> SsboCase {
    let mut interface = ShaderInterface::new();
    interface
        .alloc_block("BlockA")
        .add_member(BufferVar::new(
            "a",
            VarType::basic(DataType::FLOAT, Precision::Highp),
            AccessFlags::READ | AccessFlags::WRITE,
        ))
        .add_member(BufferVar::new(
            "b",
            VarType::basic(DataType::vec(ScalarType::Uint, 3), Precision::Lowp),
            AccessFlags::empty(),
        ))
        .add_member(BufferVar::new(
            "c",
            VarType::basic(DataType::mat(2, 2), Precision::Mediump),
            AccessFlags::READ,
        ))
        .set_instance_name("blockA")
        .set_flags(options.layout);
    interface
        .alloc_block("BlockB")
        .add_member(BufferVar::new(
            "a",
            VarType::basic(DataType::mat(3, 3), Precision::Mediump),
            AccessFlags::WRITE,
        ))
        .add_member(BufferVar::new(
            "b",
            VarType::basic(DataType::vec(ScalarType::Int, 2), Precision::Lowp),
            AccessFlags::READ,
        ))
        .add_member(BufferVar::new(
            "c",
            VarType::basic(DataType::float_vec(4), Precision::Highp),
            AccessFlags::empty(),
        ))
        .add_member(BufferVar::new(
            "d",
            VarType::plain(DataType::BOOL),
            AccessFlags::READ | AccessFlags::WRITE,
        ))
        .set_instance_name("blockB")
        .set_flags(flags_b);

    set_instance_array_sizes(&mut interface, num_instances);
    options.build(name.into(), interface)
}

pub fn multi_nested_struct(
    name: impl Into<String>,
    options: &CaseOptions,
    flags_b: LayoutFlags,
    num_instances: usize,
) -> SsboCase {
    let mut interface = ShaderInterface::new();
    let s = interface.alloc_struct("S");
    interface
        .struct_type_mut(s)
        .add_member("a", VarType::basic(DataType::mat(3, 3), Precision::Lowp))
        .add_member(
            "b",
            VarType::array(
                VarType::basic(DataType::vec(ScalarType::Int, 2), Precision::Mediump),
                4,
            ),
        )
        .add_member("c", VarType::basic(DataType::float_vec(4), Precision::Highp));
    let t = interface.alloc_struct("T");
    interface
        .struct_type_mut(t)
        .add_member("a", VarType::basic(DataType::UINT, Precision::Mediump))
        .add_member("b", VarType::structure(s))
        .add_member(
            "c",
            VarType::plain(DataType::vec(ScalarType::Bool, 4)),
        );

    interface
        .alloc_block("BlockA")
        .add_member(BufferVar::new(
            "a",
            VarType::basic(DataType::FLOAT, Precision::Highp),
            AccessFlags::READ | AccessFlags::WRITE,
        ))
        .add_member(BufferVar::new("b", VarType::structure(s), AccessFlags::WRITE))
        .add_member(BufferVar::new(
            "c",
            VarType::basic(DataType::vec(ScalarType::Uint, 3), Precision::Lowp),
            AccessFlags::empty(),
        ))
        .set_instance_name("blockA")
        .set_flags(options.layout);
    interface
        .alloc_block("BlockB")
        .add_member(BufferVar::new(
            "a",
            VarType::basic(DataType::mat(2, 2), Precision::Mediump),
            AccessFlags::WRITE,
        ))
        .add_member(BufferVar::new(
            "b",
            VarType::structure(t),
            AccessFlags::READ | AccessFlags::WRITE,
        ))
        .add_member(BufferVar::new(
            "c",
            VarType::plain(DataType::vec(ScalarType::Bool, 4)),
            AccessFlags::empty(),
        ))
        .add_member(BufferVar::new(
            "d",
            VarType::plain(DataType::BOOL),
            AccessFlags::READ | AccessFlags::WRITE,
        ))
        .set_instance_name("blockB")
        .set_flags(flags_b);

    set_instance_array_sizes(&mut interface, num_instances);
    options.build(name.into(), interface)
}

fn set_instance_array_sizes(interface: &mut ShaderInterface, num_instances: usize) {
    if num_instances > 0 {
        for index in 0..interface.blocks().len() {
            interface.block_mut(index).set_array_size(num_instances);
        }
    }
}

/// A handwritten case and its parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preset {
    BasicType {
        ty: VarType,
        #[serde(default)]
        num_instances: usize,
        #[serde(default)]
        readonly: bool,
    },
    BasicUnsizedArray {
        element: VarType,
        array_size: usize,
        #[serde(default)]
        readonly: bool,
    },
    SingleStruct {
        #[serde(default)]
        num_instances: usize,
        #[serde(default)]
        readonly: bool,
    },
    SingleStructArray {
        #[serde(default)]
        num_instances: usize,
    },
    SingleNestedStruct {
        #[serde(default)]
        num_instances: usize,
    },
    SingleNestedStructArray {
        #[serde(default)]
        num_instances: usize,
    },
    UnsizedStructArray {
        #[serde(default)]
        num_instances: usize,
    },
    TwoLevelUnsizedStructArray {
        #[serde(default)]
        num_instances: usize,
    },
    UnsizedNestedStructArray {
        #[serde(default)]
        num_instances: usize,
    },
    MultiBasicTypes {
        flags_b: LayoutFlags,
        #[serde(default)]
        num_instances: usize,
    },
    MultiNestedStruct {
        flags_b: LayoutFlags,
        #[serde(default)]
        num_instances: usize,
    },
}

impl Preset {
    pub fn build(&self, name: impl Into<String>, options: &CaseOptions) -> SsboCase {
        match self {
            Preset::BasicType {
                ty,
                num_instances,
                readonly,
            } => basic_type(name, options, ty.clone(), *num_instances, *readonly),
            Preset::BasicUnsizedArray {
                element,
                array_size,
                readonly,
            } => basic_unsized_array(name, options, element.clone(), *array_size, *readonly),
            Preset::SingleStruct {
                num_instances,
                readonly,
            } => single_struct(name, options, *num_instances, *readonly),
            Preset::SingleStructArray { num_instances } => single_struct_array(name, options, *num_instances),
            Preset::SingleNestedStruct { num_instances } => single_nested_struct(name, options, *num_instances),
            Preset::SingleNestedStructArray { num_instances } => {
                single_nested_struct_array(name, options, *num_instances)
            }
            Preset::UnsizedStructArray { num_instances } => unsized_struct_array(name, options, *num_instances),
            Preset::TwoLevelUnsizedStructArray { num_instances } => {
                two_level_unsized_struct_array(name, options, *num_instances)
            }
            Preset::UnsizedNestedStructArray { num_instances } => {
                unsized_nested_struct_array(name, options, *num_instances)
            }
            Preset::MultiBasicTypes {
                flags_b,
                num_instances,
            } => multi_basic_types(name, options, *flags_b, *num_instances),
            Preset::MultiNestedStruct {
                flags_b,
                num_instances,
            } => multi_nested_struct(name, options, *flags_b, *num_instances),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::read;

    fn std430() -> CaseOptions {
        CaseOptions {
            layout: LayoutFlags::STD430,
            ..CaseOptions::default()
        }
    }

    #[test]
    fn scalar_layout_adds_padding_member() {
        let options = CaseOptions {
            layout: LayoutFlags::SCALAR,
            ..CaseOptions::default()
        };
        let case = basic_type("vec3", &options, VarType::plain(DataType::float_vec(3)), 0, false);
        let block = case.interface.block(0);
        assert_eq!(block.members().len(), 2);
        assert_eq!(block.members()[0].name(), "padding");
        assert_eq!(block.members()[0].ty(), &VarType::plain(DataType::FLOAT));

        let prepared = case.prepare();
        let var = prepared.layout.variable_index("var").unwrap();
        assert_eq!(prepared.layout.buffer_vars[var].offset, 4);
        assert_eq!(prepared.offset_rules, OffsetRules::Scalar);
    }

    #[test]
    fn small_types_request_storage_flags() {
        let case = basic_type(
            "u8vec2",
            &std430(),
            VarType::plain(DataType::vec(ScalarType::Uint8, 2)),
            0,
            false,
        );
        assert!(case.requirements().storage_buffer_8bit_access);
        assert!(!case.requirements().storage_buffer_16bit_access);
    }

    #[test]
    fn unsized_lengths_come_from_fixed_seeds() {
        let a = unsized_struct_array("a", &std430(), 3);
        let b = unsized_struct_array("b", &std430(), 3);
        let block = a.interface.block(0);
        for instance in 0..3 {
            let len = block.last_unsized_array_size(instance);
            assert!((1..=5).contains(&len));
            assert_eq!(len, b.interface.block(0).last_unsized_array_size(instance));
        }
    }

    #[test]
    fn untouched_members_keep_initial_values() {
        let prepared = single_struct_array("single_struct_array", &std430(), 0).prepare();
        let u = &prepared.layout.buffer_vars[prepared.layout.variable_index("u").unwrap()];
        let initial: u32 = read(prepared.initial_data.block_bytes(0), u.offset);
        let expected: u32 = read(prepared.expected_data.block_bytes(0), u.offset);
        assert_eq!(initial, expected);
    }

    #[test]
    fn expected_data_passes_its_own_check() {
        let prepared = multi_nested_struct("multi_nested_struct", &std430(), LayoutFlags::STD140, 2).prepare();
        let (status, report) = prepared.evaluate(1, &prepared.expected_data.clone());
        assert!(status.is_pass(), "{report}");

        let (status, _) = prepared.evaluate(0, &prepared.expected_data.clone());
        assert_eq!(status.message(), "Counter value incorrect");
    }

    #[test]
    fn presets_deserialize_from_tagged_json() {
        let preset: Preset = serde_json::from_str(r#"{ "kind": "single_struct", "num_instances": 2 }"#).unwrap();
        assert_eq!(
            preset,
            Preset::SingleStruct {
                num_instances: 2,
                readonly: false
            }
        );
    }
}
