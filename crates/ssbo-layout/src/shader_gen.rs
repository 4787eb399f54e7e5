//! GLSL compute shader that checks the initial buffer contents and writes new ones.
//!
//! The shader compares every readable leaf against a literal of its expected
//! value, bumps `ac_numPassed` once when every comparison held, and then
//! assigns a literal to every writable leaf.

use crate::access::{AccessStep, api_name, compute_offset, for_each_leaf, shader_name};
use crate::data_type::{DataType, ScalarType};
use crate::interface::{AccessFlags, BufferBlock, BufferVar, LayoutFlags, LayoutQualifiers, ShaderInterface};
use crate::layout::{BufferLayout, BufferVarLayoutEntry};
use crate::literal::{float_literal, imm_matrix_src, imm_scalar_vector_src, matrix_component_offset, read};
use crate::storage::BlockDataPtr;
use crate::var_type::{StructType, declare, declare_struct};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::debug;

/// Upper bound on emitted comparisons, to keep compile times of large interfaces reasonable.
pub const COMPARE_LIMIT: usize = 130;

const RESULT_VAR: &str = "allOk";

/// How a block member that is itself a matrix is read back for comparison.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum MatrixLoad {
    /// One `compare_matCxR` call on the whole matrix.
    #[default]
    FullMatrix,
    /// One `compare_float` per component, then one `compare_vecR` per column.
    Components,
}

/// How matrices are written.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum MatrixStore {
    /// One assignment of a `matCxR(...)` constructor.
    #[default]
    FullMatrix,
    /// One assignment per column, of a `vecR(...)` constructor.
    Columns,
}

/// Compare helpers `ty` needs, including its own.
pub fn compare_dependencies(ty: DataType, deps: &mut BTreeSet<DataType>) {
    match ty {
        DataType::Vector(ScalarType::Float | ScalarType::Float16, _) => {
            deps.insert(DataType::FLOAT);
        }
        DataType::Matrix { rows, .. } => {
            deps.insert(DataType::FLOAT);
            deps.insert(DataType::Vector(ScalarType::Float, rows));
        }
        DataType::Scalar(_) | DataType::Vector(..) => {}
    }
    deps.insert(ty);
}

/// Definition of `compare_<ty>`, taking both operands in the promoted type.
pub fn compare_func_for_type(ty: DataType) -> String {
    let promoted = ty.promote_type();
    let param_type = if ty.scalar_type() == ScalarType::Bool {
        promoted.to_string()
    } else {
        format!("highp {promoted}")
    };

    let body = match ty {
        DataType::Scalar(ScalarType::Float | ScalarType::Float16) => "abs(a - b) < 0.05".to_string(),
        DataType::Vector(ScalarType::Float | ScalarType::Float16, n) => ["x", "y", "z", "w"][..n.get()]
            .iter()
            .map(|c| format!("compare_float(a.{c}, b.{c})"))
            .collect::<Vec<_>>()
            .join("&&"),
        DataType::Matrix { columns, rows } => {
            let column_type = DataType::Vector(ScalarType::Float, rows);
            (0..columns.get())
                .map(|c| format!("compare_{column_type}(a[{c}], b[{c}])"))
                .collect::<Vec<_>>()
                .join("&&")
        }
        DataType::Scalar(_) | DataType::Vector(..) => "a == b".to_string(),
    };

    format!("bool compare_{ty} ({param_type} a, {param_type} b) {{ return {body}; }}\n")
}

fn generate_compare_funcs(src: &mut String, interface: &ShaderInterface) {
    let mut funcs = BTreeSet::new();
    for ty in interface.collect_unique_basic_types() {
        compare_dependencies(ty, &mut funcs);
    }
    for ty in funcs {
        src.push_str(&compare_func_for_type(ty));
    }
}

fn generate_var_declaration(src: &mut String, var: &BufferVar, structs: &[StructType]) {
    let member_flags = var.layout() & LayoutFlags::LAYOUT_MASK;
    if !member_flags.is_empty() {
        write!(src, "layout({}) ", LayoutQualifiers(member_flags)).unwrap();
    } else if let Some(offset) = var.offset() {
        write!(src, "layout(offset = {offset}) ").unwrap();
    }
    src.push_str(&declare(var.ty(), structs, var.name()));
}

/// Declaration of one block, bound at `binding` unless it is accessed through
/// a buffer reference.
pub fn generate_declaration(
    block: &BufferBlock,
    binding: usize,
    structs: &[StructType],
    use_physical_storage_buffer: bool,
) -> String {
    let mut src = String::from("layout(");
    let block_flags = block.flags() & LayoutFlags::LAYOUT_MASK;
    if !block_flags.is_empty() {
        write!(src, "{}, ", LayoutQualifiers(block_flags)).unwrap();
    }
    if use_physical_storage_buffer {
        src.push_str("buffer_reference");
    } else {
        write!(src, "binding = {binding}").unwrap();
    }
    src.push_str(") ");

    if !block.has_write_access() {
        src.push_str("readonly ");
    }
    write!(src, "buffer {}\n{{\n", block.name()).unwrap();

    for var in block.members() {
        src.push('\t');
        generate_var_declaration(&mut src, var, structs);
        src.push_str(";\n");
    }
    src.push('}');

    if !use_physical_storage_buffer {
        match block.instance_name() {
            Some(instance_name) => {
                write!(src, " {instance_name}").unwrap();
                if block.flags().contains(LayoutFlags::DESCRIPTOR_INDEXING) {
                    src.push_str("[]");
                } else if block.is_array() {
                    write!(src, "[{}]", block.array_size()).unwrap();
                }
            }
            None => assert!(!block.is_array(), "instance array {} has no instance name", block.name()),
        }
    }

    src.push_str(";\n");
    src
}

/// Everything a leaf statement needs to know about where its value lives.
struct Leaf<'a> {
    entry: &'a BufferVarLayoutEntry,
    data_type: DataType,
    shader_name: String,
    value: &'a [u8],
}

/// Calls `f` for every leaf of every member of every block instance whose
/// access includes `access`, in declaration order.
fn for_each_accessed_leaf<'a>(
    interface: &'a ShaderInterface,
    layout: &'a BufferLayout,
    block_ptrs: &[BlockDataPtr<'a>],
    access: AccessFlags,
    mut f: impl FnMut(&[AccessStep], Leaf<'a>),
) {
    let structs = interface.named_structs();

    for block in interface.blocks() {
        for instance in 0..block.num_instances() {
            let block_name = block.instance_api_name(instance);
            let block_index = layout
                .block_index(&block_name)
                .unwrap_or_else(|| panic!("block {block_name} missing from layout"));
            let block_ptr = block_ptrs[block_index];

            for var in block.members() {
                if !var.access().contains(access) {
                    continue;
                }

                let unsized_array_size = block.last_unsized_array_size(instance);
                for_each_leaf(structs, var.ty(), unsized_array_size, &mut |path, data_type| {
                    let name = api_name(block, var, structs, path);
                    let var_index = layout
                        .variable_index(&name)
                        .unwrap_or_else(|| panic!("{name} missing from layout"));
                    let entry = &layout.buffer_vars[var_index];
                    let leaf = Leaf {
                        entry,
                        data_type,
                        shader_name: shader_name(block, instance, var, structs, path),
                        value: &block_ptr.data[compute_offset(entry, path)..],
                    };
                    f(path, leaf);
                });
            }
        }
    }
}

fn generate_matrix_component_compares(src: &mut String, leaf: &Leaf<'_>) {
    let (Some(columns), Some(rows)) = (leaf.data_type.matrix_columns(), leaf.data_type.matrix_rows()) else {
        unreachable!()
    };
    let Leaf {
        entry, shader_name, value, ..
    } = leaf;
    let component = |col, row| {
        let offset = matrix_component_offset(entry.matrix_stride, entry.is_row_major, col, row);
        float_literal(read(value, offset))
    };

    for col in 0..columns {
        for row in 0..rows {
            writeln!(
                src,
                "\t{RESULT_VAR} = compare_float({shader_name}[{col}][{row}], {}) && {RESULT_VAR};",
                component(col, row)
            )
            .unwrap();
        }
    }

    for col in 0..columns {
        let values: Vec<String> = (0..rows).map(|row| component(col, row)).collect();
        writeln!(
            src,
            "\t{RESULT_VAR} = compare_vec{rows}({shader_name}[{col}], vec{rows}({})) && {RESULT_VAR};",
            values.join(", ")
        )
        .unwrap();
    }
}

/// Statements comparing every readable leaf against `block_ptrs`, at most
/// [`COMPARE_LIMIT`] leaves in total.
pub fn generate_compare_src(
    interface: &ShaderInterface,
    layout: &BufferLayout,
    block_ptrs: &[BlockDataPtr<'_>],
    matrix_load: MatrixLoad,
) -> String {
    let mut src = String::new();
    let mut remaining = COMPARE_LIMIT;

    for_each_accessed_leaf(interface, layout, block_ptrs, AccessFlags::READ, |path, leaf| {
        if remaining == 0 {
            return;
        }
        remaining -= 1;

        let ty = leaf.data_type;
        if ty.is_matrix() {
            // Only a member that is a bare matrix is loaded component-wise.
            if path.is_empty() && matrix_load == MatrixLoad::Components {
                generate_matrix_component_compares(&mut src, &leaf);
            } else {
                let imm = imm_matrix_src(ty, leaf.entry.matrix_stride, leaf.entry.is_row_major, None, leaf.value);
                writeln!(
                    src,
                    "\t{RESULT_VAR} = compare_{ty}({}, {imm}) && {RESULT_VAR};",
                    leaf.shader_name
                )
                .unwrap();
            }
        } else {
            let promoted = ty.promote_type();
            let cast = if promoted != ty {
                promoted.to_string()
            } else {
                String::new()
            };
            writeln!(
                src,
                "\t{RESULT_VAR} = compare_{ty}({cast}({}), {}) && {RESULT_VAR};",
                leaf.shader_name,
                imm_scalar_vector_src(ty, leaf.value)
            )
            .unwrap();
        }
    });

    if remaining == 0 {
        debug!(limit = COMPARE_LIMIT, "compare limit reached, remaining leaves are not checked");
    }
    src
}

/// Statements assigning the values in `block_ptrs` to every writable leaf.
pub fn generate_write_src(
    interface: &ShaderInterface,
    layout: &BufferLayout,
    block_ptrs: &[BlockDataPtr<'_>],
    matrix_store: MatrixStore,
) -> String {
    let mut src = String::new();

    for_each_accessed_leaf(interface, layout, block_ptrs, AccessFlags::WRITE, |_, leaf| {
        let ty = leaf.data_type;
        let entry = leaf.entry;
        let name = &leaf.shader_name;

        match (ty.matrix_columns(), matrix_store) {
            (Some(_), MatrixStore::FullMatrix) => {
                let imm = imm_matrix_src(ty, entry.matrix_stride, entry.is_row_major, None, leaf.value);
                writeln!(src, "\t{name} = ({imm});").unwrap();
            }
            (Some(columns), MatrixStore::Columns) => {
                for col in 0..columns {
                    let imm = imm_matrix_src(ty, entry.matrix_stride, entry.is_row_major, Some(col), leaf.value);
                    writeln!(src, "\t{name}[{col}] = ({imm});").unwrap();
                }
            }
            (None, _) => {
                let cast = if ty.promote_type() != ty {
                    ty.to_string()
                } else {
                    String::new()
                };
                writeln!(src, "\t{name} = {cast}({});", imm_scalar_vector_src(ty, leaf.value)).unwrap();
            }
        }
    });

    src
}

/// Full compute shader source.
///
/// `compare_ptrs` hold the values the buffers start with, `write_ptrs` the
/// values the shader stores.
pub fn generate_compute_shader(
    interface: &ShaderInterface,
    layout: &BufferLayout,
    compare_ptrs: &[BlockDataPtr<'_>],
    write_ptrs: &[BlockDataPtr<'_>],
    matrix_load: MatrixLoad,
    matrix_store: MatrixStore,
    use_physical_storage_buffer: bool,
) -> String {
    let structs = interface.named_structs();
    let mut src = String::new();

    if interface.uses_16bit_storage()
        || interface.uses_8bit_storage()
        || interface.uses_relaxed_layout()
        || interface.uses_scalar_layout()
        || interface.uses_descriptor_indexing()
    {
        src.push_str("#version 450\n");
    } else {
        src.push_str("#version 310 es\n");
    }

    src.push_str(
        "#extension GL_EXT_shader_16bit_storage : enable\n\
         #extension GL_EXT_shader_8bit_storage : enable\n\
         #extension GL_EXT_scalar_block_layout : enable\n\
         #extension GL_EXT_buffer_reference : enable\n\
         #extension GL_EXT_nonuniform_qualifier : enable\n\
         layout(local_size_x = 1) in;\n\
         \n",
    );

    src.push_str("layout(std140, binding = 0) buffer AcBlock { highp uint ac_numPassed; };\n\n");

    for struct_type in structs {
        src.push_str(&declare_struct(struct_type, structs));
        src.push_str(";\n");
    }

    for (block_index, block) in interface.blocks().iter().enumerate() {
        src.push_str(&generate_declaration(
            block,
            1 + block_index,
            structs,
            use_physical_storage_buffer,
        ));
    }

    if use_physical_storage_buffer {
        src.push_str("layout (push_constant, std430) uniform PC {\n");
        for block in interface.blocks() {
            if let Some(instance_name) = block.instance_name() {
                write!(src, "    {} {instance_name}", block.name()).unwrap();
                if block.is_array() {
                    write!(src, "[{}]", block.array_size()).unwrap();
                }
                src.push_str(";\n");
            }
        }
        src.push_str("};\n");
    }

    src.push('\n');
    generate_compare_funcs(&mut src, interface);

    src.push_str("\nvoid main (void)\n{\n    bool allOk = true;\n");
    src.push_str(&generate_compare_src(interface, layout, compare_ptrs, matrix_load));
    src.push_str("    if (allOk)\n        ac_numPassed++;\n\n");
    src.push_str(&generate_write_src(interface, layout, write_ptrs, matrix_store));
    src.push_str("}\n");

    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::Precision;
    use crate::var_type::VarType;

    #[test]
    fn compare_funcs() {
        assert_eq!(
            compare_func_for_type(DataType::FLOAT),
            "bool compare_float (highp float a, highp float b) { return abs(a - b) < 0.05; }\n"
        );
        assert_eq!(
            compare_func_for_type(DataType::float_vec(2)),
            "bool compare_vec2 (highp vec2 a, highp vec2 b) { return compare_float(a.x, b.x)&&compare_float(a.y, b.y); }\n"
        );
        assert_eq!(
            compare_func_for_type(DataType::mat(2, 3)),
            "bool compare_mat2x3 (highp mat2x3 a, highp mat2x3 b) { return compare_vec3(a[0], b[0])&&compare_vec3(a[1], b[1]); }\n"
        );
        assert_eq!(
            compare_func_for_type(DataType::vec(ScalarType::Uint8, 2)),
            "bool compare_u8vec2 (highp uvec2 a, highp uvec2 b) { return a == b; }\n"
        );
        assert_eq!(
            compare_func_for_type(DataType::Vector(ScalarType::Bool, crate::data_type::VecSize::Three)),
            "bool compare_bvec3 (bvec3 a, bvec3 b) { return a == b; }\n"
        );
    }

    #[test]
    fn matrix_dependencies() {
        let mut deps = BTreeSet::new();
        compare_dependencies(DataType::mat(3, 2), &mut deps);
        assert_eq!(
            deps.into_iter().collect::<Vec<_>>(),
            [DataType::FLOAT, DataType::float_vec(2), DataType::mat(3, 2)]
        );
    }

    #[test]
    fn block_declaration() {
        let mut block = BufferBlock::new("Block");
        block
            .set_instance_name("block")
            .set_array_size(2)
            .set_flags(LayoutFlags::STD430 | LayoutFlags::ROW_MAJOR)
            .add_member(BufferVar::new(
                "m",
                VarType::basic(DataType::mat(3, 3), Precision::Mediump),
                AccessFlags::READ,
            ))
            .add_member(
                BufferVar::new(
                    "v",
                    VarType::unsized_array(VarType::plain(DataType::UINT)),
                    AccessFlags::READ,
                )
                .with_layout(LayoutFlags::COLUMN_MAJOR),
            );

        assert_eq!(
            generate_declaration(&block, 3, &[], false),
            "layout(std430, row_major, binding = 3) readonly buffer Block\n{\n\
             \tmediump mat3 m;\n\
             \tlayout(column_major) uint v[];\n\
             } block[2];\n"
        );
        assert_eq!(
            generate_declaration(&block, 3, &[], true),
            "layout(std430, row_major, buffer_reference) readonly buffer Block\n{\n\
             \tmediump mat3 m;\n\
             \tlayout(column_major) uint v[];\n\
             };\n"
        );
    }
}
