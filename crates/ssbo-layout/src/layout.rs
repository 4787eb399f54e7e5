//! Reference layout computation for std140, std430, relaxed and scalar blocks.
//!
//! The layout is computed once per interface and describes, for every leaf
//! variable, where its first element lives and how to step to the others.
//! Arrays of scalars, vectors and matrices collapse into a single entry; arrays
//! of aggregates are unrolled, except for the outermost array dimension of a
//! block member (the "top-level" array), which is described once as a template
//! plus a stride.

use crate::data_type::DataType;
use crate::interface::{BufferVar, LayoutFlags, ShaderInterface};
use crate::var_type::{ArraySize, StructType, VarType};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

const VEC4_ALIGNMENT: usize = 4 * 4;

/// Rounds `value` up to a multiple of `alignment`.
pub fn align(value: usize, alignment: usize) -> usize {
    value.next_multiple_of(alignment.max(1))
}

/// Layout of one leaf variable (scalar, vector or matrix, possibly arrayed).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferVarLayoutEntry {
    pub name: String,
    pub data_type: DataType,
    pub block_index: usize,
    pub offset: usize,
    /// 0 for a runtime-sized array.
    pub array_size: usize,
    pub array_stride: usize,
    pub matrix_stride: usize,
    /// 0 for a runtime-sized top-level array.
    pub top_level_array_size: usize,
    pub top_level_array_stride: usize,
    pub is_row_major: bool,
}

impl BufferVarLayoutEntry {
    fn leaf(name: String, data_type: DataType, block_index: usize, offset: usize) -> Self {
        Self {
            name,
            data_type,
            block_index,
            offset,
            array_size: 1,
            array_stride: 0,
            matrix_stride: 0,
            top_level_array_size: 1,
            top_level_array_stride: 0,
            is_row_major: false,
        }
    }

    pub fn is_unsized_array(&self) -> bool {
        assert!(self.array_size != 0 || self.top_level_array_size != 0);
        self.array_size == 0 || self.top_level_array_size == 0
    }

    pub fn resolved_array_size(&self, last_unsized_array_size: usize) -> usize {
        if self.array_size == 0 {
            last_unsized_array_size
        } else {
            self.array_size
        }
    }

    pub fn resolved_top_level_array_size(&self, last_unsized_array_size: usize) -> usize {
        if self.top_level_array_size == 0 {
            last_unsized_array_size
        } else {
            self.top_level_array_size
        }
    }

    /// Byte offsets of every element, as `(top-level index, array index, offset)`.
    pub fn element_offsets(
        &self,
        last_unsized_array_size: usize,
    ) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let top_level_size = self.resolved_top_level_array_size(last_unsized_array_size);
        let array_size = self.resolved_array_size(last_unsized_array_size);
        (0..top_level_size).flat_map(move |top| {
            (0..array_size).map(move |elem| (top, elem, self.element_offset(top, elem)))
        })
    }

    /// Byte offset of element `elem` of top-level element `top`.
    pub fn element_offset(&self, top: usize, elem: usize) -> usize {
        self.offset + top * self.top_level_array_stride + elem * self.array_stride
    }

    /// Offsets of the scalar components of one element, relative to the element,
    /// in storage order (vector by vector for matrices).
    pub fn component_offsets(&self) -> Vec<usize> {
        let comp_size = self.data_type.scalar_type().byte_size();
        match self.data_type.matrix_storage_vectors(self.is_row_major) {
            Some((vec_type, num_vecs)) => (0..num_vecs)
                .flat_map(|vec| {
                    (0..vec_type.scalar_size()).map(move |comp| vec * self.matrix_stride + comp * comp_size)
                })
                .collect(),
            None => (0..self.data_type.scalar_size())
                .map(|comp| comp * comp_size)
                .collect(),
        }
    }

    /// Offset of matrix component `(column, row)` relative to the element.
    pub fn matrix_component_offset(&self, column: usize, row: usize) -> usize {
        crate::literal::matrix_component_offset(self.matrix_stride, self.is_row_major, column, row)
    }
}

impl fmt::Display for BufferVarLayoutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{ type = {}, blockNdx = {}, offset = {}, arraySize = {}, arrayStride = {}, \
             matrixStride = {}, topLevelArraySize = {}, topLevelArrayStride = {}, isRowMajor = {} }}",
            self.name,
            self.data_type,
            self.block_index,
            self.offset,
            self.array_size,
            self.array_stride,
            self.matrix_stride,
            self.top_level_array_size,
            self.top_level_array_stride,
            self.is_row_major,
        )
    }
}

/// Layout of one block instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLayoutEntry {
    pub name: String,
    /// Aligned size, not counting the elements of a trailing runtime-sized array.
    pub size: usize,
    pub active_var_indices: Vec<usize>,
}

impl fmt::Display for BlockLayoutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{ size = {}, activeVarIndices = [{}] }}",
            self.name,
            self.size,
            itertools::join(&self.active_var_indices, ", ")
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLayout {
    pub buffer_vars: Vec<BufferVarLayoutEntry>,
    pub blocks: Vec<BlockLayoutEntry>,
}

impl BufferLayout {
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.buffer_vars.iter().position(|var| var.name == name)
    }

    pub fn block_index(&self, name: &str) -> Option<usize> {
        self.blocks.iter().position(|block| block.name == name)
    }

    /// Whether any active variable of `block` is a runtime-sized array.
    pub fn has_unsized_array(&self, block: &BlockLayoutEntry) -> bool {
        block
            .active_var_indices
            .iter()
            .any(|&ndx| self.buffer_vars[ndx].is_unsized_array())
    }

    /// Stride of the runtime-sized array of `block`, 0 if it has none.
    ///
    /// Member order is not assumed, since result layouts reported by an
    /// implementation need not list members in declaration order.
    pub fn unsized_array_stride(&self, block: &BlockLayoutEntry) -> usize {
        for &ndx in &block.active_var_indices {
            let var = &self.buffer_vars[ndx];
            if var.array_size == 0 {
                return var.array_stride;
            } else if var.top_level_array_size == 0 {
                return var.top_level_array_stride;
            }
        }
        0
    }
}

pub fn compute_std140_base_alignment(structs: &[StructType], ty: &VarType, flags: LayoutFlags) -> usize {
    match ty {
        VarType::Basic { data_type, .. } => match data_type.matrix_storage_vectors(flags.is_row_major()) {
            Some((vec_type, _)) => align(vec_type.byte_alignment(), VEC4_ALIGNMENT),
            None => data_type.byte_alignment(),
        },
        VarType::Array { element, .. } => align(
            compute_std140_base_alignment(structs, element, flags),
            VEC4_ALIGNMENT,
        ),
        VarType::Struct(id) => {
            let max = structs[id.0]
                .members()
                .iter()
                .map(|member| compute_std140_base_alignment(structs, &member.ty, flags))
                .max()
                .unwrap_or(0);
            align(max, VEC4_ALIGNMENT)
        }
    }
}

pub fn compute_std430_base_alignment(structs: &[StructType], ty: &VarType, flags: LayoutFlags) -> usize {
    match ty {
        VarType::Basic { data_type, .. } => match data_type.matrix_storage_vectors(flags.is_row_major()) {
            Some((vec_type, _)) => vec_type.byte_alignment(),
            None => data_type.byte_alignment(),
        },
        VarType::Array { element, .. } => compute_std430_base_alignment(structs, element, flags),
        VarType::Struct(id) => structs[id.0]
            .members()
            .iter()
            .map(|member| compute_std430_base_alignment(structs, &member.ty, flags))
            .max()
            .unwrap_or(0),
    }
}

pub fn compute_relaxed_block_base_alignment(
    structs: &[StructType],
    ty: &VarType,
    flags: LayoutFlags,
) -> usize {
    match ty {
        VarType::Basic { data_type, .. } => match *data_type {
            DataType::Vector(scalar, _) => DataType::Scalar(scalar).byte_alignment(),
            DataType::Matrix { .. } => {
                let (vec_type, _) = data_type
                    .matrix_storage_vectors(flags.is_row_major())
                    .unwrap_or_else(|| unreachable!());
                vec_type.byte_alignment()
            }
            DataType::Scalar(_) => data_type.byte_alignment(),
        },
        VarType::Array { element, .. } => compute_std430_base_alignment(structs, element, flags),
        VarType::Struct(id) => structs[id.0]
            .members()
            .iter()
            .map(|member| compute_relaxed_block_base_alignment(structs, &member.ty, flags))
            .max()
            .unwrap_or(0),
    }
}

pub fn compute_scalar_block_alignment(structs: &[StructType], ty: &VarType, flags: LayoutFlags) -> usize {
    match ty {
        VarType::Basic { data_type, .. } => DataType::Scalar(data_type.scalar_type()).byte_alignment(),
        VarType::Array { element, .. } => compute_scalar_block_alignment(structs, element, flags),
        VarType::Struct(id) => structs[id.0]
            .members()
            .iter()
            .map(|member| compute_scalar_block_alignment(structs, &member.ty, flags))
            .max()
            .unwrap_or(0),
    }
}

/// Base alignment of `ty` under the packing selected by `flags`. Priority when
/// several packings are present: scalar, std140, relaxed, then std430.
pub fn compute_base_alignment(structs: &[StructType], ty: &VarType, flags: LayoutFlags) -> usize {
    if flags.contains(LayoutFlags::SCALAR) {
        compute_scalar_block_alignment(structs, ty, flags)
    } else if flags.contains(LayoutFlags::STD140) {
        compute_std140_base_alignment(structs, ty, flags)
    } else if flags.contains(LayoutFlags::RELAXED) {
        compute_relaxed_block_base_alignment(structs, ty, flags)
    } else {
        compute_std430_base_alignment(structs, ty, flags)
    }
}

/// Relaxed layout moves vectors that would straddle a 16-byte boundary (or
/// vectors larger than 16 bytes that do not start on one) up to the next boundary.
fn crosses_vec4_boundary(offset: usize, size: usize) -> bool {
    if size <= VEC4_ALIGNMENT {
        offset / VEC4_ALIGNMENT != (offset + size - 1) / VEC4_ALIGNMENT
    } else {
        offset % VEC4_ALIGNMENT != 0
    }
}

/// Lays out `ty` at `base_offset` (aligned first), returning the number of bytes
/// consumed from `base_offset` and the entries of every leaf, in declaration order.
pub fn compute_var_layout(
    structs: &[StructType],
    block_index: usize,
    base_offset: usize,
    prefix: &str,
    ty: &VarType,
    flags: LayoutFlags,
) -> (usize, Vec<BufferVarLayoutEntry>) {
    let scalar = flags.contains(LayoutFlags::SCALAR);
    let row_major = flags.is_row_major();
    let base_alignment = compute_base_alignment(structs, ty, flags);
    let mut cur_offset = align(base_offset, base_alignment);
    let mut entries = Vec::new();

    match ty {
        VarType::Basic { data_type, .. } => {
            let mut entry = BufferVarLayoutEntry::leaf(prefix.to_string(), *data_type, block_index, 0);

            if let Some((vec_type, num_vecs)) = data_type.matrix_storage_vectors(row_major) {
                let vec_stride = if scalar {
                    vec_type.byte_size()
                } else {
                    base_alignment
                };

                entry.offset = cur_offset;
                entry.matrix_stride = vec_stride;
                entry.is_row_major = row_major;

                cur_offset += num_vecs * vec_stride;
            } else {
                let size = data_type.byte_size();
                if !scalar
                    && flags.contains(LayoutFlags::RELAXED)
                    && data_type.is_vector()
                    && crosses_vec4_boundary(cur_offset, size)
                {
                    cur_offset = align(cur_offset, VEC4_ALIGNMENT);
                }

                entry.offset = cur_offset;
                cur_offset += size;
            }

            entries.push(entry);
        }
        VarType::Array { element, size } => {
            let array_size = match *size {
                ArraySize::Sized(n) => n,
                ArraySize::Unsized => {
                    panic!("`{prefix}`: only the top-level array of a block member may be unsized")
                }
            };

            match **element {
                VarType::Basic { data_type, .. } if !data_type.is_matrix() => {
                    let stride = if scalar {
                        data_type.byte_size()
                    } else {
                        base_alignment
                    };

                    let mut entry =
                        BufferVarLayoutEntry::leaf(format!("{prefix}[0]"), data_type, block_index, cur_offset);
                    entry.array_size = array_size;
                    entry.array_stride = stride;

                    cur_offset += stride * array_size;
                    entries.push(entry);
                }
                VarType::Basic { data_type, .. } => {
                    let (vec_type, num_vecs) = data_type
                        .matrix_storage_vectors(row_major)
                        .unwrap_or_else(|| unreachable!());
                    let vec_stride = if scalar {
                        vec_type.byte_size()
                    } else {
                        base_alignment
                    };

                    let mut entry =
                        BufferVarLayoutEntry::leaf(format!("{prefix}[0]"), data_type, block_index, cur_offset);
                    entry.array_size = array_size;
                    entry.array_stride = vec_stride * num_vecs;
                    entry.matrix_stride = vec_stride;
                    entry.is_row_major = row_major;

                    cur_offset += entry.array_stride * array_size;
                    entries.push(entry);
                }
                VarType::Struct(_) | VarType::Array { .. } => {
                    for elem in 0..array_size {
                        let (size, children) = compute_var_layout(
                            structs,
                            block_index,
                            cur_offset,
                            &format!("{prefix}[{elem}]"),
                            element,
                            flags,
                        );
                        cur_offset += size;
                        entries.extend(children);
                    }
                }
            }
        }
        VarType::Struct(id) => {
            for member in structs[id.0].members() {
                let (size, children) = compute_var_layout(
                    structs,
                    block_index,
                    cur_offset,
                    &format!("{prefix}.{}", member.name),
                    &member.ty,
                    flags,
                );
                cur_offset += size;
                entries.extend(children);
            }

            if !scalar {
                cur_offset = align(cur_offset, base_alignment);
            }
        }
    }

    (cur_offset - base_offset, entries)
}

/// Lays out one block member, giving its top-level array dimension (if any) the
/// template treatment: the first element is laid out once, and every resulting
/// entry carries the top-level size and stride.
pub fn compute_member_layout(
    structs: &[StructType],
    block_index: usize,
    block_prefix: &str,
    base_offset: usize,
    var: &BufferVar,
    block_flags: LayoutFlags,
) -> (usize, Vec<BufferVarLayoutEntry>) {
    let combined_flags = block_flags.merge(var.layout());

    let VarType::Array { element, size } = var.ty() else {
        return compute_var_layout(
            structs,
            block_index,
            base_offset,
            &format!("{block_prefix}{}", var.name()),
            var.ty(),
            combined_flags,
        );
    };

    let top_level_array_size = match *size {
        ArraySize::Sized(n) => n,
        ArraySize::Unsized => 0,
    };
    let prefix = format!("{block_prefix}{}[0]", var.name());
    let block_scalar = block_flags.contains(LayoutFlags::SCALAR);
    let block_std140 = block_flags.contains(LayoutFlags::STD140);

    // The packing comes from the block, while the matrix order may come from the member.
    let base_alignment = if block_scalar {
        compute_scalar_block_alignment(structs, var.ty(), combined_flags)
    } else if block_std140 {
        compute_std140_base_alignment(structs, var.ty(), combined_flags)
    } else if block_flags.contains(LayoutFlags::RELAXED) {
        compute_relaxed_block_base_alignment(structs, var.ty(), combined_flags)
    } else {
        compute_std430_base_alignment(structs, var.ty(), combined_flags)
    };
    let mut cur_offset = align(base_offset, base_alignment);
    let mut entries = Vec::new();

    match **element {
        VarType::Basic { data_type, .. } if !data_type.is_matrix() => {
            let elem_alignment = data_type.byte_alignment();
            let stride = if block_scalar {
                data_type.byte_size()
            } else if block_std140 {
                align(elem_alignment, VEC4_ALIGNMENT)
            } else {
                elem_alignment
            };

            let mut entry = BufferVarLayoutEntry::leaf(prefix, data_type, block_index, cur_offset);
            entry.array_size = top_level_array_size;
            entry.array_stride = stride;

            cur_offset += stride * top_level_array_size;
            entries.push(entry);
        }
        VarType::Basic { data_type, .. } => {
            let row_major = combined_flags.is_row_major();
            let (vec_type, num_vecs) = data_type
                .matrix_storage_vectors(row_major)
                .unwrap_or_else(|| unreachable!());
            let vec_alignment = vec_type.byte_alignment();
            let stride = if block_scalar {
                vec_type.byte_size()
            } else if block_std140 {
                align(vec_alignment, VEC4_ALIGNMENT)
            } else {
                vec_alignment
            };

            let mut entry = BufferVarLayoutEntry::leaf(prefix, data_type, block_index, cur_offset);
            entry.array_size = top_level_array_size;
            entry.array_stride = stride * num_vecs;
            entry.matrix_stride = stride;
            entry.is_row_major = row_major;

            cur_offset += entry.array_stride * top_level_array_size;
            entries.push(entry);
        }
        VarType::Struct(_) | VarType::Array { .. } => {
            // `cur_offset` is already aligned, so laying out the first element
            // adds no padding in front of it; trailing padding is included.
            let (elem_size, mut children) = compute_var_layout(
                structs,
                block_index,
                align(cur_offset, base_alignment),
                &prefix,
                element,
                combined_flags,
            );
            let stride = align(elem_size, base_alignment);

            for child in &mut children {
                child.top_level_array_size = top_level_array_size;
                child.top_level_array_stride = stride;
            }

            if top_level_array_size != 0 {
                cur_offset += stride * (top_level_array_size - 1) + elem_size;
            }
            entries = children;
        }
    }

    (cur_offset - base_offset, entries)
}

/// Computes the reference layout of every block in `interface`.
///
/// Members of relaxed-layout blocks get their computed offset recorded on the
/// [`BufferVar`], so the generated shader declares it explicitly.
pub fn compute_reference_layout(interface: &mut ShaderInterface) -> BufferLayout {
    let ShaderInterface { structs, blocks } = interface;
    let mut layout = BufferLayout::default();

    for block in blocks.iter_mut() {
        let block_flags = block.flags();
        let block_prefix = match block.instance_name() {
            Some(_) => format!("{}.", block.name()),
            None => String::new(),
        };
        let active_block_index = layout.blocks.len();
        let first_var_index = layout.buffer_vars.len();
        let mut cur_offset = 0;

        for var in block.members_mut() {
            let (size, entries) = compute_member_layout(
                structs,
                active_block_index,
                &block_prefix,
                cur_offset,
                var,
                block_flags,
            );
            cur_offset += size;

            if block_flags.contains(LayoutFlags::RELAXED) {
                let first = entries
                    .first()
                    .unwrap_or_else(|| panic!("member `{}` produced no layout entries", var.name()));
                var.set_offset(first.offset);
            }

            for entry in &entries {
                trace!("{entry}");
            }
            layout.buffer_vars.extend(entries);
        }

        let active_var_indices: Vec<usize> = (first_var_index..layout.buffer_vars.len()).collect();
        debug!(
            block = block.name(),
            size = cur_offset,
            num_vars = active_var_indices.len(),
            "computed block layout"
        );

        for instance in 0..block.num_instances() {
            layout.blocks.push(BlockLayoutEntry {
                name: block.instance_api_name(instance),
                size: cur_offset,
                active_var_indices: active_var_indices.clone(),
            });
        }
    }

    layout
}
