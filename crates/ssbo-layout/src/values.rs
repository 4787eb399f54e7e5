//! Deterministic block contents, and layout-aware copies between buffers.

use crate::access::{api_name, for_each_leaf};
use crate::data_type::ScalarType;
use crate::float16::f32_to_f16;
use crate::interface::{AccessFlags, ShaderInterface};
use crate::layout::{BufferLayout, BufferVarLayoutEntry};
use crate::literal::write;
use crate::storage::{BlockDataMut, BlockDataPtr};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::trace;

/// Salt for the values a case starts with.
pub const INITIAL_DATA_SALT: u32 = 0xad2f_7214;
/// Salt for the values the shader writes.
pub const WRITE_DATA_SALT: u32 = 0x025c_a4e7;

/// `djb2` over the bytes of `name`.
pub fn string_hash(name: &str) -> u32 {
    name.bytes()
        .fold(5381u32, |hash, c| hash.wrapping_mul(33).wrapping_add(u32::from(c)))
}

pub fn seed_for(name: &str, salt: u32) -> u32 {
    string_hash(name) ^ salt
}

/// Writes one random component of type `scalar` at `bytes[offset..]`.
pub(crate) fn generate_component(scalar: ScalarType, bytes: &mut [u8], offset: usize, rng: &mut impl Rng) {
    match scalar {
        ScalarType::Float => write(bytes, offset, rng.random_range(-9..=9) as f32),
        ScalarType::Int => write(bytes, offset, rng.random_range(-9i32..=9)),
        ScalarType::Uint => write(bytes, offset, rng.random_range(0u32..=9)),
        ScalarType::Int8 => write(bytes, offset, rng.random_range(-9i8..=9)),
        ScalarType::Uint8 => write(bytes, offset, rng.random_range(0u8..=9)),
        ScalarType::Int16 => write(bytes, offset, rng.random_range(-9i16..=9)),
        ScalarType::Uint16 => write(bytes, offset, rng.random_range(0u16..=9)),
        ScalarType::Float16 => write(bytes, offset, f32_to_f16(rng.random_range(-9..=9) as f32)),
        // Any non-zero pattern is true; some implementations only accept 1.
        ScalarType::Bool => {
            let value = if rng.random::<bool>() {
                rng.random::<u32>() | 1
            } else {
                0
            };
            write(bytes, offset, value)
        }
    }
}

/// Fills every component of every element of `entry` in `block` with a small
/// random value, in storage order.
pub fn generate_value(
    entry: &BufferVarLayoutEntry,
    unsized_array_size: usize,
    block: &mut [u8],
    rng: &mut impl Rng,
) {
    let scalar = entry.data_type.scalar_type();
    let component_offsets = entry.component_offsets();

    trace!(name = %entry.name, "generating values");
    for (_, _, elem_offset) in entry.element_offsets(unsized_array_size) {
        for &comp_offset in &component_offsets {
            generate_component(scalar, block, elem_offset + comp_offset, rng);
        }
    }
}

/// Fills every block with values drawn from one generator seeded with `seed`.
pub fn generate_values(layout: &BufferLayout, blocks: &mut [BlockDataMut<'_>], seed: u32) {
    assert_eq!(layout.blocks.len(), blocks.len());
    let mut rng = StdRng::seed_from_u64(u64::from(seed));

    for (block_layout, block) in layout.blocks.iter().zip(blocks.iter_mut()) {
        for &var_index in &block_layout.active_var_indices {
            generate_value(
                &layout.buffer_vars[var_index],
                block.last_unsized_array_size,
                block.data,
                &mut rng,
            );
        }
    }
}

/// Copies every element of one variable between two buffers that may use
/// different layouts for it.
pub fn copy_buffer_var_data(
    dst_entry: &BufferVarLayoutEntry,
    dst: &mut BlockDataMut<'_>,
    src_entry: &BufferVarLayoutEntry,
    src: BlockDataPtr<'_>,
) {
    assert_eq!(dst_entry.data_type, src_entry.data_type);
    assert!(dst.last_unsized_array_size <= src.last_unsized_array_size);

    let data_type = dst_entry.data_type;
    let comp_size = data_type.scalar_type().byte_size();
    assert!(
        dst_entry.resolved_array_size(dst.last_unsized_array_size)
            <= src_entry.resolved_array_size(src.last_unsized_array_size)
    );

    for (top, elem, dst_offset) in dst_entry.element_offsets(dst.last_unsized_array_size) {
        let src_offset = src_entry.element_offset(top, elem);

        match (data_type.matrix_columns(), data_type.matrix_rows()) {
            (Some(columns), Some(rows)) => {
                for col in 0..columns {
                    for row in 0..rows {
                        let dst_comp = dst_offset + dst_entry.matrix_component_offset(col, row);
                        let src_comp = src_offset + src_entry.matrix_component_offset(col, row);
                        dst.data[dst_comp..dst_comp + comp_size]
                            .copy_from_slice(&src.data[src_comp..src_comp + comp_size]);
                    }
                }
            }
            _ => {
                let size = data_type.byte_size();
                dst.data[dst_offset..dst_offset + size].copy_from_slice(&src.data[src_offset..src_offset + size]);
            }
        }
    }
}

/// Copies every variable present in both layouts, matching blocks and variables by name.
pub fn copy_data(
    dst_layout: &BufferLayout,
    dst: &mut [BlockDataMut<'_>],
    src_layout: &BufferLayout,
    src: &[BlockDataPtr<'_>],
) {
    for (src_block, &src_ptr) in src_layout.blocks.iter().zip(src) {
        let Some(dst_block_index) = dst_layout.block_index(&src_block.name) else {
            continue;
        };

        for &src_var_index in &src_block.active_var_indices {
            let src_entry = &src_layout.buffer_vars[src_var_index];
            if let Some(dst_var_index) = dst_layout.variable_index(&src_entry.name) {
                copy_buffer_var_data(
                    &dst_layout.buffer_vars[dst_var_index],
                    &mut dst[dst_block_index],
                    src_entry,
                    src_ptr,
                );
            }
        }
    }
}

/// Copies the variables the shader does not write from `src` to `dst`, turning
/// the write data into the expected content of the buffers after the dispatch.
pub fn copy_non_written_data(
    interface: &ShaderInterface,
    layout: &BufferLayout,
    src: &[BlockDataPtr<'_>],
    dst: &mut [BlockDataMut<'_>],
) {
    let structs = interface.named_structs();

    for block in interface.blocks() {
        for instance in 0..block.num_instances() {
            let block_name = block.instance_api_name(instance);
            let block_index = layout
                .block_index(&block_name)
                .unwrap_or_else(|| panic!("block {block_name} missing from layout"));
            let unsized_array_size = block.last_unsized_array_size(instance);

            for var in block.members() {
                if var.access().contains(AccessFlags::WRITE) {
                    continue;
                }

                let mut var_indices = BTreeSet::new();
                for_each_leaf(structs, var.ty(), unsized_array_size, &mut |path, _| {
                    let name = api_name(block, var, structs, path);
                    let var_index = layout
                        .variable_index(&name)
                        .unwrap_or_else(|| panic!("{name} missing from layout"));
                    var_indices.insert(var_index);
                });

                for var_index in var_indices {
                    let entry = &layout.buffer_vars[var_index];
                    copy_buffer_var_data(entry, &mut dst[block_index], entry, src[block_index]);
                }
            }
        }
    }
}
