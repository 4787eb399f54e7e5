//! Backing storage for block instances: buffer sizing, per-instance views and
//! placement of instances in device buffers.

use crate::interface::ShaderInterface;
use crate::layout::{BlockLayoutEntry, BufferLayout, align};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

const VEC4_ALIGNMENT: usize = 4 * 4;

/// Size in bytes of every block instance of `layout`, including the elements of
/// the trailing runtime-sized array, in the order of `layout.blocks`.
pub fn compute_buffer_sizes(interface: &ShaderInterface, layout: &BufferLayout) -> Vec<usize> {
    let mut sizes = vec![0; layout.blocks.len()];

    for block in interface.blocks() {
        for instance in 0..block.num_instances() {
            let Some(block_index) = layout.block_index(&block.instance_api_name(instance)) else {
                continue;
            };
            let block_layout = &layout.blocks[block_index];
            let unsized_size = if layout.has_unsized_array(block_layout) {
                block.last_unsized_array_size(instance) * layout.unsized_array_stride(block_layout)
            } else {
                0
            };

            sizes[block_index] = block_layout.size + unsized_size;
        }
    }

    debug!(?sizes, "computed buffer sizes");
    sizes
}

/// Number of elements of the trailing runtime-sized array that fit in `len` bytes.
fn resolve_last_unsized_array_size(layout: &BufferLayout, block: &BlockLayoutEntry, len: usize) -> usize {
    if !layout.has_unsized_array(block) {
        return 0;
    }

    let stride = layout.unsized_array_stride(block);
    assert!(
        len >= block.size,
        "buffer for block {} is {len} bytes, smaller than its base size {}",
        block.name,
        block.size
    );
    let last_unsized_array_size = (len - block.size) / stride.max(1);
    assert_eq!(
        block.size + last_unsized_array_size * stride,
        len,
        "buffer for block {} does not end on an element boundary",
        block.name
    );
    last_unsized_array_size
}

/// Read-only view of the bytes of one block instance.
#[derive(Copy, Clone, Debug)]
pub struct BlockDataPtr<'a> {
    pub data: &'a [u8],
    pub last_unsized_array_size: usize,
}

/// Mutable view of the bytes of one block instance.
#[derive(Debug)]
pub struct BlockDataMut<'a> {
    pub data: &'a mut [u8],
    pub last_unsized_array_size: usize,
}

impl BlockDataMut<'_> {
    pub fn as_ptr(&self) -> BlockDataPtr<'_> {
        BlockDataPtr {
            data: &*self.data,
            last_unsized_array_size: self.last_unsized_array_size,
        }
    }
}

pub fn block_data_ptr<'a>(layout: &BufferLayout, block: &BlockLayoutEntry, data: &'a [u8]) -> BlockDataPtr<'a> {
    BlockDataPtr {
        last_unsized_array_size: resolve_last_unsized_array_size(layout, block, data.len()),
        data,
    }
}

pub fn block_data_mut<'a>(
    layout: &BufferLayout,
    block: &BlockLayoutEntry,
    data: &'a mut [u8],
) -> BlockDataMut<'a> {
    BlockDataMut {
        last_unsized_array_size: resolve_last_unsized_array_size(layout, block, data.len()),
        data,
    }
}

/// Host-side copy of every block instance of an interface, in one allocation.
///
/// Each instance starts on a 16-byte boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefDataStorage {
    data: Vec<u8>,
    ranges: Vec<Range<usize>>,
}

impl RefDataStorage {
    pub fn new(interface: &ShaderInterface, layout: &BufferLayout) -> Self {
        Self::with_sizes(&compute_buffer_sizes(interface, layout))
    }

    /// Storage for instances of the given sizes, zero-filled.
    pub fn with_sizes(sizes: &[usize]) -> Self {
        let mut ranges = Vec::with_capacity(sizes.len());
        let mut cur_offset = 0;
        for &size in sizes {
            ranges.push(cur_offset..cur_offset + size);
            cur_offset += align(size, VEC4_ALIGNMENT);
        }

        Self {
            data: vec![0; cur_offset],
            ranges,
        }
    }

    /// Storage for instances of the given sizes, holding `bytes` as produced by
    /// [`Self::as_bytes`]. `None` if the length does not match.
    pub fn with_contents(sizes: &[usize], bytes: &[u8]) -> Option<Self> {
        let mut storage = Self::with_sizes(sizes);
        if storage.data.len() != bytes.len() {
            return None;
        }
        storage.data.copy_from_slice(bytes);
        Some(storage)
    }

    pub fn num_blocks(&self) -> usize {
        self.ranges.len()
    }

    pub fn block_bytes(&self, index: usize) -> &[u8] {
        &self.data[self.ranges[index].clone()]
    }

    pub fn block_bytes_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.data[self.ranges[index].clone()]
    }

    /// The whole allocation, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn block_ptrs(&self, layout: &BufferLayout) -> Vec<BlockDataPtr<'_>> {
        assert_eq!(layout.blocks.len(), self.ranges.len());
        layout
            .blocks
            .iter()
            .zip(&self.ranges)
            .map(|(block, range)| block_data_ptr(layout, block, &self.data[range.clone()]))
            .collect()
    }

    pub fn block_ptrs_mut(&mut self, layout: &BufferLayout) -> Vec<BlockDataMut<'_>> {
        assert_eq!(layout.blocks.len(), self.ranges.len());
        let mut ptrs = Vec::with_capacity(self.ranges.len());
        let mut rest: &mut [u8] = &mut self.data;
        let mut consumed = 0;

        for (block, range) in layout.blocks.iter().zip(&self.ranges) {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(range.start - consumed);
            let (block_data, tail) = tail.split_at_mut(range.len());
            ptrs.push(block_data_mut(layout, block, block_data));
            rest = tail;
            consumed = range.end;
        }
        ptrs
    }
}

/// How block instances are placed in device buffers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum BufferMode {
    /// All instances share buffer 0, each at an offset honoring the binding alignment.
    Single,
    /// One buffer per instance.
    #[default]
    PerBlock,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub buffer: usize,
    pub offset: usize,
    pub size: usize,
}

pub fn block_locations(sizes: &[usize], mode: BufferMode, binding_alignment: usize) -> Vec<BlockLocation> {
    match mode {
        BufferMode::PerBlock => sizes
            .iter()
            .enumerate()
            .map(|(buffer, &size)| BlockLocation {
                buffer,
                offset: 0,
                size,
            })
            .collect(),
        BufferMode::Single => {
            let mut cur_offset = 0;
            sizes
                .iter()
                .map(|&size| {
                    let offset = align(cur_offset, binding_alignment);
                    cur_offset = offset + size;
                    BlockLocation {
                        buffer: 0,
                        offset,
                        size,
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::DataType;
    use crate::interface::{AccessFlags, BufferVar, LayoutFlags};
    use crate::layout::compute_reference_layout;
    use crate::var_type::VarType;

    fn unsized_interface() -> ShaderInterface {
        let mut interface = ShaderInterface::new();
        interface
            .alloc_block("Block")
            .set_flags(LayoutFlags::STD430)
            .add_member(BufferVar::new("a", VarType::plain(DataType::INT), AccessFlags::READ))
            .add_member(BufferVar::new(
                "v",
                VarType::unsized_array(VarType::plain(DataType::float_vec(3))),
                AccessFlags::READ,
            ))
            .set_last_unsized_array_size(0, 3);
        interface
    }

    #[test]
    fn sizes_include_unsized_elements() {
        let mut interface = unsized_interface();
        let layout = compute_reference_layout(&mut interface);
        assert_eq!(layout.blocks[0].size, 16);
        assert_eq!(compute_buffer_sizes(&interface, &layout), [16 + 3 * 16]);
    }

    #[test]
    fn views_resolve_unsized_length() {
        let mut interface = unsized_interface();
        let layout = compute_reference_layout(&mut interface);
        let mut storage = RefDataStorage::new(&interface, &layout);

        assert_eq!(storage.block_ptrs(&layout)[0].last_unsized_array_size, 3);
        assert_eq!(storage.block_ptrs_mut(&layout)[0].data.len(), 64);
    }

    #[test]
    fn storage_rounds_instances_to_vec4() {
        let storage = RefDataStorage::with_sizes(&[4, 20, 16]);
        assert_eq!(storage.as_bytes().len(), 16 + 32 + 16);
        assert_eq!(storage.block_bytes(1).len(), 20);
        assert_eq!(storage.num_blocks(), 3);
    }

    #[test]
    fn single_buffer_offsets_honor_binding_alignment() {
        let locations = block_locations(&[20, 8, 4], BufferMode::Single, 64);
        let offsets: Vec<usize> = locations.iter().map(|l| l.offset).collect();
        assert_eq!(offsets, [0, 64, 128]);
        assert!(locations.iter().all(|l| l.buffer == 0));

        let locations = block_locations(&[20, 8], BufferMode::PerBlock, 64);
        assert_eq!(locations[1], BlockLocation { buffer: 1, offset: 0, size: 8 });
    }
}
