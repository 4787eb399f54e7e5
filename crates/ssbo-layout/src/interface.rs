//! Shader interface description: buffer blocks, their members and the struct
//! types they use.

use crate::data_type::DataType;
use crate::var_type::{StructId, StructType, VarType};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

bitflags! {
    /// Layout qualifiers and storage capabilities of a block or block member.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LayoutFlags: u32 {
        const STD140 = 1 << 0;
        const STD430 = 1 << 1;
        const ROW_MAJOR = 1 << 2;
        const COLUMN_MAJOR = 1 << 3;
        /// Relaxed block layout; a modifier rather than an exclusive packing.
        const RELAXED = 1 << 6;
        const STORAGE_16BIT = 1 << 7;
        const STORAGE_8BIT = 1 << 8;
        const SCALAR = 1 << 9;
        const DESCRIPTOR_INDEXING = 1 << 10;
    }
}

impl LayoutFlags {
    pub const PACKING_MASK: LayoutFlags = LayoutFlags::STD140
        .union(LayoutFlags::STD430)
        .union(LayoutFlags::RELAXED)
        .union(LayoutFlags::SCALAR);
    pub const MATRIX_ORDER_MASK: LayoutFlags = LayoutFlags::ROW_MAJOR.union(LayoutFlags::COLUMN_MAJOR);
    /// Flags that are spelled out in GLSL `layout(...)` qualifiers.
    pub const LAYOUT_MASK: LayoutFlags = LayoutFlags::STD140
        .union(LayoutFlags::STD430)
        .union(LayoutFlags::SCALAR)
        .union(LayoutFlags::MATRIX_ORDER_MASK);

    /// Combines the flags of an enclosing scope with those of a nested declaration:
    /// the packing and the matrix order are each inherited unless overridden.
    pub fn merge(self, new: LayoutFlags) -> LayoutFlags {
        let pick = |mask: LayoutFlags| {
            if new.intersects(mask) {
                new & mask
            } else {
                self & mask
            }
        };
        pick(LayoutFlags::PACKING_MASK) | pick(LayoutFlags::MATRIX_ORDER_MASK)
    }

    pub fn is_row_major(self) -> bool {
        self.contains(LayoutFlags::ROW_MAJOR)
    }
}

/// Formats the qualifier part of the flags, e.g. `std430, row_major`.
pub struct LayoutQualifiers(pub LayoutFlags);

impl fmt::Display for LayoutQualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const TOKENS: [(LayoutFlags, &str); 5] = [
            (LayoutFlags::STD140, "std140"),
            (LayoutFlags::STD430, "std430"),
            (LayoutFlags::SCALAR, "scalar"),
            (LayoutFlags::ROW_MAJOR, "row_major"),
            (LayoutFlags::COLUMN_MAJOR, "column_major"),
        ];

        let mut first = true;
        for (flag, token) in TOKENS {
            if self.0.contains(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(token)?;
                first = false;
            }
        }
        Ok(())
    }
}

bitflags! {
    /// How the generated shader accesses a block member.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccessFlags: u32 {
        const READ = 1 << 4;
        const WRITE = 1 << 5;
    }
}

/// A member of a buffer block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferVar {
    name: String,
    ty: VarType,
    layout: LayoutFlags,
    access: AccessFlags,
    offset: Option<usize>,
}

impl BufferVar {
    pub fn new(name: impl Into<String>, ty: VarType, access: AccessFlags) -> Self {
        Self {
            name: name.into(),
            ty,
            layout: LayoutFlags::empty(),
            access,
            offset: None,
        }
    }

    /// Member-level layout qualifiers, e.g. a matrix order overriding the block's.
    pub fn with_layout(mut self, layout: LayoutFlags) -> Self {
        self.layout = layout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &VarType {
        &self.ty
    }

    pub fn layout(&self) -> LayoutFlags {
        self.layout
    }

    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// Explicit byte offset, emitted as `layout(offset = N)`.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = Some(offset);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferBlock {
    name: String,
    instance_name: Option<String>,
    members: Vec<BufferVar>,
    array_size: usize,
    flags: LayoutFlags,
    last_unsized_array_sizes: Vec<usize>,
}

impl BufferBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_name: None,
            members: Vec::new(),
            array_size: 0,
            flags: LayoutFlags::empty(),
            last_unsized_array_sizes: vec![0],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    pub fn set_instance_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.instance_name = Some(name.into());
        self
    }

    pub fn members(&self) -> &[BufferVar] {
        &self.members
    }

    pub(crate) fn members_mut(&mut self) -> &mut [BufferVar] {
        &mut self.members
    }

    pub fn add_member(&mut self, var: BufferVar) -> &mut Self {
        self.members.push(var);
        self
    }

    /// Number of instances in an instance array, 0 when the block is not an array.
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn is_array(&self) -> bool {
        self.array_size > 0
    }

    pub fn num_instances(&self) -> usize {
        self.array_size.max(1)
    }

    pub fn set_array_size(&mut self, array_size: usize) -> &mut Self {
        self.last_unsized_array_sizes.resize(array_size.max(1), 0);
        self.array_size = array_size;
        self
    }

    pub fn flags(&self) -> LayoutFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: LayoutFlags) -> &mut Self {
        let packings = (flags & (LayoutFlags::STD140 | LayoutFlags::STD430 | LayoutFlags::SCALAR))
            .iter()
            .count();
        assert!(
            packings <= 1,
            "block {} combines more than one of std140, std430 and scalar",
            self.name
        );
        self.flags = flags;
        self
    }

    pub fn last_unsized_array_size(&self, instance: usize) -> usize {
        self.last_unsized_array_sizes[instance]
    }

    pub fn set_last_unsized_array_size(&mut self, instance: usize, size: usize) -> &mut Self {
        self.last_unsized_array_sizes[instance] = size;
        self
    }

    /// API name of one instance: `Block` or `Block[i]`.
    pub fn instance_api_name(&self, instance: usize) -> String {
        assert!(self.is_array() || instance == 0);
        if self.is_array() {
            format!("{}[{instance}]", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn has_write_access(&self) -> bool {
        self.members
            .iter()
            .any(|var| var.access.contains(AccessFlags::WRITE))
    }
}

/// Owns every struct type and buffer block of one test case.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderInterface {
    pub(crate) structs: Vec<StructType>,
    pub(crate) blocks: Vec<BufferBlock>,
}

impl ShaderInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_struct(&mut self, name: impl Into<String>) -> StructId {
        self.structs.push(StructType::new(name));
        StructId(self.structs.len() - 1)
    }

    pub fn struct_type(&self, id: StructId) -> &StructType {
        &self.structs[id.0]
    }

    pub fn struct_type_mut(&mut self, id: StructId) -> &mut StructType {
        &mut self.structs[id.0]
    }

    pub fn find_struct(&self, name: &str) -> Option<StructId> {
        self.structs
            .iter()
            .position(|s| s.name() == name)
            .map(StructId)
    }

    /// All struct types, in declaration order. Indexable by [`StructId::index`].
    pub fn named_structs(&self) -> &[StructType] {
        &self.structs
    }

    pub fn alloc_block(&mut self, name: impl Into<String>) -> &mut BufferBlock {
        let index = self.blocks.len();
        self.blocks.push(BufferBlock::new(name));
        &mut self.blocks[index]
    }

    pub fn blocks(&self) -> &[BufferBlock] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> &BufferBlock {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut BufferBlock {
        &mut self.blocks[index]
    }

    fn any_block_has(&self, flag: LayoutFlags) -> bool {
        self.blocks.iter().any(|b| b.flags.contains(flag))
    }

    pub fn uses_relaxed_layout(&self) -> bool {
        self.any_block_has(LayoutFlags::RELAXED)
    }

    pub fn uses_16bit_storage(&self) -> bool {
        self.any_block_has(LayoutFlags::STORAGE_16BIT)
    }

    pub fn uses_8bit_storage(&self) -> bool {
        self.any_block_has(LayoutFlags::STORAGE_8BIT)
    }

    pub fn uses_scalar_layout(&self) -> bool {
        self.any_block_has(LayoutFlags::SCALAR)
    }

    pub fn uses_descriptor_indexing(&self) -> bool {
        self.any_block_has(LayoutFlags::DESCRIPTOR_INDEXING)
    }

    pub fn uses_std140(&self) -> bool {
        self.any_block_has(LayoutFlags::STD140)
    }

    pub fn uses_std430(&self) -> bool {
        self.any_block_has(LayoutFlags::STD430)
    }

    /// Number of storage-buffer descriptors the blocks need.
    pub fn num_block_instances(&self) -> usize {
        self.blocks.iter().map(BufferBlock::num_instances).sum()
    }

    /// Every basic type used by any block member, directly or through structs and arrays.
    pub fn collect_unique_basic_types(&self) -> BTreeSet<DataType> {
        let mut types = BTreeSet::new();
        for block in &self.blocks {
            for var in &block.members {
                var.ty.visit_basic_types(&self.structs, &mut |ty| {
                    types.insert(ty);
                });
            }
        }
        types
    }
}
