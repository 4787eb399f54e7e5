//! Randomly generated interfaces.
//!
//! Every case is a pure function of its feature set and seed, so a failing case
//! can be reproduced from its name alone.

use crate::cases::SsboCase;
use crate::data_type::{DataType, Precision, ScalarType};
use crate::interface::{AccessFlags, BufferBlock, BufferVar, LayoutFlags, ShaderInterface};
use crate::storage::BufferMode;
use crate::var_type::VarType;
use bitflags::bitflags;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

bitflags! {
    /// What the generator may put into an interface.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Features: u32 {
        const VECTORS = 1 << 0;
        const MATRICES = 1 << 1;
        const ARRAYS = 1 << 2;
        const STRUCTS = 1 << 3;
        const NESTED_STRUCTS = 1 << 4;
        const INSTANCE_ARRAYS = 1 << 5;
        const UNUSED_VARS = 1 << 6;
        const UNUSED_MEMBERS = 1 << 7;
        const STD140_LAYOUT = 1 << 8;
        const STD430_LAYOUT = 1 << 9;
        const MATRIX_LAYOUT = 1 << 10;
        const UNSIZED_ARRAYS = 1 << 11;
        const ARRAYS_OF_ARRAYS = 1 << 12;
        const RELAXED_LAYOUT = 1 << 13;
        const STORAGE_16BIT = 1 << 14;
        const STORAGE_8BIT = 1 << 15;
        const SCALAR_LAYOUT = 1 << 16;
        const DESCRIPTOR_INDEXING = 1 << 17;
    }
}

impl Features {
    pub const ALL_STD_LAYOUTS: Features = Features::STD140_LAYOUT.union(Features::STD430_LAYOUT);
    pub const ALL_BASIC_TYPES: Features = Features::VECTORS.union(Features::MATRICES);
    pub const UNUSED: Features = Features::UNUSED_MEMBERS.union(Features::UNUSED_VARS);
}

const INSTANCE_ARRAY_WEIGHT: f64 = 0.3;
const READ_WEIGHT: f64 = 0.7;
const WRITE_WEIGHT: f64 = 0.7;
const ACCESS_WEIGHT: f64 = 0.85;
const STRUCT_WEIGHT: f64 = 0.1;
const ARRAY_WEIGHT: f64 = 0.1;
const UNSIZED_ARRAY_WEIGHT: f64 = 0.8;

/// Name number `index` (1-based) in bijective base-26 over `first..=last`:
/// `a`, ..., `z`, `aa`, `ab`, ...
pub fn gen_name(first: char, last: char, mut index: usize) -> String {
    assert!(index > 0);
    let first = first as u32;
    let alphabet_len = (last as u32 - first + 1) as usize;
    let letter = |i: usize| char::from_u32(first + i as u32).unwrap_or('?');

    let mut name = Vec::new();
    while index > alphabet_len {
        name.push(letter((index - 1) % alphabet_len));
        index = (index - 1) / alphabet_len;
    }
    name.push(letter(index % (alphabet_len + 1) - 1));
    name.iter().rev().collect()
}

fn choose<T: Copy>(rng: &mut impl Rng, candidates: &[T]) -> T {
    assert!(!candidates.is_empty(), "nothing to choose from");
    candidates[rng.random_range(0..candidates.len())]
}

/// Generator state for one case.
pub struct RandomCase {
    features: Features,
    use_physical_storage_buffer: bool,
    max_blocks: usize,
    max_instances: usize,
    max_array_length: usize,
    max_array_depth: usize,
    max_struct_depth: usize,
    max_block_members: usize,
    max_struct_members: usize,
    block_index: usize,
    buffer_var_index: usize,
    struct_index: usize,
    interface: ShaderInterface,
    rng: StdRng,
}

impl RandomCase {
    /// Generates the case `name` from `features` and `seed`.
    pub fn generate(
        name: impl Into<String>,
        features: Features,
        seed: u32,
        use_physical_storage_buffer: bool,
    ) -> SsboCase {
        let mut generator = RandomCase {
            features,
            use_physical_storage_buffer,
            max_blocks: if features.contains(Features::DESCRIPTOR_INDEXING) { 1 } else { 4 },
            max_instances: if features.contains(Features::INSTANCE_ARRAYS) { 3 } else { 0 },
            max_array_length: if features.contains(Features::ARRAYS) { 8 } else { 1 },
            max_array_depth: if features.contains(Features::ARRAYS_OF_ARRAYS) { 2 } else { 0 },
            max_struct_depth: if features.contains(Features::STRUCTS) { 2 } else { 0 },
            max_block_members: 5,
            max_struct_members: 4,
            block_index: 1,
            buffer_var_index: 1,
            struct_index: 1,
            interface: ShaderInterface::new(),
            rng: StdRng::seed_from_u64(u64::from(seed)),
        };

        let num_blocks = generator.rng.random_range(1..=generator.max_blocks);
        for _ in 0..num_blocks {
            generator.generate_block();
        }
        debug!(?features, seed, num_blocks, "generated random interface");

        let mut case = SsboCase::new(name, generator.interface, BufferMode::PerBlock);
        case.use_physical_storage_buffer = use_physical_storage_buffer;
        case
    }

    fn has(&self, feature: Features) -> bool {
        self.features.contains(feature)
    }

    fn generate_block(&mut self) {
        assert!(self.block_index < 26, "too many blocks");

        let letter = gen_name('A', 'Z', self.block_index + 1);
        let mut block = BufferBlock::new(format!("Block{letter}"));

        let mut num_instances = if self.max_instances > 0 && self.rng.random_bool(INSTANCE_ARRAY_WEIGHT) {
            self.rng.random_range(0..=self.max_instances)
        } else {
            0
        };
        let num_vars = self.rng.random_range(1..=self.max_block_members);

        if self.has(Features::DESCRIPTOR_INDEXING) {
            num_instances = self.rng.random_range(2..=4);
        }
        if num_instances > 0 {
            block.set_array_size(num_instances);
        }
        if self.use_physical_storage_buffer || num_instances > 0 || self.rng.random::<bool>() {
            block.set_instance_name(format!("block{letter}"));
        }

        let mut packing_candidates = Vec::new();
        let mut flags = LayoutFlags::empty();
        if self.has(Features::STD430_LAYOUT) {
            packing_candidates.push(LayoutFlags::STD430);
        }
        if self.has(Features::STD140_LAYOUT) {
            packing_candidates.push(LayoutFlags::STD140);
        }
        if self.has(Features::RELAXED_LAYOUT) {
            packing_candidates.push(LayoutFlags::RELAXED);
        }
        if self.has(Features::SCALAR_LAYOUT) {
            packing_candidates.push(LayoutFlags::SCALAR);
        }
        if self.has(Features::STORAGE_16BIT) {
            flags |= LayoutFlags::STORAGE_16BIT;
        }
        if self.has(Features::STORAGE_8BIT) {
            flags |= LayoutFlags::STORAGE_8BIT;
        }
        if self.has(Features::DESCRIPTOR_INDEXING) {
            flags |= LayoutFlags::DESCRIPTOR_INDEXING;
        }
        flags |= choose(&mut self.rng, &packing_candidates);

        if self.has(Features::MATRIX_LAYOUT) {
            let matrix_candidates = [
                LayoutFlags::empty(),
                LayoutFlags::ROW_MAJOR,
                LayoutFlags::COLUMN_MAJOR,
            ];
            flags |= choose(&mut self.rng, &matrix_candidates);
        }
        block.set_flags(flags);

        for var_index in 0..num_vars {
            let var = self.generate_buffer_var(var_index + 1 == num_vars);
            block.add_member(var);
        }

        let ends_with_unsized_array = block.members().last().is_some_and(|var| var.ty().is_unsized_array());
        if ends_with_unsized_array {
            for instance in 0..block.num_instances() {
                let len = self.rng.random_range(1..=self.max_array_length);
                block.set_last_unsized_array_size(instance, len);
            }
        }

        let block_name = block.name().to_string();
        *self.interface.alloc_block(block_name) = block;
        self.block_index += 1;
    }

    fn generate_buffer_var(&mut self, is_last_member: bool) -> BufferVar {
        let unused_ok = self.has(Features::UNUSED_VARS);
        let name = gen_name('a', 'z', self.buffer_var_index);
        let unsized_ok = is_last_member && self.has(Features::UNSIZED_ARRAYS);
        let ty = self.generate_type(0, 0, true, unsized_ok);

        let access = !unused_ok || self.rng.random_bool(ACCESS_WEIGHT);
        let read = access && self.rng.random_bool(READ_WEIGHT);
        let write = access && (!read || self.rng.random_bool(WRITE_WEIGHT));
        let mut flags = AccessFlags::empty();
        flags.set(AccessFlags::READ, read);
        flags.set(AccessFlags::WRITE, write);

        self.buffer_var_index += 1;
        BufferVar::new(name, ty, flags)
    }

    fn generate_type(&mut self, struct_depth: usize, array_depth: usize, array_ok: bool, unsized_array_ok: bool) -> VarType {
        assert!(array_ok || !unsized_array_ok);
        let child_array_ok = self.has(Features::ARRAYS_OF_ARRAYS) && array_depth < self.max_array_depth;

        if unsized_array_ok && self.rng.random_bool(UNSIZED_ARRAY_WEIGHT) {
            let element = self.generate_type(struct_depth, array_depth + 1, child_array_ok, false);
            VarType::unsized_array(element)
        } else if struct_depth < self.max_struct_depth && self.rng.random_bool(STRUCT_WEIGHT) {
            let num_members = self.rng.random_range(1..=self.max_struct_members);
            // Members first, so that nested structs are declared before their users.
            let member_types: Vec<VarType> = (0..num_members)
                .map(|_| {
                    self.generate_type(struct_depth + 1, array_depth, array_depth < self.max_array_depth, false)
                })
                .collect();

            let struct_name = format!("s{}", gen_name('A', 'Z', self.struct_index));
            self.struct_index += 1;
            let id = self.interface.alloc_struct(struct_name);
            let struct_type = self.interface.struct_type_mut(id);
            for (member_index, ty) in member_types.into_iter().enumerate() {
                struct_type.add_member(format!("m{}", gen_name('A', 'Z', member_index + 1)), ty);
            }
            VarType::structure(id)
        } else if self.max_array_length > 0 && array_ok && self.rng.random_bool(ARRAY_WEIGHT) {
            let len = self.rng.random_range(1..=self.max_array_length);
            let element = self.generate_type(struct_depth, array_depth + 1, child_array_ok, false);
            VarType::array(element, len)
        } else {
            let candidates = self.basic_type_candidates();
            let data_type = choose(&mut self.rng, &candidates);
            if data_type.supports_precision() {
                VarType::basic(data_type, choose(&mut self.rng, &Precision::ALL))
            } else {
                VarType::plain(data_type)
            }
        }
    }

    fn basic_type_candidates(&self) -> Vec<DataType> {
        let mut candidates = vec![DataType::FLOAT, DataType::INT, DataType::UINT, DataType::BOOL];
        let storage_16bit = [ScalarType::Uint16, ScalarType::Int16, ScalarType::Float16];
        let storage_8bit = [ScalarType::Uint8, ScalarType::Int8];

        if self.has(Features::STORAGE_16BIT) {
            candidates.extend(storage_16bit.map(DataType::Scalar));
        }
        if self.has(Features::STORAGE_8BIT) {
            candidates.extend(storage_8bit.map(DataType::Scalar));
        }

        if self.has(Features::VECTORS) {
            let mut vector_scalars = vec![ScalarType::Float, ScalarType::Int, ScalarType::Uint, ScalarType::Bool];
            if self.has(Features::STORAGE_16BIT) {
                vector_scalars.extend([ScalarType::Float16, ScalarType::Int16, ScalarType::Uint16]);
            }
            if self.has(Features::STORAGE_8BIT) {
                vector_scalars.extend([ScalarType::Int8, ScalarType::Uint8]);
            }
            for scalar in vector_scalars {
                candidates.extend((2..=4).map(|n| DataType::vec(scalar, n)));
            }
        }

        if self.has(Features::MATRICES) {
            candidates.extend(
                [(2, 2), (2, 3), (3, 2), (3, 3), (3, 4), (4, 2), (4, 3), (4, 4)]
                    .map(|(columns, rows)| DataType::mat(columns, rows)),
            );
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var_type::ArraySize;

    fn contains_unsized_array(ty: &VarType) -> bool {
        match ty {
            VarType::Array {
                size: ArraySize::Unsized,
                ..
            } => true,
            VarType::Array { element, .. } => contains_unsized_array(element),
            VarType::Basic { .. } | VarType::Struct(_) => false,
        }
    }

    #[test]
    fn names_are_bijective_base_26() {
        assert_eq!(gen_name('a', 'z', 1), "a");
        assert_eq!(gen_name('a', 'z', 26), "z");
        assert_eq!(gen_name('a', 'z', 27), "aa");
        assert_eq!(gen_name('a', 'z', 28), "ab");
        assert_eq!(gen_name('a', 'z', 26 * 27), "zz");
        assert_eq!(gen_name('a', 'z', 26 * 27 + 1), "aaa");
        assert_eq!(gen_name('A', 'Z', 2), "B");
    }

    #[test]
    fn same_seed_same_interface() {
        let features = Features::ALL_STD_LAYOUTS
            | Features::ALL_BASIC_TYPES
            | Features::STRUCTS
            | Features::ARRAYS
            | Features::UNSIZED_ARRAYS;
        let a = RandomCase::generate("a", features, 1234, false);
        let b = RandomCase::generate("b", features, 1234, false);
        assert_eq!(a.interface, b.interface);
    }

    #[test]
    fn blocks_are_named_from_b() {
        let case = RandomCase::generate("case", Features::STD430_LAYOUT, 7, true);
        let first = case.interface.block(0);
        assert_eq!(first.name(), "BlockB");
        // Physical storage buffers always need an instance name.
        assert_eq!(first.instance_name(), Some("blockB"));
        assert_eq!(first.members()[0].name(), "a");
    }

    #[test]
    fn descriptor_indexing_forces_one_instance_array() {
        for seed in 0..20 {
            let case = RandomCase::generate(
                "case",
                Features::STD430_LAYOUT | Features::VECTORS | Features::DESCRIPTOR_INDEXING,
                seed,
                false,
            );
            assert_eq!(case.interface.blocks().len(), 1);
            let block = case.interface.block(0);
            assert!((2..=4).contains(&block.array_size()));
            assert!(block.flags().contains(LayoutFlags::DESCRIPTOR_INDEXING));
        }
    }

    #[test]
    fn unsized_arrays_only_at_the_end() {
        let features = Features::ALL_STD_LAYOUTS | Features::ARRAYS | Features::UNSIZED_ARRAYS | Features::INSTANCE_ARRAYS;
        for seed in 0..50 {
            let case = RandomCase::generate("case", features, seed, false);
            for block in case.interface.blocks() {
                let (last, rest) = block.members().split_last().unwrap();
                assert!(rest.iter().all(|var| !contains_unsized_array(var.ty())));
                if last.ty().is_unsized_array() {
                    for instance in 0..block.num_instances() {
                        assert!((1..=8).contains(&block.last_unsized_array_size(instance)));
                    }
                }
            }
        }
    }
}
