//! Access paths from a block member down to its basic-typed leaves, and the
//! names under which a leaf is known to the API and to the shader.

use crate::data_type::DataType;
use crate::interface::{BufferBlock, BufferVar, LayoutFlags};
use crate::layout::BufferVarLayoutEntry;
use crate::var_type::{ArraySize, StructType, VarType};
use std::fmt::Write as _;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessStep {
    Member(usize),
    Element(usize),
}

/// Calls `f` with the path and type of every basic-typed leaf of `ty`, in
/// declaration order. Runtime-sized arrays are walked `unsized_array_size` times.
pub fn for_each_leaf(
    structs: &[StructType],
    ty: &VarType,
    unsized_array_size: usize,
    f: &mut impl FnMut(&[AccessStep], DataType),
) {
    fn walk(
        structs: &[StructType],
        ty: &VarType,
        unsized_array_size: usize,
        path: &mut Vec<AccessStep>,
        f: &mut impl FnMut(&[AccessStep], DataType),
    ) {
        match ty {
            VarType::Basic { data_type, .. } => f(path, *data_type),
            VarType::Array { element, size } => {
                let len = match *size {
                    ArraySize::Sized(n) => n,
                    ArraySize::Unsized => unsized_array_size,
                };
                for elem in 0..len {
                    path.push(AccessStep::Element(elem));
                    walk(structs, element, unsized_array_size, path, f);
                    path.pop();
                }
            }
            VarType::Struct(id) => {
                for (member_index, member) in structs[id.index()].members().iter().enumerate() {
                    path.push(AccessStep::Member(member_index));
                    walk(structs, &member.ty, unsized_array_size, path, f);
                    path.pop();
                }
            }
        }
    }

    walk(structs, ty, unsized_array_size, &mut Vec::new(), f);
}

fn append_path(name: &mut String, structs: &[StructType], ty: &VarType, path: &[AccessStep], api: bool) {
    let mut cur = ty;
    for (i, step) in path.iter().enumerate() {
        match (*step, cur) {
            (AccessStep::Member(member_index), VarType::Struct(id)) => {
                let member = structs[id.index()].member(member_index);
                name.push('.');
                name.push_str(&member.name);
                cur = &member.ty;
            }
            (AccessStep::Element(elem), VarType::Array { element, .. }) => {
                // The layout only has entries for the first top- and bottom-level element.
                if api && (i == 0 || i + 1 == path.len()) {
                    name.push_str("[0]");
                } else {
                    write!(name, "[{elem}]").unwrap();
                }
                cur = element;
            }
            (step, _) => panic!("access step {step:?} does not match type {cur:?}"),
        }
    }
}

/// Name of the layout entry describing the leaf, e.g. `Block.s[0].b[2].c[0]`.
pub fn api_name(block: &BufferBlock, var: &BufferVar, structs: &[StructType], path: &[AccessStep]) -> String {
    let mut name = String::new();
    if block.instance_name().is_some() {
        name.push_str(block.name());
        name.push('.');
    }
    name.push_str(var.name());
    append_path(&mut name, structs, var.ty(), path, true);
    name
}

/// GLSL expression naming the leaf in one block instance, e.g. `block[1].s[3].b[2].c[1]`.
pub fn shader_name(
    block: &BufferBlock,
    instance: usize,
    var: &BufferVar,
    structs: &[StructType],
    path: &[AccessStep],
) -> String {
    let mut name = String::new();
    match block.instance_name() {
        Some(instance_name) => {
            name.push_str(instance_name);
            if block.flags().contains(LayoutFlags::DESCRIPTOR_INDEXING) {
                write!(name, "[nonuniformEXT({instance})]").unwrap();
            } else if block.is_array() {
                write!(name, "[{instance}]").unwrap();
            }
            name.push('.');
        }
        None => assert_eq!(instance, 0, "block {} has no instance name", block.name()),
    }
    name.push_str(var.name());
    append_path(&mut name, structs, var.ty(), path, false);
    name
}

/// Byte offset of the leaf within its block instance.
pub fn compute_offset(entry: &BufferVarLayoutEntry, path: &[AccessStep]) -> usize {
    let top_level_index = match path.first() {
        Some(AccessStep::Element(i)) if path.len() > 1 => *i,
        _ => 0,
    };
    let bottom_level_index = match path.last() {
        Some(AccessStep::Element(i)) => *i,
        _ => 0,
    };
    entry.offset + entry.top_level_array_stride * top_level_index + entry.array_stride * bottom_level_index
}
