//! Recursive shader variable types.

use crate::data_type::{DataType, Precision};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Index of a [`StructType`] in the struct arena of the interface that declared it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructId(pub(crate) usize);

impl StructId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArraySize {
    Sized(usize),
    /// Runtime-sized; only valid as the last member of a block.
    Unsized,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    Basic {
        data_type: DataType,
        precision: Option<Precision>,
    },
    Array {
        element: Box<VarType>,
        size: ArraySize,
    },
    Struct(StructId),
}

impl VarType {
    pub fn basic(data_type: DataType, precision: Precision) -> Self {
        VarType::Basic {
            data_type,
            precision: Some(precision),
        }
    }

    /// A basic type without a precision qualifier.
    pub fn plain(data_type: DataType) -> Self {
        VarType::Basic {
            data_type,
            precision: None,
        }
    }

    pub fn array(element: VarType, size: usize) -> Self {
        assert!(size > 0, "sized arrays need at least one element");
        VarType::Array {
            element: Box::new(element),
            size: ArraySize::Sized(size),
        }
    }

    pub fn unsized_array(element: VarType) -> Self {
        VarType::Array {
            element: Box::new(element),
            size: ArraySize::Unsized,
        }
    }

    pub fn structure(id: StructId) -> Self {
        VarType::Struct(id)
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, VarType::Basic { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, VarType::Array { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, VarType::Struct(_))
    }

    pub fn basic_type(&self) -> Option<DataType> {
        match self {
            VarType::Basic { data_type, .. } => Some(*data_type),
            _ => None,
        }
    }

    pub fn is_unsized_array(&self) -> bool {
        matches!(
            self,
            VarType::Array {
                size: ArraySize::Unsized,
                ..
            }
        )
    }

    /// The basic type found by stripping every array dimension, if any.
    pub fn innermost_basic_type(&self) -> Option<DataType> {
        match self {
            VarType::Basic { data_type, .. } => Some(*data_type),
            VarType::Array { element, .. } => element.innermost_basic_type(),
            VarType::Struct(_) => None,
        }
    }

    /// Calls `f` for every basic type reachable from this type, through arrays and
    /// struct members.
    pub fn visit_basic_types(&self, structs: &[StructType], f: &mut impl FnMut(DataType)) {
        match self {
            VarType::Basic { data_type, .. } => f(*data_type),
            VarType::Array { element, .. } => element.visit_basic_types(structs, f),
            VarType::Struct(id) => {
                for member in structs[id.0].members() {
                    member.ty.visit_basic_types(structs, f);
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    pub ty: VarType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    name: String,
    members: Vec<StructMember>,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[StructMember] {
        &self.members
    }

    pub fn member(&self, index: usize) -> &StructMember {
        &self.members[index]
    }

    pub fn add_member(&mut self, name: impl Into<String>, ty: VarType) -> &mut Self {
        self.members.push(StructMember {
            name: name.into(),
            ty,
        });
        self
    }
}

/// GLSL declaration of a variable, e.g. `highp vec3 v`, `S s[2]` or `float a[][4]`.
pub fn declare(ty: &VarType, structs: &[StructType], name: &str) -> String {
    let mut dims = String::new();
    let mut cur = ty;
    while let VarType::Array { element, size } = cur {
        match size {
            ArraySize::Sized(n) => write!(dims, "[{n}]").unwrap(),
            ArraySize::Unsized => dims.push_str("[]"),
        }
        cur = element;
    }

    let base = match cur {
        VarType::Basic {
            data_type,
            precision: Some(precision),
        } => format!("{precision} {data_type}"),
        VarType::Basic {
            data_type,
            precision: None,
        } => data_type.name(),
        VarType::Struct(id) => structs[id.0].name().to_string(),
        VarType::Array { .. } => unreachable!(),
    };

    format!("{base} {name}{dims}")
}

/// GLSL declaration of a named struct, without the trailing `;`.
pub fn declare_struct(struct_type: &StructType, structs: &[StructType]) -> String {
    let mut src = format!("struct {}\n{{\n", struct_type.name());
    for member in struct_type.members() {
        writeln!(src, "\t{};", declare(&member.ty, structs, &member.name)).unwrap();
    }
    src.push('}');
    src
}
