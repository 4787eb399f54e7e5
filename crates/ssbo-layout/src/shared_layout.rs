//! Structs placed in workgroup `shared` memory.
//!
//! The compiler picks the offsets of shared variables, so unlike buffer blocks
//! there is no byte layout to compute. What remains is a flat list of entries per
//! member, each holding one literal per array element. The shader writes every
//! literal, synchronizes the workgroup and reads every literal back.

use crate::data_type::DataType;
use crate::literal::{imm_matrix_src, imm_scalar_vector_src};
use crate::values::generate_component;
use crate::var_type::{ArraySize, StructId, StructType, VarType, declare, declare_struct};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

/// One run of values of a single basic type. `array_size` is 0 for a
/// non-array value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedStructVarEntry {
    pub data_type: DataType,
    pub array_size: usize,
    pub values: Vec<String>,
}

impl SharedStructVarEntry {
    pub fn num_elements(&self) -> usize {
        self.array_size.max(1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedStructVar {
    pub name: String,
    pub ty: VarType,
    pub entries: Vec<SharedStructVarEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedStruct {
    name: String,
    instance_name: String,
    members: Vec<SharedStructVar>,
}

impl SharedStruct {
    pub fn new(name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_name: instance_name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn members(&self) -> &[SharedStructVar] {
        &self.members
    }

    pub fn add_member(&mut self, name: impl Into<String>, ty: VarType) -> &mut Self {
        self.members.push(SharedStructVar {
            name: name.into(),
            ty,
            entries: Vec::new(),
        });
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedInterface {
    structs: Vec<StructType>,
    shared: Vec<SharedStruct>,
}

impl SharedInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_struct(&mut self, name: impl Into<String>) -> StructId {
        self.structs.push(StructType::new(name));
        StructId(self.structs.len() - 1)
    }

    pub fn struct_type_mut(&mut self, id: StructId) -> &mut StructType {
        &mut self.structs[id.index()]
    }

    pub fn named_structs(&self) -> &[StructType] {
        &self.structs
    }

    pub fn alloc_shared(&mut self, name: impl Into<String>, instance_name: impl Into<String>) -> &mut SharedStruct {
        let index = self.shared.len();
        self.shared.push(SharedStruct::new(name, instance_name));
        &mut self.shared[index]
    }

    pub fn shared_structs(&self) -> &[SharedStruct] {
        &self.shared
    }

    pub fn uses_16bit_types(&self) -> bool {
        self.any_basic_type(DataType::is_16bit)
    }

    pub fn uses_8bit_types(&self) -> bool {
        self.any_basic_type(DataType::is_8bit)
    }

    fn any_basic_type(&self, pred: impl Fn(DataType) -> bool) -> bool {
        let mut found = false;
        for var in self.shared.iter().flat_map(|s| &s.members) {
            var.ty.visit_basic_types(&self.structs, &mut |ty| found |= pred(ty));
        }
        found
    }

    /// Computes the entries of every member and fills them with literals drawn
    /// from one generator seeded with `seed`.
    pub fn generate_values(&mut self, seed: u32) {
        let mut rng = StdRng::seed_from_u64(u64::from(seed));
        let structs = &self.structs;

        for shared in &mut self.shared {
            for var in &mut shared.members {
                var.entries = compute_shared_entries(structs, &var.ty)
                    .into_iter()
                    .map(|(data_type, array_size)| SharedStructVarEntry {
                        data_type,
                        array_size,
                        values: (0..array_size.max(1))
                            .map(|_| generate_literal(data_type, &mut rng))
                            .collect(),
                    })
                    .collect();
                debug!(shared = %shared.name, var = %var.name, entries = var.entries.len(), "shared entries");
            }
        }
    }
}

/// `(data_type, array_size)` of every entry of `ty`, in declaration order.
///
/// Arrays of basic types are one entry; arrays of aggregates are unrolled per
/// element and struct members are flattened into the parent list.
pub fn compute_shared_entries(structs: &[StructType], ty: &VarType) -> Vec<(DataType, usize)> {
    match ty {
        VarType::Basic { data_type, .. } => vec![(*data_type, 0)],
        VarType::Array { element, size } => {
            let ArraySize::Sized(size) = *size else {
                panic!("shared variables cannot be runtime-sized arrays");
            };
            match element.basic_type() {
                Some(data_type) => vec![(data_type, size)],
                None => (0..size).flat_map(|_| compute_shared_entries(structs, element)).collect(),
            }
        }
        VarType::Struct(id) => structs[id.index()]
            .members()
            .iter()
            .flat_map(|member| compute_shared_entries(structs, &member.ty))
            .collect(),
    }
}

/// Random literal for a value of `data_type`, e.g. `vec2(3.0, -7.0)`.
pub fn generate_literal(data_type: DataType, rng: &mut impl Rng) -> String {
    let scalar = data_type.scalar_type();
    let comp_size = scalar.byte_size();
    let mut bytes = vec![0u8; data_type.byte_size()];
    for comp in 0..data_type.scalar_size() {
        generate_component(scalar, &mut bytes, comp * comp_size, rng);
    }

    match data_type.matrix_rows() {
        Some(rows) => imm_matrix_src(data_type, rows * comp_size, false, None, &bytes),
        None => imm_scalar_vector_src(data_type, &bytes),
    }
}

/// Calls `f` with the GLSL name, type and literal of every value of `ty`, taking
/// entries from `entries` in the same order [`compute_shared_entries`] produced them.
fn for_each_value<'a>(
    structs: &[StructType],
    ty: &VarType,
    name: &str,
    entries: &mut impl Iterator<Item = &'a SharedStructVarEntry>,
    f: &mut impl FnMut(&str, DataType, &str),
) {
    match ty {
        VarType::Basic { .. } => {
            let entry = next_entry(entries, name);
            f(name, entry.data_type, &entry.values[0]);
        }
        VarType::Array { element, size } if element.is_basic() => {
            let entry = next_entry(entries, name);
            assert_eq!(*size, ArraySize::Sized(entry.array_size));
            assert_eq!(entry.values.len(), entry.num_elements());
            for (i, value) in entry.values.iter().enumerate() {
                f(&format!("{name}[{i}]"), entry.data_type, value);
            }
        }
        VarType::Array { element, size } => {
            let ArraySize::Sized(size) = *size else {
                unreachable!()
            };
            for i in 0..size {
                for_each_value(structs, element, &format!("{name}[{i}]"), entries, f);
            }
        }
        VarType::Struct(id) => {
            for member in structs[id.index()].members() {
                for_each_value(structs, &member.ty, &format!("{name}.{}", member.name), entries, f);
            }
        }
    }
}

fn next_entry<'a>(entries: &mut impl Iterator<Item = &'a SharedStructVarEntry>, name: &str) -> &'a SharedStructVarEntry {
    entries
        .next()
        .unwrap_or_else(|| panic!("no entry left for {name}"))
}

fn for_each_shared_value(interface: &SharedInterface, mut f: impl FnMut(&str, DataType, &str)) {
    for shared in interface.shared_structs() {
        for var in shared.members() {
            let mut entries = var.entries.iter();
            let name = format!("{}.{}", shared.instance_name(), var.name);
            for_each_value(interface.named_structs(), &var.ty, &name, &mut entries, &mut f);
            assert!(entries.next().is_none(), "unused entries left for {name}");
        }
    }
}

/// Literal converted to the stored type where the literal is of a promoted one.
fn typed_literal(data_type: DataType, literal: &str) -> String {
    if data_type.promote_type() != data_type {
        format!("{data_type}({literal})")
    } else {
        literal.to_string()
    }
}

/// Compute shader that writes every generated value to shared memory, then
/// counts itself as passed if all of them read back unchanged.
pub fn generate_shared_compute_shader(interface: &SharedInterface) -> String {
    let structs = interface.named_structs();
    let mut src = String::from("#version 450\n");
    if interface.uses_16bit_types() || interface.uses_8bit_types() {
        src.push_str("#extension GL_EXT_shader_explicit_arithmetic_types : enable\n");
    }
    src.push_str("layout(local_size_x = 1) in;\n\n");
    src.push_str("layout(std430, binding = 0) buffer AcBlock { highp uint ac_numPassed; };\n\n");

    for struct_type in structs {
        src.push_str(&declare_struct(struct_type, structs));
        src.push_str(";\n");
    }

    for shared in interface.shared_structs() {
        writeln!(src, "struct {}\n{{", shared.name()).unwrap();
        for var in shared.members() {
            writeln!(src, "\t{};", declare(&var.ty, structs, &var.name)).unwrap();
        }
        src.push_str("};\n");
        writeln!(src, "shared {} {};", shared.name(), shared.instance_name()).unwrap();
    }

    src.push_str("\nvoid main (void)\n{\n");
    for_each_shared_value(interface, |name, data_type, literal| {
        writeln!(src, "\t{name} = {};", typed_literal(data_type, literal)).unwrap();
    });

    src.push_str("\n\tmemoryBarrierShared();\n\tbarrier();\n\n\tbool allOk = true;\n");
    for_each_shared_value(interface, |name, data_type, literal| {
        writeln!(src, "\tallOk = allOk && ({name} == {});", typed_literal(data_type, literal)).unwrap();
    });

    src.push_str("\tif (allOk)\n\t\tac_numPassed++;\n}\n");
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::{Precision, ScalarType};
    use pretty_assertions::assert_eq;

    #[test]
    fn arrays_of_basic_types_are_one_entry() {
        let ty = VarType::array(VarType::plain(DataType::float_vec(3)), 4);
        assert_eq!(compute_shared_entries(&[], &ty), [(DataType::float_vec(3), 4)]);
    }

    #[test]
    fn aggregates_are_unrolled_and_flattened() {
        let mut interface = SharedInterface::new();
        let s = interface.alloc_struct("S");
        interface
            .struct_type_mut(s)
            .add_member("a", VarType::plain(DataType::INT))
            .add_member("b", VarType::array(VarType::plain(DataType::UINT), 2));
        let ty = VarType::array(VarType::structure(s), 2);

        assert_eq!(
            compute_shared_entries(interface.named_structs(), &ty),
            [
                (DataType::INT, 0),
                (DataType::UINT, 2),
                (DataType::INT, 0),
                (DataType::UINT, 2)
            ]
        );
    }

    #[test]
    fn shader_writes_then_checks_every_value() {
        let mut interface = SharedInterface::new();
        interface
            .alloc_shared("Data", "data")
            .add_member("f", VarType::basic(DataType::FLOAT, Precision::Highp))
            .add_member("u", VarType::array(VarType::plain(DataType::vec(ScalarType::Uint8, 2)), 2));
        interface.generate_values(1);

        let shared = &interface.shared_structs()[0];
        let f = &shared.members()[0].entries[0].values[0];
        let u = &shared.members()[1].entries[0].values;
        assert_eq!(u.len(), 2);

        let src = generate_shared_compute_shader(&interface);
        assert!(src.starts_with("#version 450\n#extension GL_EXT_shader_explicit_arithmetic_types : enable\n"));
        assert!(src.contains("struct Data\n{\n\thighp float f;\n\tu8vec2 u[2];\n};\nshared Data data;\n"));
        assert!(src.contains(&format!("\tdata.f = {f};\n")));
        assert!(src.contains(&format!("\tdata.u[1] = u8vec2({});\n", u[1])));
        assert!(src.contains(&format!("\tallOk = allOk && (data.u[0] == u8vec2({}));\n", u[0])));

        let barrier = src.find("barrier();").unwrap();
        assert!(src.find("\tdata.f = ").unwrap() < barrier);
        assert!(src.find("(data.f == ").unwrap() > barrier);
    }

    #[test]
    fn literals_are_deterministic() {
        let build = || {
            let mut interface = SharedInterface::new();
            interface
                .alloc_shared("Data", "data")
                .add_member("m", VarType::plain(DataType::mat(2, 3)));
            interface.generate_values(99);
            interface
        };
        assert_eq!(build(), build());
        let built = build();
        let literal = &built.shared_structs()[0].members()[0].entries[0].values[0];
        assert!(literal.starts_with("mat2x3("));
    }
}
