use pretty_assertions::assert_eq;
use ssbo_layout::shared_layout::{SharedInterface, generate_shared_compute_shader};
use ssbo_layout::{DataType, Precision, ScalarType, VarType};

/// `struct S { int a; vec2 b[2]; }` inside `shared Data { S s[2]; uint c; mat2 m; }`.
fn nested_interface(seed: u32) -> SharedInterface {
    let mut interface = SharedInterface::new();
    let s = interface.alloc_struct("S");
    interface
        .struct_type_mut(s)
        .add_member("a", VarType::basic(DataType::INT, Precision::Highp))
        .add_member(
            "b",
            VarType::array(VarType::basic(DataType::float_vec(2), Precision::Mediump), 2),
        );
    interface
        .alloc_shared("Data", "data")
        .add_member("s", VarType::array(VarType::structure(s), 2))
        .add_member("c", VarType::basic(DataType::UINT, Precision::Highp))
        .add_member("m", VarType::plain(DataType::mat(2, 2)));
    interface.generate_values(seed);
    interface
}

#[test]
fn every_value_is_written_then_checked() {
    let interface = nested_interface(5);
    let src = generate_shared_compute_shader(&interface);

    let names = [
        "data.s[0].a",
        "data.s[0].b[0]",
        "data.s[0].b[1]",
        "data.s[1].a",
        "data.s[1].b[0]",
        "data.s[1].b[1]",
        "data.c",
        "data.m",
    ];
    let barrier = src.find("\tmemoryBarrierShared();\n\tbarrier();\n").unwrap();
    let mut last_write = 0;
    let mut last_check = barrier;
    for name in names {
        let write = src.find(&format!("\t{name} = ")).unwrap_or_else(|| panic!("{name} not written"));
        let check = src
            .find(&format!("({name} == "))
            .unwrap_or_else(|| panic!("{name} not checked"));
        assert!(last_write < write && write < barrier, "{name}");
        assert!(last_check < check, "{name}");
        last_write = write;
        last_check = check;
    }
    assert!(src.ends_with("\tif (allOk)\n\t\tac_numPassed++;\n}\n"));
}

#[test]
fn declarations_precede_main() {
    let src = generate_shared_compute_shader(&nested_interface(5));
    let expected_prefix = "#version 450\n\
        layout(local_size_x = 1) in;\n\
        \n\
        layout(std430, binding = 0) buffer AcBlock { highp uint ac_numPassed; };\n\
        \n\
        struct S\n{\n\thighp int a;\n\tmediump vec2 b[2];\n};\n\
        struct Data\n{\n\tS s[2];\n\thighp uint c;\n\tmat2 m;\n};\n\
        shared Data data;\n\
        \n\
        void main (void)\n{\n";
    assert_eq!(&src[..expected_prefix.len()], expected_prefix);
}

#[test]
fn integer_literals_stay_in_range() {
    let mut interface = SharedInterface::new();
    interface
        .alloc_shared("Ints", "ints")
        .add_member("i", VarType::array(VarType::plain(DataType::INT), 8))
        .add_member("u", VarType::array(VarType::plain(DataType::UINT), 8))
        .add_member("b", VarType::array(VarType::plain(DataType::vec(ScalarType::Bool, 2)), 8));
    interface.generate_values(77);

    let members = interface.shared_structs()[0].members();
    for value in &members[0].entries[0].values {
        let value: i32 = value.parse().unwrap();
        assert!((-9..=9).contains(&value), "{value}");
    }
    for value in &members[1].entries[0].values {
        let value: u32 = value.strip_suffix('u').unwrap().parse().unwrap();
        assert!(value <= 9, "{value}");
    }
    for value in &members[2].entries[0].values {
        let components = value.strip_prefix("bvec2(").unwrap().strip_suffix(')').unwrap();
        for component in components.split(", ") {
            assert!(component == "true" || component == "false", "{value}");
        }
    }
}

#[test]
fn values_depend_only_on_the_seed() {
    assert_eq!(nested_interface(3), nested_interface(3));
    let a = generate_shared_compute_shader(&nested_interface(3));
    let b = generate_shared_compute_shader(&nested_interface(4));
    assert!(a != b);
}
