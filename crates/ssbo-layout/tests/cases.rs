use pretty_assertions::assert_eq;
use ssbo_layout::cases::{self, CaseOptions, OffsetRules, PreparedCase};
use ssbo_layout::random_case::{Features, RandomCase};
use ssbo_layout::shader_gen::{MatrixLoad, MatrixStore};
use ssbo_layout::storage::{BlockLocation, BufferMode};
use ssbo_layout::{DataType, LayoutFlags, Precision, RefDataStorage, ScalarType, SsboCase, TestStatus, VarType};

fn options(layout: LayoutFlags) -> CaseOptions {
    CaseOptions {
        layout,
        ..CaseOptions::default()
    }
}

fn all_presets(options: &CaseOptions) -> Vec<SsboCase> {
    let flags_b = options.layout ^ LayoutFlags::ROW_MAJOR;
    vec![
        cases::basic_type("basic_type", options, VarType::basic(DataType::mat(2, 3), Precision::Highp), 2, false),
        cases::basic_unsized_array(
            "basic_unsized_array",
            options,
            VarType::array(VarType::plain(DataType::float_vec(3)), 2),
            5,
            false,
        ),
        cases::single_struct("single_struct", options, 0, false),
        cases::single_struct_array("single_struct_array", options, 2),
        cases::single_nested_struct("single_nested_struct", options, 0),
        cases::single_nested_struct_array("single_nested_struct_array", options, 3),
        cases::unsized_struct_array("unsized_struct_array", options, 2),
        cases::two_level_unsized_struct_array("2_level_unsized_struct_array", options, 0),
        cases::unsized_nested_struct_array("unsized_nested_struct_array", options, 2),
        cases::multi_basic_types("multi_basic_types", options, flags_b, 2),
        cases::multi_nested_struct("multi_nested_struct", options, flags_b, 0),
    ]
}

/// Passes when handed its own expected data, fails when handed the data the
/// shader should have overwritten.
fn assert_self_consistent(prepared: &PreparedCase) {
    let name = &prepared.case.name;
    let (status, report) = prepared.evaluate(1, &prepared.expected_data);
    assert!(status.is_pass(), "{name}: {report}");

    let writes_anything = prepared.case.interface.blocks().iter().any(|b| b.has_write_access());
    if writes_anything && prepared.initial_data != prepared.expected_data {
        let (status, report) = prepared.evaluate(1, &prepared.initial_data);
        assert_eq!(status, TestStatus::Fail("Result comparison failed".into()), "{name}");
        assert!(!report.is_ok());
    }
}

#[test]
fn presets_check_out_under_every_layout() {
    for layout in [
        LayoutFlags::STD140,
        LayoutFlags::STD430,
        LayoutFlags::STD430 | LayoutFlags::RELAXED,
        LayoutFlags::SCALAR,
    ] {
        for case in all_presets(&options(layout)) {
            let prepared = case.prepare();
            assert!(prepared.shader_source.contains("ac_numPassed++"));
            assert_self_consistent(&prepared);
        }
    }
}

#[test]
fn presets_run_through_buffer_references() {
    let options = CaseOptions {
        layout: LayoutFlags::STD430,
        use_physical_storage_buffer: true,
        matrix_load: MatrixLoad::Components,
        matrix_store: MatrixStore::Columns,
        ..CaseOptions::default()
    };
    for case in all_presets(&options) {
        assert!(case.requirements().buffer_device_address);
        let prepared = case.prepare();
        assert!(prepared.shader_source.contains("buffer_reference"), "{}", prepared.case.name);
        assert_self_consistent(&prepared);
    }
}

#[test]
fn preparation_is_deterministic() {
    let options = options(LayoutFlags::STD140);
    let a = cases::single_nested_struct_array("nested", &options, 2).prepare();
    let b = cases::single_nested_struct_array("nested", &options, 2).prepare();
    assert_eq!(a.shader_source, b.shader_source);
    assert_eq!(a.initial_data, b.initial_data);
    assert_eq!(a.expected_data, b.expected_data);

    let renamed = cases::single_nested_struct_array("nested_2", &options, 2).prepare();
    assert_eq!(a.layout, renamed.layout);
    assert!(a.initial_data != renamed.initial_data);
}

#[test]
fn comparison_is_symmetric() {
    let prepared = cases::single_nested_struct("single_nested_struct", &options(LayoutFlags::STD430), 0).prepare();
    let index = prepared.layout.variable_index("t.b.c").unwrap();
    let offset = prepared.layout.buffer_vars[index].offset;

    let mut result = prepared.expected_data.clone();
    let bytes = &mut result.block_bytes_mut(0)[offset..offset + 4];
    let value = f32::from_ne_bytes(bytes.try_into().unwrap()) + 1.0;
    bytes.copy_from_slice(&value.to_ne_bytes());

    let forward = prepared.compare_result(&result);
    let backward = ssbo_layout::compare_data(
        &prepared.layout,
        &result.block_ptrs(&prepared.layout),
        &prepared.layout,
        &prepared.expected_data.block_ptrs(&prepared.layout),
    );
    assert_eq!(forward.mismatched_names().collect::<Vec<_>>(), ["t.b.c"]);
    assert_eq!(
        forward.mismatched_names().collect::<Vec<_>>(),
        backward.mismatched_names().collect::<Vec<_>>()
    );
    assert_eq!(forward.mismatches[0].details[0].top_level_index, 0);
}

#[test]
fn result_bytes_must_match_the_layout() {
    let prepared = cases::unsized_struct_array("unsized", &options(LayoutFlags::STD430), 0).prepare();
    let bytes = prepared.expected_data.as_bytes();
    assert!(RefDataStorage::with_contents(&prepared.sizes, bytes).is_some());
    assert!(RefDataStorage::with_contents(&prepared.sizes, &bytes[4..]).is_none());
}

#[test]
fn counter_and_comparison_both_decide() {
    let prepared = cases::single_struct("single_struct", &options(LayoutFlags::STD430), 0, false).prepare();
    let (status, _) = prepared.evaluate(2, &prepared.initial_data);
    assert_eq!(
        status,
        TestStatus::Fail("Result comparison and counter values are incorrect".into())
    );
    let (status, _) = prepared.evaluate(1, &prepared.expected_data);
    assert_eq!(
        status,
        TestStatus::Pass("Result comparison and counter values are OK".into())
    );
}

#[test]
fn basic_type_shader_text() {
    let case = cases::basic_type(
        "float",
        &options(LayoutFlags::STD430),
        VarType::basic(DataType::FLOAT, Precision::Highp),
        0,
        true,
    );
    let prepared = case.prepare();
    let src = &prepared.shader_source;

    assert!(src.starts_with("#version 310 es\n"), "{src}");
    assert!(src.contains("layout(std140, binding = 0) buffer AcBlock { highp uint ac_numPassed; };\n"));
    assert!(
        src.contains("layout(std430, binding = 1) readonly buffer Block\n{\n\thighp float var;\n};\n"),
        "{src}"
    );
    assert!(src.contains("compare_float((var), "), "{src}");
    assert_eq!(prepared.offset_rules, OffsetRules::Standard);
}

#[test]
fn single_buffer_mode_packs_instances_at_binding_alignment() {
    let options = CaseOptions {
        layout: LayoutFlags::STD140,
        buffer_mode: BufferMode::Single,
        ..CaseOptions::default()
    };
    let prepared = cases::multi_basic_types("multi", &options, LayoutFlags::STD430, 2).prepare();
    let locations = prepared.block_locations(64);

    assert_eq!(locations.len(), 4);
    let mut expected_offset = 0usize;
    for (location, &size) in locations.iter().zip(&prepared.sizes) {
        let offset = expected_offset.next_multiple_of(64);
        assert_eq!(*location, BlockLocation { buffer: 0, offset, size });
        expected_offset = offset + size;
    }
}

#[test]
fn eight_bit_scalar_layout_needs_both_features() {
    let case = cases::basic_type(
        "i8vec3",
        &options(LayoutFlags::SCALAR),
        VarType::plain(DataType::vec(ScalarType::Int8, 3)),
        0,
        false,
    );
    let requirements = case.requirements();
    assert!(requirements.scalar_block_layout);
    assert!(requirements.storage_buffer_8bit_access);
    assert_eq!(case.offset_rules(), OffsetRules::Scalar);
    assert_self_consistent(&case.prepare());
}

#[test]
fn random_cases_check_out() {
    let feature_sets = [
        Features::ALL_STD_LAYOUTS | Features::ALL_BASIC_TYPES | Features::STRUCTS | Features::ARRAYS,
        Features::ALL_STD_LAYOUTS
            | Features::ALL_BASIC_TYPES
            | Features::MATRIX_LAYOUT
            | Features::NESTED_STRUCTS
            | Features::STRUCTS
            | Features::INSTANCE_ARRAYS
            | Features::UNSIZED_ARRAYS
            | Features::UNUSED,
        Features::SCALAR_LAYOUT
            | Features::ALL_BASIC_TYPES
            | Features::STORAGE_16BIT
            | Features::STORAGE_8BIT
            | Features::ARRAYS
            | Features::ARRAYS_OF_ARRAYS,
        Features::STD430_LAYOUT
            | Features::RELAXED_LAYOUT
            | Features::VECTORS
            | Features::DESCRIPTOR_INDEXING
            | Features::UNSIZED_ARRAYS,
    ];

    for features in feature_sets {
        for seed in 0..16 {
            let prepared =
                RandomCase::generate(format!("random_{seed}"), features, seed, seed % 2 == 1).prepare();
            let (status, report) = prepared.evaluate(1, &prepared.expected_data);
            assert!(status.is_pass(), "{features:?} seed {seed}: {report}");
        }
    }
}
