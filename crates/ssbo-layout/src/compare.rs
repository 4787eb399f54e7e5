//! Comparison of result buffers against reference buffers.

use crate::data_type::{DataType, ScalarType};
use crate::layout::{BufferLayout, BufferVarLayoutEntry};
use crate::literal::{imm_matrix_src, imm_scalar_vector_src, read};
use crate::storage::BlockDataPtr;
use serde::Serialize;
use std::fmt;
use tracing::error;

/// Mismatches reported in detail per variable; later ones are only counted.
pub const MAX_DETAILED_MISMATCHES: usize = 3;

const FLOAT_THRESHOLD: f32 = 0.05;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub top_level_index: usize,
    pub bottom_level_index: usize,
    pub expected: String,
    pub got: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VarMismatch {
    pub name: String,
    pub num_failed: usize,
    pub details: Vec<Mismatch>,
}

impl fmt::Display for VarMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for detail in &self.details {
            writeln!(
                f,
                "ERROR: mismatch in {}, top-level ndx {}, bottom-level ndx {}:\n  expected {}\n  got {}",
                self.name, detail.top_level_index, detail.bottom_level_index, detail.expected, detail.got
            )?;
        }
        if self.num_failed > MAX_DETAILED_MISMATCHES {
            writeln!(f, "... ({} failures for {} in total)", self.num_failed, self.name)?;
        }
        Ok(())
    }
}

/// Outcome of [`compare_data`]: one record per variable with at least one mismatch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompareReport {
    pub mismatches: Vec<VarMismatch>,
}

impl CompareReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn mismatched_names(&self) -> impl Iterator<Item = &str> {
        self.mismatches.iter().map(|m| m.name.as_str())
    }
}

impl fmt::Display for CompareReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return writeln!(f, "all variables match");
        }
        for mismatch in &self.mismatches {
            write!(f, "{mismatch}")?;
        }
        Ok(())
    }
}

/// Compares `num_comps` consecutive components of type `scalar`.
pub fn compare_components(scalar: ScalarType, reference: &[u8], result: &[u8], num_comps: usize) -> bool {
    let len = num_comps * scalar.byte_size();
    match scalar {
        ScalarType::Float => (0..num_comps).all(|i| {
            let (a, b): (f32, f32) = (read(reference, i * 4), read(result, i * 4));
            (b - a).abs() < FLOAT_THRESHOLD
        }),
        ScalarType::Bool => (0..num_comps).all(|i| {
            let (a, b): (u32, u32) = (read(reference, i * 4), read(result, i * 4));
            (a != 0) == (b != 0)
        }),
        ScalarType::Int
        | ScalarType::Uint
        | ScalarType::Float16
        | ScalarType::Int8
        | ScalarType::Uint8
        | ScalarType::Int16
        | ScalarType::Uint16 => reference[..len] == result[..len],
    }
}

fn element_literal(entry: &BufferVarLayoutEntry, element: &[u8]) -> String {
    match entry.data_type {
        DataType::Matrix { .. } => {
            imm_matrix_src(entry.data_type, entry.matrix_stride, entry.is_row_major, None, element)
        }
        ty => imm_scalar_vector_src(ty, element),
    }
}

/// Compares every element of one variable, returning `None` when all match.
pub fn compare_buffer_var_data(
    ref_entry: &BufferVarLayoutEntry,
    ref_block: BlockDataPtr<'_>,
    res_entry: &BufferVarLayoutEntry,
    res_block: BlockDataPtr<'_>,
) -> Option<VarMismatch> {
    assert_eq!(ref_entry.data_type, res_entry.data_type);
    assert!(res_block.last_unsized_array_size <= ref_block.last_unsized_array_size);

    let data_type = res_entry.data_type;
    let scalar = data_type.scalar_type();
    let mut mismatch = VarMismatch {
        name: ref_entry.name.clone(),
        num_failed: 0,
        details: Vec::new(),
    };

    for (top, elem, res_offset) in res_entry.element_offsets(res_block.last_unsized_array_size) {
        let ref_offset = ref_entry.element_offset(top, elem);
        let ref_elem = &ref_block.data[ref_offset..];
        let res_elem = &res_block.data[res_offset..];

        let is_ok = match (data_type.matrix_columns(), data_type.matrix_rows()) {
            (Some(columns), Some(rows)) => (0..columns).all(|col| {
                (0..rows).all(|row| {
                    compare_components(
                        scalar,
                        &ref_elem[ref_entry.matrix_component_offset(col, row)..],
                        &res_elem[res_entry.matrix_component_offset(col, row)..],
                        1,
                    )
                })
            }),
            _ => compare_components(scalar, ref_elem, res_elem, data_type.scalar_size()),
        };

        if !is_ok {
            mismatch.num_failed += 1;
            if mismatch.num_failed <= MAX_DETAILED_MISMATCHES {
                let detail = Mismatch {
                    top_level_index: top,
                    bottom_level_index: elem,
                    expected: element_literal(ref_entry, ref_elem),
                    got: element_literal(res_entry, res_elem),
                };
                error!(
                    "ERROR: mismatch in {}, top-level ndx {top}, bottom-level ndx {elem}:\n  expected {}\n  got {}",
                    ref_entry.name, detail.expected, detail.got
                );
                mismatch.details.push(detail);
            }
        }
    }

    if mismatch.num_failed > MAX_DETAILED_MISMATCHES {
        error!(
            "... ({} failures for {} in total)",
            mismatch.num_failed, ref_entry.name
        );
    }

    (mismatch.num_failed > 0).then_some(mismatch)
}

/// Compares every variable of the reference layout that also exists in the
/// result layout. Blocks and variables are matched by name.
pub fn compare_data(
    ref_layout: &BufferLayout,
    ref_blocks: &[BlockDataPtr<'_>],
    res_layout: &BufferLayout,
    res_blocks: &[BlockDataPtr<'_>],
) -> CompareReport {
    assert_eq!(ref_layout.blocks.len(), ref_blocks.len());
    let mut report = CompareReport::default();

    for (ref_block, &ref_ptr) in ref_layout.blocks.iter().zip(ref_blocks) {
        let Some(res_block_index) = res_layout.block_index(&ref_block.name) else {
            continue;
        };
        let res_ptr = res_blocks[res_block_index];

        for &ref_var_index in &ref_block.active_var_indices {
            let ref_entry = &ref_layout.buffer_vars[ref_var_index];
            let Some(res_var_index) = res_layout.variable_index(&ref_entry.name) else {
                continue;
            };
            let res_entry = &res_layout.buffer_vars[res_var_index];

            report
                .mismatches
                .extend(compare_buffer_var_data(ref_entry, ref_ptr, res_entry, res_ptr));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::write;

    fn float_array_entry(array_size: usize) -> BufferVarLayoutEntry {
        BufferVarLayoutEntry {
            name: "a[0]".into(),
            data_type: DataType::FLOAT,
            block_index: 0,
            offset: 0,
            array_size,
            array_stride: 4,
            matrix_stride: 0,
            top_level_array_size: 1,
            top_level_array_stride: 0,
            is_row_major: false,
        }
    }

    fn ptr(data: &[u8]) -> BlockDataPtr<'_> {
        BlockDataPtr {
            data,
            last_unsized_array_size: 0,
        }
    }

    #[test]
    fn float_tolerance() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        write(&mut a, 0, 1.0f32);
        write(&mut b, 0, 1.04f32);
        assert!(compare_components(ScalarType::Float, &a, &b, 1));
        write(&mut b, 0, 1.05f32);
        assert!(!compare_components(ScalarType::Float, &a, &b, 1));
    }

    #[test]
    fn bools_compare_truthiness() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        write(&mut a, 0, 1u32);
        write(&mut b, 0, 0xdead_beefu32);
        assert!(compare_components(ScalarType::Bool, &a, &b, 1));
        write(&mut b, 0, 0u32);
        assert!(!compare_components(ScalarType::Bool, &a, &b, 1));
    }

    #[test]
    fn details_are_capped() {
        let entry = float_array_entry(5);
        let reference = [0u8; 20];
        let mut result = [0u8; 20];
        for i in 0..5 {
            write(&mut result, i * 4, 2.0f32);
        }

        let mismatch = compare_buffer_var_data(&entry, ptr(&reference), &entry, ptr(&result)).unwrap();
        assert_eq!(mismatch.num_failed, 5);
        assert_eq!(mismatch.details.len(), MAX_DETAILED_MISMATCHES);
        assert_eq!(mismatch.details[1].bottom_level_index, 1);
        assert_eq!(mismatch.details[0].expected, "0.0");
        assert_eq!(mismatch.details[0].got, "2.0");

        let text = mismatch.to_string();
        assert!(text.starts_with("ERROR: mismatch in a[0], top-level ndx 0, bottom-level ndx 0:\n  expected 0.0\n  got 2.0\n"));
        assert!(text.ends_with("... (5 failures for a[0] in total)\n"));
    }

    #[test]
    fn missing_variables_are_skipped() {
        let entry = float_array_entry(1);
        let ref_layout = BufferLayout {
            buffer_vars: vec![entry],
            blocks: vec![crate::layout::BlockLayoutEntry {
                name: "Block".into(),
                size: 4,
                active_var_indices: vec![0],
            }],
        };
        let res_layout = BufferLayout {
            buffer_vars: Vec::new(),
            blocks: ref_layout.blocks.clone(),
        };
        let reference = [0u8; 4];
        let result = [1u8; 4];

        let report = compare_data(&ref_layout, &[ptr(&reference)], &res_layout, &[ptr(&result)]);
        assert!(report.is_ok());
    }
}
