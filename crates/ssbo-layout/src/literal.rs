//! GLSL literals for values stored in a block buffer.

use crate::data_type::{DataType, ScalarType};
use crate::float16::f16_to_f32;
use bytemuck::AnyBitPattern;
use std::fmt::Write as _;

pub(crate) fn read<T: AnyBitPattern>(bytes: &[u8], offset: usize) -> T {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + size_of::<T>()])
}

pub(crate) fn write<T: bytemuck::NoUninit>(bytes: &mut [u8], offset: usize, value: T) {
    let src = bytemuck::bytes_of(&value);
    bytes[offset..offset + src.len()].copy_from_slice(src);
}

/// Floats are always whole numbers here, one decimal is enough to make them float literals.
pub fn float_literal(value: f32) -> String {
    format!("{value:.1}")
}

fn scalar_literal(src: &mut String, scalar: ScalarType, bytes: &[u8], offset: usize) {
    match scalar {
        ScalarType::Float16 => src.push_str(&float_literal(f16_to_f32(read(bytes, offset)))),
        ScalarType::Float => src.push_str(&float_literal(read(bytes, offset))),
        // Printed through a 32-bit unsigned conversion, as GLSL has no 8-bit literals.
        ScalarType::Int8 => write!(src, "{}", read::<i8>(bytes, offset) as i32 as u32).unwrap(),
        ScalarType::Int16 => write!(src, "{}", read::<i16>(bytes, offset)).unwrap(),
        ScalarType::Int => write!(src, "{}", read::<i32>(bytes, offset)).unwrap(),
        ScalarType::Uint8 => write!(src, "{}u", read::<u8>(bytes, offset)).unwrap(),
        ScalarType::Uint16 => write!(src, "{}u", read::<u16>(bytes, offset)).unwrap(),
        ScalarType::Uint => write!(src, "{}u", read::<u32>(bytes, offset)).unwrap(),
        ScalarType::Bool => src.push_str(if read::<u32>(bytes, offset) != 0 {
            "true"
        } else {
            "false"
        }),
    }
}

/// Literal for a scalar or vector value starting at `bytes[0]`. Vectors use the
/// constructor of their promoted type, e.g. `ivec2(3, -1)` for an `i8vec2`.
pub fn imm_scalar_vector_src(data_type: DataType, bytes: &[u8]) -> String {
    assert!(!data_type.is_matrix(), "{data_type} is a matrix");

    let scalar = data_type.scalar_type();
    let comp_size = scalar.byte_size();
    let num_comps = data_type.scalar_size();
    let mut src = String::new();

    if num_comps > 1 {
        write!(src, "{}(", data_type.promote_type()).unwrap();
    }
    for comp in 0..num_comps {
        if comp > 0 {
            src.push_str(", ");
        }
        scalar_literal(&mut src, scalar, bytes, comp * comp_size);
    }
    if num_comps > 1 {
        src.push(')');
    }
    src
}

/// Offset of matrix component `(column, row)` relative to the start of the matrix.
pub fn matrix_component_offset(matrix_stride: usize, row_major: bool, column: usize, row: usize) -> usize {
    const COMP_SIZE: usize = 4;
    if row_major {
        row * matrix_stride + column * COMP_SIZE
    } else {
        column * matrix_stride + row * COMP_SIZE
    }
}

/// Literal for a matrix value starting at `bytes[0]`, in column-wise order.
/// With `column`, only that column is emitted, as a column vector constructor.
pub fn imm_matrix_src(
    data_type: DataType,
    matrix_stride: usize,
    row_major: bool,
    column: Option<usize>,
    bytes: &[u8],
) -> String {
    let (Some(num_cols), Some(num_rows), Some(column_type)) = (
        data_type.matrix_columns(),
        data_type.matrix_rows(),
        data_type.matrix_column_type(),
    ) else {
        panic!("{data_type} is not a matrix");
    };

    let mut src = match column {
        Some(_) => format!("{column_type}("),
        None => format!("{data_type}("),
    };
    let mut first = true;
    for col in (0..num_cols).filter(|&col| column.is_none_or(|c| c == col)) {
        for row in 0..num_rows {
            if !first {
                src.push_str(", ");
            }
            let offset = matrix_component_offset(matrix_stride, row_major, col, row);
            src.push_str(&float_literal(read(bytes, offset)));
            first = false;
        }
    }
    src.push(')');
    src
}
