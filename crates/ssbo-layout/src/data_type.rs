//! Basic (non-aggregate) shader data types.
//!
//! A [`DataType`] is either a scalar, a 2/3/4-component vector of a scalar, or a
//! 32-bit float matrix. Every layout rule in this crate matches on it exhaustively,
//! so adding a new kind of basic type is a compile error everywhere it matters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scalar component kinds, including the explicitly sized 8/16-bit storage types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Float,
    Int,
    Uint,
    Bool,
    Float16,
    Int8,
    Uint8,
    Int16,
    Uint16,
}

impl ScalarType {
    pub const ALL: [ScalarType; 9] = [
        ScalarType::Float,
        ScalarType::Int,
        ScalarType::Uint,
        ScalarType::Bool,
        ScalarType::Float16,
        ScalarType::Int8,
        ScalarType::Uint8,
        ScalarType::Int16,
        ScalarType::Uint16,
    ];

    /// Size of one component in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            ScalarType::Float | ScalarType::Int | ScalarType::Uint | ScalarType::Bool => 4,
            ScalarType::Float16 | ScalarType::Int16 | ScalarType::Uint16 => 2,
            ScalarType::Int8 | ScalarType::Uint8 => 1,
        }
    }

    /// The 32-bit type used when the value takes part in shader arithmetic.
    pub fn promote(self) -> ScalarType {
        match self {
            ScalarType::Float16 => ScalarType::Float,
            ScalarType::Int8 | ScalarType::Int16 => ScalarType::Int,
            ScalarType::Uint8 | ScalarType::Uint16 => ScalarType::Uint,
            other => other,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Float16)
    }

    pub fn is_signed_int(self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Int8 | ScalarType::Int16)
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(self, ScalarType::Uint | ScalarType::Uint8 | ScalarType::Uint16)
    }

    fn name(self) -> &'static str {
        match self {
            ScalarType::Float => "float",
            ScalarType::Int => "int",
            ScalarType::Uint => "uint",
            ScalarType::Bool => "bool",
            ScalarType::Float16 => "float16_t",
            ScalarType::Int8 => "int8_t",
            ScalarType::Uint8 => "uint8_t",
            ScalarType::Int16 => "int16_t",
            ScalarType::Uint16 => "uint16_t",
        }
    }

    fn vec_prefix(self) -> &'static str {
        match self {
            ScalarType::Float => "",
            ScalarType::Int => "i",
            ScalarType::Uint => "u",
            ScalarType::Bool => "b",
            ScalarType::Float16 => "f16",
            ScalarType::Int8 => "i8",
            ScalarType::Uint8 => "u8",
            ScalarType::Int16 => "i16",
            ScalarType::Uint16 => "u16",
        }
    }
}

/// Component count of a vector, or column/row count of a matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VecSize {
    Two,
    Three,
    Four,
}

impl VecSize {
    pub const ALL: [VecSize; 3] = [VecSize::Two, VecSize::Three, VecSize::Four];

    pub fn get(self) -> usize {
        match self {
            VecSize::Two => 2,
            VecSize::Three => 3,
            VecSize::Four => 4,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            2 => Some(VecSize::Two),
            3 => Some(VecSize::Three),
            4 => Some(VecSize::Four),
            _ => None,
        }
    }
}

impl TryFrom<u8> for VecSize {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        VecSize::from_len(value as usize).ok_or_else(|| format!("invalid vector size {value}"))
    }
}

impl From<VecSize> for u8 {
    fn from(size: VecSize) -> u8 {
        size.get() as u8
    }
}

/// A scalar, vector or matrix type.
///
/// The derived ordering puts scalars first, then vectors, then matrices, which
/// is also a valid declaration order for the generated compare helpers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Scalar(ScalarType),
    Vector(ScalarType, VecSize),
    /// Always 32-bit float.
    Matrix { columns: VecSize, rows: VecSize },
}

impl DataType {
    pub const FLOAT: DataType = DataType::Scalar(ScalarType::Float);
    pub const INT: DataType = DataType::Scalar(ScalarType::Int);
    pub const UINT: DataType = DataType::Scalar(ScalarType::Uint);
    pub const BOOL: DataType = DataType::Scalar(ScalarType::Bool);

    pub fn vec(scalar: ScalarType, size: usize) -> DataType {
        match VecSize::from_len(size) {
            Some(size) => DataType::Vector(scalar, size),
            None => {
                assert_eq!(size, 1, "vector types have 1 to 4 components");
                DataType::Scalar(scalar)
            }
        }
    }

    pub fn float_vec(size: usize) -> DataType {
        DataType::vec(ScalarType::Float, size)
    }

    pub fn mat(columns: usize, rows: usize) -> DataType {
        match (VecSize::from_len(columns), VecSize::from_len(rows)) {
            (Some(columns), Some(rows)) => DataType::Matrix { columns, rows },
            _ => panic!("invalid matrix dimensions {columns}x{rows}"),
        }
    }

    /// Every basic type, scalars first.
    pub fn all() -> impl Iterator<Item = DataType> {
        let scalars = ScalarType::ALL.into_iter().map(DataType::Scalar);
        let vectors = ScalarType::ALL
            .into_iter()
            .flat_map(|s| VecSize::ALL.into_iter().map(move |n| DataType::Vector(s, n)));
        let matrices = VecSize::ALL.into_iter().flat_map(|columns| {
            VecSize::ALL
                .into_iter()
                .map(move |rows| DataType::Matrix { columns, rows })
        });
        scalars.chain(vectors).chain(matrices)
    }

    pub fn scalar_type(self) -> ScalarType {
        match self {
            DataType::Scalar(s) | DataType::Vector(s, _) => s,
            DataType::Matrix { .. } => ScalarType::Float,
        }
    }

    /// Total number of scalar components.
    pub fn scalar_size(self) -> usize {
        match self {
            DataType::Scalar(_) => 1,
            DataType::Vector(_, n) => n.get(),
            DataType::Matrix { columns, rows } => columns.get() * rows.get(),
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, DataType::Scalar(_))
    }

    pub fn is_vector(self) -> bool {
        matches!(self, DataType::Vector(..))
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, DataType::Matrix { .. })
    }

    pub fn matrix_columns(self) -> Option<usize> {
        match self {
            DataType::Matrix { columns, .. } => Some(columns.get()),
            _ => None,
        }
    }

    pub fn matrix_rows(self) -> Option<usize> {
        match self {
            DataType::Matrix { rows, .. } => Some(rows.get()),
            _ => None,
        }
    }

    /// Type of one column of a matrix.
    pub fn matrix_column_type(self) -> Option<DataType> {
        match self {
            DataType::Matrix { rows, .. } => Some(DataType::Vector(ScalarType::Float, rows)),
            _ => None,
        }
    }

    /// For a matrix stored with the given majorness, the vector type of one stored
    /// column (or row) and how many of them there are.
    pub fn matrix_storage_vectors(self, row_major: bool) -> Option<(DataType, usize)> {
        let (columns, rows) = match self {
            DataType::Matrix { columns, rows } => (columns.get(), rows.get()),
            _ => return None,
        };
        let (vec_size, num_vecs) = if row_major {
            (columns, rows)
        } else {
            (rows, columns)
        };
        Some((DataType::float_vec(vec_size), num_vecs))
    }

    /// Size in bytes of a tightly packed value of this type.
    pub fn byte_size(self) -> usize {
        self.scalar_size() * self.scalar_type().byte_size()
    }

    /// Natural alignment of a scalar or vector. 3-component vectors align like
    /// 4-component ones. Matrices report the alignment of their column type.
    pub fn byte_alignment(self) -> usize {
        match self {
            DataType::Scalar(s) => s.byte_size(),
            DataType::Vector(s, VecSize::Two) => 2 * s.byte_size(),
            DataType::Vector(s, VecSize::Three | VecSize::Four) => 4 * s.byte_size(),
            DataType::Matrix { rows, .. } => DataType::Vector(ScalarType::Float, rows).byte_alignment(),
        }
    }

    /// The type values are promoted to for literal construction and comparison.
    pub fn promote_type(self) -> DataType {
        match self {
            DataType::Scalar(s) => DataType::Scalar(s.promote()),
            DataType::Vector(s, n) => DataType::Vector(s.promote(), n),
            DataType::Matrix { .. } => self,
        }
    }

    pub fn supports_precision(self) -> bool {
        matches!(
            self.scalar_type(),
            ScalarType::Float | ScalarType::Int | ScalarType::Uint
        )
    }

    pub fn is_16bit(self) -> bool {
        self.scalar_type().byte_size() == 2
    }

    pub fn is_8bit(self) -> bool {
        self.scalar_type().byte_size() == 1
    }

    pub fn name(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DataType::Scalar(s) => f.write_str(s.name()),
            DataType::Vector(s, n) => write!(f, "{}vec{}", s.vec_prefix(), n.get()),
            DataType::Matrix { columns, rows } if columns == rows => write!(f, "mat{}", columns.get()),
            DataType::Matrix { columns, rows } => write!(f, "mat{}x{}", columns.get(), rows.get()),
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::all()
            .find(|ty| ty.to_string() == s)
            .ok_or_else(|| format!("unknown basic type `{s}`"))
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> String {
        data_type.to_string()
    }
}

/// Precision qualifier of a basic type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Lowp,
    Mediump,
    Highp,
}

impl Precision {
    pub const ALL: [Precision; 3] = [Precision::Lowp, Precision::Mediump, Precision::Highp];
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Precision::Lowp => "lowp",
            Precision::Mediump => "mediump",
            Precision::Highp => "highp",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(DataType::float_vec(3).name(), "vec3");
        assert_eq!(DataType::vec(ScalarType::Uint8, 2).name(), "u8vec2");
        assert_eq!(DataType::vec(ScalarType::Float16, 4).name(), "f16vec4");
        assert_eq!(DataType::Scalar(ScalarType::Int16).name(), "int16_t");
        assert_eq!(DataType::mat(2, 3).name(), "mat2x3");
        assert_eq!(DataType::mat(4, 4).name(), "mat4");
    }

    #[test]
    fn names_parse_back() {
        for ty in DataType::all() {
            assert_eq!(ty.name().parse::<DataType>(), Ok(ty));
        }
        assert!("dvec2".parse::<DataType>().is_err());
    }

    #[test]
    fn sizes_and_alignments() {
        assert_eq!(DataType::FLOAT.byte_size(), 4);
        assert_eq!(DataType::float_vec(3).byte_size(), 12);
        assert_eq!(DataType::float_vec(3).byte_alignment(), 16);
        assert_eq!(DataType::float_vec(2).byte_alignment(), 8);
        assert_eq!(DataType::vec(ScalarType::Float16, 3).byte_size(), 6);
        assert_eq!(DataType::vec(ScalarType::Float16, 3).byte_alignment(), 8);
        assert_eq!(DataType::vec(ScalarType::Int8, 3).byte_alignment(), 4);
        assert_eq!(DataType::Scalar(ScalarType::Uint8).byte_alignment(), 1);
        assert_eq!(DataType::mat(3, 2).byte_size(), 24);
    }

    #[test]
    fn matrix_storage_follows_majorness() {
        let mat2x4 = DataType::mat(2, 4);
        assert_eq!(
            mat2x4.matrix_storage_vectors(false),
            Some((DataType::float_vec(4), 2))
        );
        assert_eq!(
            mat2x4.matrix_storage_vectors(true),
            Some((DataType::float_vec(2), 4))
        );
        assert_eq!(DataType::FLOAT.matrix_storage_vectors(true), None);
    }

    #[test]
    fn promotion() {
        assert_eq!(
            DataType::vec(ScalarType::Int8, 3).promote_type(),
            DataType::vec(ScalarType::Int, 3)
        );
        assert_eq!(
            DataType::Scalar(ScalarType::Float16).promote_type(),
            DataType::FLOAT
        );
        assert_eq!(DataType::mat(3, 3).promote_type(), DataType::mat(3, 3));
    }

    #[test]
    fn declaration_order_puts_scalars_first() {
        let mut types = vec![DataType::mat(2, 2), DataType::float_vec(2), DataType::FLOAT];
        types.sort();
        assert_eq!(
            types,
            [DataType::FLOAT, DataType::float_vec(2), DataType::mat(2, 2)]
        );
    }
}
