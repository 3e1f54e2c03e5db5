//! Column metadata and column-major row batches.

use mssql_values::SqlValue;
use tds_wire::Collation;
use tds_wire::token::{ColMetaData, ColumnDesc};
use tds_wire::types::TypeId;

/// Session-level view of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    /// Zero-based ordinal.
    pub ordinal: usize,
    /// Column name (case preserved).
    pub name: String,
    /// TDS type.
    pub type_id: TypeId,
    /// Nullability.
    pub nullable: bool,
    /// Declared maximum length in bytes.
    pub max_length: u32,
    /// Precision for decimals.
    pub precision: Option<u8>,
    /// Scale for decimals and scaled temporals.
    pub scale: Option<u8>,
    /// Collation for character columns.
    pub collation: Option<Collation>,
    /// Identity column flag.
    pub is_identity: bool,
}

impl ColumnMeta {
    /// Build session metadata from a wire descriptor.
    #[must_use]
    pub fn from_desc(ordinal: usize, desc: &ColumnDesc) -> Self {
        Self {
            ordinal,
            name: desc.name.clone(),
            type_id: desc.type_id,
            nullable: desc.is_nullable(),
            max_length: desc.max_length,
            precision: desc.precision,
            scale: desc.scale,
            collation: desc.collation,
            is_identity: desc.is_identity(),
        }
    }

    /// Convert a whole COLMETADATA token.
    #[must_use]
    pub fn from_metadata(meta: &ColMetaData) -> Vec<Self> {
        meta.columns
            .iter()
            .enumerate()
            .map(|(i, desc)| Self::from_desc(i, desc))
            .collect()
    }

    /// True when this column matches a bind-time snapshot entry: same
    /// name and the same type class. Exact type ids differ legitimately
    /// (the server reports a nullable INT as INTN), so comparison happens
    /// on the class level; a real remote schema change still trips it.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.name == other.name && type_class(self.type_id) == type_class(other.type_id)
    }
}

/// Coarse type families used for bind-snapshot comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// BIT / BITN.
    Boolean,
    /// All integer widths, fixed or nullable.
    Integer,
    /// REAL / FLOAT, fixed or nullable.
    Float,
    /// DECIMAL / NUMERIC / MONEY.
    Decimal,
    /// All character types.
    Character,
    /// All binary types.
    Binary,
    /// UNIQUEIDENTIFIER.
    Uuid,
    /// DATE.
    Date,
    /// TIME.
    Time,
    /// DATETIME family without offset.
    Timestamp,
    /// DATETIMEOFFSET.
    TimestampTz,
    /// XML.
    Xml,
    /// NULL placeholder.
    Null,
}

/// Map a wire type to its comparison class.
#[must_use]
pub fn type_class(type_id: TypeId) -> TypeClass {
    match type_id {
        TypeId::Bit | TypeId::BitN => TypeClass::Boolean,
        TypeId::Int1 | TypeId::Int2 | TypeId::Int4 | TypeId::Int8 | TypeId::IntN => {
            TypeClass::Integer
        }
        TypeId::Flt4 | TypeId::Flt8 | TypeId::FltN => TypeClass::Float,
        TypeId::DecimalN | TypeId::NumericN | TypeId::Money | TypeId::Money4 | TypeId::MoneyN => {
            TypeClass::Decimal
        }
        TypeId::BigVarChar | TypeId::BigChar | TypeId::NVarChar | TypeId::NChar => {
            TypeClass::Character
        }
        TypeId::BigVarBinary | TypeId::BigBinary => TypeClass::Binary,
        TypeId::Guid => TypeClass::Uuid,
        TypeId::Date => TypeClass::Date,
        TypeId::Time => TypeClass::Time,
        TypeId::DateTime | TypeId::DateTime4 | TypeId::DateTimeN | TypeId::DateTime2 => {
            TypeClass::Timestamp
        }
        TypeId::DateTimeOffset => TypeClass::TimestampTz,
        TypeId::Xml => TypeClass::Xml,
        TypeId::Null => TypeClass::Null,
    }
}

/// A column-major batch of decoded rows.
///
/// The stream fills one batch up to the engine's chunk size and yields,
/// preserving host back-pressure; rows are never accumulated beyond a
/// single batch.
#[derive(Debug, Clone)]
pub struct RowBatch {
    columns: Vec<ColumnMeta>,
    data: Vec<Vec<SqlValue>>,
    rows: usize,
}

impl RowBatch {
    /// Empty batch shaped for `columns`.
    #[must_use]
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        let data = columns.iter().map(|_| Vec::new()).collect();
        Self {
            columns,
            data,
            rows: 0,
        }
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Number of rows currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows
    }

    /// True with no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Values of one column, in row order.
    #[must_use]
    pub fn column_values(&self, ordinal: usize) -> &[SqlValue] {
        &self.data[ordinal]
    }

    /// One row as a value slice (row-major view for tests and passthrough).
    #[must_use]
    pub fn row(&self, index: usize) -> Vec<SqlValue> {
        self.data.iter().map(|col| col[index].clone()).collect()
    }

    /// Append one decoded row. Panics in debug builds if the width is
    /// wrong; the stream validates widths against COLMETADATA upstream.
    pub fn push_row(&mut self, values: Vec<SqlValue>) {
        debug_assert_eq!(values.len(), self.data.len());
        for (slot, value) in self.data.iter_mut().zip(values) {
            slot.push(value);
        }
        self.rows += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn int_col(name: &str, ordinal: usize) -> ColumnMeta {
        ColumnMeta {
            ordinal,
            name: name.into(),
            type_id: TypeId::Int4,
            nullable: false,
            max_length: 4,
            precision: None,
            scale: None,
            collation: None,
            is_identity: false,
        }
    }

    #[test]
    fn batch_fills_column_major() {
        let mut batch = RowBatch::new(vec![int_col("a", 0), int_col("b", 1)]);
        batch.push_row(vec![SqlValue::Int(1), SqlValue::Int(10)]);
        batch.push_row(vec![SqlValue::Int(2), SqlValue::Int(20)]);

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.column_values(0),
            &[SqlValue::Int(1), SqlValue::Int(2)]
        );
        assert_eq!(batch.row(1), vec![SqlValue::Int(2), SqlValue::Int(20)]);
    }

    #[test]
    fn snapshot_match_uses_type_classes() {
        let a = int_col("id", 0);
        let mut b = a.clone();
        b.nullable = true;
        b.type_id = TypeId::IntN; // nullable INT reported as INTN
        assert!(a.matches(&b));

        let mut c = a.clone();
        c.type_id = TypeId::NVarChar;
        assert!(!a.matches(&c));

        let mut d = a.clone();
        d.name = "renamed".into();
        assert!(!a.matches(&d));
    }
}
