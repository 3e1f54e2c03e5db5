//! # mssql-values
//!
//! The value layer of the federation core: decoding TDS row data into
//! [`SqlValue`]s using the column descriptors parsed by `tds-wire`, and
//! rendering values back out as T-SQL literals for generated scan queries.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod error;
pub mod literal;
pub mod value;

pub use decode::{decode_column, decode_nbc_row, decode_row};
pub use error::ValueError;
pub use literal::render_literal;
pub use value::SqlValue;
