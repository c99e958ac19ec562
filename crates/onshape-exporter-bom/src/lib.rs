//! # Onshape BOM
//!
//! Strongly-typed bill-of-materials model for Onshape assemblies.
//!
//! This crate provides:
//! - [`BomTable`], an ordered table of [`BomItem`] line items
//! - [`ItemSource`], the document/revision/element/part a line item came from
//! - [`parse_bom`], which normalizes the raw `bomTable` JSON payload
//!
//! Parsing fails fast: a single malformed line item rejects the whole table.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod model;
pub mod parse;

pub use model::{BomItem, BomTable, ItemSource, RevisionType};
pub use parse::{parse_bom, BomParseError, ParseErrorKind};
