//! Structural parsing of untrusted PDF bytes
//! Author: kartik4091

pub mod cross_ref;
pub mod filters;
pub mod lexer;
pub mod page_tree;
pub mod parser;
pub mod recovery;

pub use cross_ref::{XrefEntry, XrefTable};
pub use parser::parse_document;
