//! Report generation for sanitization runs
//! Author: kartik4091

pub mod generator;

pub use generator::{new_file_id, sha256_hex, ReportBuilder};
