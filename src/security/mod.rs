//! Security checks run between parsing and scrubbing
//! Author: kartik4091

pub mod encryption;

pub use encryption::{check_document, classify_parse_failure, has_encrypt_marker};
