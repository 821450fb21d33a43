//! Stage 0: input verification before any parsing

pub mod format_validator;

pub use format_validator::{ContentSniffer, FormatCheck, FormatValidator, MagicSniffer, PDF_MAGIC};
