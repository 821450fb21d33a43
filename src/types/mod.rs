// Type definitions for the sanitization pipeline

pub mod document;
pub mod object;
pub mod report;

pub use document::*;
pub use object::*;
pub use report::*;
