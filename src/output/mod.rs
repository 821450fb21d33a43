//! Output generation
//! Author: kartik4091

pub mod serializer;

pub use serializer::serialize;
