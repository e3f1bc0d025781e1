mod bwe_defines;

pub use bwe_defines::*;
