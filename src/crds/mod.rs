pub mod manifestwork;

pub use manifestwork::*;
