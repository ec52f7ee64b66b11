pub mod geography;
pub mod tables;
pub mod types;

pub use geography::*;
pub use tables::*;
pub use types::*;
