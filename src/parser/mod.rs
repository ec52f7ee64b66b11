pub mod labels;
pub mod rows;

pub use labels::*;
pub use rows::*;
