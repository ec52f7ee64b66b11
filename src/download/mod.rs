pub mod catalog;
pub mod client;
pub mod workbook;

pub use catalog::*;
pub use client::*;
