pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod ui;
pub mod writer;

pub use cli::{Cli, Commands};
pub use error::{Error, Result};
pub use pipeline::run;
pub use ui::{Phase, SilentUi, Ui, UiApp};
