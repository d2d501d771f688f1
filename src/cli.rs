//! CLI domain: parse, route and output only.
//! Rendering lives in [`crate::report`]; the route table drives the handler.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use route::RunContext;
