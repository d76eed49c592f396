//! Configuration plumbing shared by the daemon: CLI arguments and
//! environment variable interpolation.

mod args;
mod vars;

pub use args::CliArgs;
pub use vars::{InterpolationResult, interpolate};
