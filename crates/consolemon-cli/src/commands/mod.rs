//! CLI subcommand implementations.

pub mod list;
pub mod poke;
pub mod read;
pub mod refresh;
pub mod status;
