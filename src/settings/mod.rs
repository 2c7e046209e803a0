//! Layered settings: a TOML file picked by build profile (or `--settings`),
//! overridden by `WARDEN__SECTION__KEY` environment variables.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
