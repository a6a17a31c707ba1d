// classdebug_cli - command-line front end for classdebug_meta
pub mod cli;
pub mod logging;
pub mod run;

pub use cli::{retain_known_options, Cli, Configuration, DEFAULT_CLASS};
pub use run::{debug_class, spawn_report};
