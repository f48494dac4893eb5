mod args;

pub use args::{Cli, Command, MergeArgs, OutputFormat};
