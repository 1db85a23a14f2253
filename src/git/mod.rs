//! Git operations - command builders and read-only queries over the git CLI.

mod cli;

pub use cli::{GitCli, GitCommands};
