//! branchflow - git-flow branch lifecycle with issue tracker and merge host integration
//!
//! The `branchflow` binary is a thin clap front end over these modules; the
//! integration tests drive [`lifecycle::BranchLifecycle`] directly with fakes.

pub mod api;
pub mod branch;
pub mod config;
pub mod git;
pub mod hooks;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod projects;
pub mod prompt;
pub mod sequencer;
pub mod store;
pub mod timelog;
