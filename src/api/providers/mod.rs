//! External service providers
//!
//! - `tracker` - issue tracker (Redmine)
//! - `repo` - merge host (GitLab)

pub mod repo;
pub mod tracker;
