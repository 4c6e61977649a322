//! Publish a gantry build to a git branch.
//!
//! Merges the source branch into the publishing branch, lifts the build
//! output to the repository root, strips sources and metadata, then
//! commits, pushes and returns to the source branch.

pub mod workflow;

pub use workflow::{DeployError, DeployReport, DeployWorkflow};
