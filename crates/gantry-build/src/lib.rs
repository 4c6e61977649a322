//! Asset build tasks for gantry.
//!
//! Compiles view templates into a layout, stylesheets into minified CSS,
//! stamps scripts, and copies images and fonts into the output directory.
//! Tasks form a small dependency graph executed by [`Pipeline`].

pub mod clean;
pub mod command;
pub mod config;
pub mod copy;
pub mod glob;
pub mod graph;
pub mod notice;
pub mod pipeline;
pub mod report;
pub mod scripts;
pub mod styles;
pub mod vendor;
pub mod views;

pub use clean::clean;
pub use command::{CommandError, CommandRunner, SystemRunner};
pub use config::{OverlapPolicy, PathConfig, CONFIG_FILE};
pub use crate::glob::Glob;
pub use graph::{Target, TaskGraph, TaskKind};
pub use pipeline::{BuildError, BuildSummary, Pipeline, TaskExecutor};
pub use report::{BuildEvents, ErrorGuard, FileFailure, FileOutcome, NoEvents, TaskReport};
