//! wdeploy-lib: incremental, privilege-separated deployment of web assets.
//!
//! This crate provides the pieces the `wdeploy` binary is assembled from:
//! - `executor`: run a closure as another user/group in a forked child
//! - `access`: filesystem accessors bound to the origin and target identities
//! - `deps`: dependency graph, staleness engine and the incremental pipeline
//! - `tasks`: the deployment tasks a configuration file can list

pub mod access;
pub mod config;
pub mod consts;
pub mod deps;
pub mod executor;
pub mod identity;
pub mod lock;
pub mod tasks;
pub mod tools;
pub mod util;
