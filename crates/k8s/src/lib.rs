//! Kubernetes helpers shared between fedctl and its test server.
//!
//! Nothing in here talks to a cluster: these are pure functions over
//! command-line arguments and generic JSON documents.

pub mod aliases;
pub mod args;
pub mod meta;

pub use args::{parse_resource_args, ArgsError, ResourceRequest};
