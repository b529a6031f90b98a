pub mod commands;
pub mod config;
pub mod get;
pub mod k8s;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
