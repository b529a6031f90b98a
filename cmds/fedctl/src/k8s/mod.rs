//! Kubernetes-backed collaborators of the `get` engine.
//!
//! This module provides native Kubernetes API access using kube-rs: the control-plane
//! connection, per-cluster discovery, the member registry and the query backend.

pub mod backend;
pub mod client;
pub mod discovery;
pub mod registry;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, ConfigMap).
	Namespaced,

	/// Resource is cluster-wide (e.g., Namespace, ClusterRole).
	ClusterWide,
}
