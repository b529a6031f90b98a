//! Mock Kubernetes API discovery types.

use std::collections::BTreeMap;

/// Group/version under which the control plane registers member clusters.
pub const REGISTRY_GROUP_VERSION: &str = "cluster.karmada.io/v1alpha1";

/// Discovery mode for the mock server.
#[derive(Clone, Copy, Default)]
pub enum DiscoveryMode {
	/// Support aggregated discovery (APIGroupDiscoveryList).
	#[default]
	Aggregated,
	/// Return 406 for aggregated discovery, forcing fallback to legacy endpoints.
	Legacy,
}

/// Pre-configured discovery responses.
pub struct MockDiscovery {
	pub core_resources: Vec<MockApiResource>,
	pub group_resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self {
			core_resources: vec![
				MockApiResource::namespaced("configmaps", "ConfigMap"),
				MockApiResource::namespaced("secrets", "Secret"),
				MockApiResource::namespaced("services", "Service"),
				MockApiResource::namespaced("pods", "Pod"),
				MockApiResource::cluster_scoped("namespaces", "Namespace"),
				MockApiResource::cluster_scoped("nodes", "Node"),
			],
			group_resources: BTreeMap::from([(
				"apps/v1".to_string(),
				vec![
					MockApiResource::namespaced("deployments", "Deployment"),
					MockApiResource::namespaced("replicasets", "ReplicaSet"),
					MockApiResource::namespaced("statefulsets", "StatefulSet"),
					MockApiResource::namespaced("daemonsets", "DaemonSet"),
				],
			)]),
		}
	}
}

impl MockDiscovery {
	/// Discovery for a control plane: the member defaults plus the cluster registry.
	pub fn control_plane() -> Self {
		let mut discovery = Self::default();
		discovery.group_resources.insert(
			REGISTRY_GROUP_VERSION.to_string(),
			vec![MockApiResource::cluster_scoped("clusters", "Cluster")],
		);
		discovery
	}

	/// Look up `(plural, namespaced)` for an apiVersion/kind pair.
	pub fn lookup_kind(&self, api_version: &str, kind: &str) -> Option<(&str, bool)> {
		self.resources_for(api_version)?
			.iter()
			.find(|r| r.kind == kind)
			.map(|r| (r.name.as_str(), r.namespaced))
	}

	/// Whether `plural` is served under `api_version`.
	pub fn serves(&self, api_version: &str, plural: &str) -> bool {
		self.resources_for(api_version)
			.is_some_and(|rs| rs.iter().any(|r| r.name == plural))
	}

	fn resources_for(&self, api_version: &str) -> Option<&[MockApiResource]> {
		if api_version.contains('/') {
			self.group_resources.get(api_version).map(Vec::as_slice)
		} else if api_version == "v1" {
			Some(&self.core_resources)
		} else {
			None
		}
	}
}

/// A mock API resource definition.
pub struct MockApiResource {
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
	pub verbs: Vec<String>,
}

impl MockApiResource {
	fn read_only_verbs() -> Vec<String> {
		vec!["get".into(), "list".into(), "watch".into()]
	}

	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: true,
			verbs: Self::read_only_verbs(),
		}
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: false,
			verbs: Self::read_only_verbs(),
		}
	}
}
