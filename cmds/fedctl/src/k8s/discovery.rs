//! Kubernetes API resource discovery and resolution of user-supplied type names.

use kube::{
	discovery::{ApiResource, Scope},
	Client, Discovery,
};
use thiserror::Error;
use tracing::{debug, instrument};

use super::ResourceScope;
use crate::get::record::ResourceTypeId;

/// Errors that can occur during API resource discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("full API discovery failed")]
	FullDiscovery(#[source] kube::Error),
}

/// Discovered API resource with its scope.
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
	/// The kube ApiResource for making API calls.
	pub api_resource: ApiResource,
	/// Whether this resource is namespaced or cluster-wide.
	pub scope: ResourceScope,
	/// Whether this is the group's preferred version.
	pub preferred: bool,
}

impl DiscoveredResource {
	pub fn type_id(&self) -> ResourceTypeId {
		let ar = &self.api_resource;
		ResourceTypeId::new(&ar.group, &ar.version, &ar.kind, &ar.plural)
	}

	pub fn namespaced(&self) -> bool {
		self.scope == ResourceScope::Namespaced
	}

	fn names(&self, name: &str) -> bool {
		let ar = &self.api_resource;
		ar.plural == name || ar.kind.to_lowercase() == name
	}

	fn qualified_by(&self, qualifier: &str) -> bool {
		let ar = &self.api_resource;
		ar.group == qualifier
			|| format!("{}.{}", ar.version, ar.group) == qualifier
			|| (ar.group.is_empty() && ar.version == qualifier)
	}
}

/// Every resource type served by one cluster.
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
	/// Core group first, then groups alphabetically.
	resources: Vec<DiscoveredResource>,
}

impl ResourceCatalog {
	/// Query the cluster's discovery API.
	///
	/// Uses the Aggregated Discovery API (K8s 1.26+), falling back to full discovery.
	#[instrument(skip_all)]
	pub async fn discover(client: &Client) -> Result<Self, DiscoveryError> {
		match Discovery::new(client.clone()).run_aggregated().await {
			Ok(discovery) => {
				debug!("using aggregated discovery");
				Ok(Self::from_discovery(&discovery))
			}
			Err(e) => {
				debug!(error = %e, "aggregated discovery not available, using full discovery");
				let discovery = Discovery::new(client.clone())
					.run()
					.await
					.map_err(DiscoveryError::FullDiscovery)?;
				Ok(Self::from_discovery(&discovery))
			}
		}
	}

	fn from_discovery(discovery: &Discovery) -> Self {
		let mut resources = Vec::new();
		for group in discovery.groups() {
			let preferred = group.preferred_version_or_latest();
			for ver in group.versions() {
				for (ar, caps) in group.versioned_resources(ver) {
					let scope = match caps.scope {
						Scope::Namespaced => ResourceScope::Namespaced,
						Scope::Cluster => ResourceScope::ClusterWide,
					};
					resources.push(DiscoveredResource {
						api_resource: ar,
						scope,
						preferred: ver == preferred,
					});
				}
			}
		}
		Self::from_resources(resources)
	}

	pub fn from_resources(mut resources: Vec<DiscoveredResource>) -> Self {
		resources.sort_by(|a, b| {
			let key = |r: &DiscoveredResource| (!r.api_resource.group.is_empty(), r.api_resource.group.clone());
			key(a).cmp(&key(b))
		});
		Self { resources }
	}

	/// Resolve `pods`, `pod`, `deployments.apps`, `deployments.v1.apps` or `deployment.apps`.
	///
	/// Among several matches the preferred version wins, then the core group.
	pub fn resolve(&self, resource: &str) -> Option<&DiscoveredResource> {
		let matches = |r: &&DiscoveredResource| {
			if r.names(resource) {
				return true;
			}
			match resource.split_once('.') {
				Some((name, qualifier)) => r.names(name) && r.qualified_by(qualifier),
				None => false,
			}
		};
		self.resources
			.iter()
			.filter(matches)
			.find(|r| r.preferred)
			.or_else(|| self.resources.iter().find(matches))
	}
}
