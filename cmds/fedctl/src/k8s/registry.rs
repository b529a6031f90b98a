//! The control plane's registry of member clusters.

use std::sync::Arc;

use async_trait::async_trait;
use kube::{
	api::{Api, ApiResource, DynamicObject, ListParams},
	core::GroupVersionKind,
};
use tracing::{debug, instrument};

use super::{backend::KubeBackend, client::ClusterConnection};
use crate::get::{ClusterBackend, Fleet, QueryError};

/// Where members are registered and how they are reached.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
	pub group: String,
	pub version: String,
	pub kind: String,
	pub plural: String,
	/// Proxy path template; `{cluster}` is replaced by the member name.
	pub proxy_path: String,
}

impl Default for RegistrySettings {
	fn default() -> Self {
		Self {
			group: "cluster.karmada.io".to_string(),
			version: "v1alpha1".to_string(),
			kind: "Cluster".to_string(),
			plural: "clusters".to_string(),
			proxy_path: "/apis/cluster.karmada.io/v1alpha1/clusters/{cluster}/proxy".to_string(),
		}
	}
}

impl RegistrySettings {
	fn api_resource(&self) -> ApiResource {
		ApiResource::from_gvk_with_plural(
			&GroupVersionKind::gvk(&self.group, &self.version, &self.kind),
			&self.plural,
		)
	}

	pub fn proxy_path_for(&self, cluster: &str) -> String {
		self.proxy_path.replace("{cluster}", cluster)
	}
}

/// [`Fleet`] backed by cluster objects in the control plane.
pub struct KubeFleet {
	connection: ClusterConnection,
	settings: RegistrySettings,
	control_plane: Arc<dyn ClusterBackend>,
}

impl KubeFleet {
	pub fn new(connection: ClusterConnection, settings: RegistrySettings) -> Self {
		let control_plane = Arc::new(KubeBackend::new(connection.client().clone()));
		Self {
			connection,
			settings,
			control_plane,
		}
	}
}

#[async_trait]
impl Fleet for KubeFleet {
	#[instrument(skip_all)]
	async fn registered_clusters(&self) -> Result<Vec<String>, QueryError> {
		let api: Api<DynamicObject> =
			Api::all_with(self.connection.client().clone(), &self.settings.api_resource());
		let clusters = api.list(&ListParams::default()).await?;
		let names: Vec<String> = clusters
			.items
			.into_iter()
			.filter_map(|cluster| cluster.metadata.name)
			.collect();
		debug!(count = names.len(), "listed member clusters");
		Ok(names)
	}

	fn control_plane(&self) -> Arc<dyn ClusterBackend> {
		self.control_plane.clone()
	}

	fn member(&self, name: &str) -> Result<Arc<dyn ClusterBackend>, QueryError> {
		let client = self
			.connection
			.proxied_client(&self.settings.proxy_path_for(name))
			.map_err(|e| QueryError::Connection(Box::new(e)))?;
		Ok(Arc::new(KubeBackend::new(client)))
	}
}
