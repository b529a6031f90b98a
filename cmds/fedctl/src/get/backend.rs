//! Contracts of the collaborators the engine drives: per-target backends and the fleet.

use std::{collections::BTreeSet, fmt, sync::Arc};

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s::ResourceRequest;
use thiserror::Error;

use super::{
	error::GetError,
	record::{Document, ResourceTypeId},
};

/// Accept header asking the API server for server-side tables, with a plain JSON fallback.
pub const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io,application/json;as=Table;v=v1beta1;g=meta.k8s.io,application/json";

/// Failure of a single call against a single target.
#[derive(Debug, Error)]
pub enum QueryError {
	#[error(transparent)]
	Kube(#[from] kube::Error),

	#[error("building request")]
	Request(#[from] kube::core::request::Error),

	#[error("the server doesn't have a resource type \"{0}\"")]
	UnknownResourceType(String),

	#[error("{resource} \"{name}\" not found")]
	NotFound { resource: String, name: String },

	#[error("discovering API resources")]
	Discovery(#[source] kube::Error),

	#[error("connecting to cluster")]
	Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

	#[error("{0}")]
	Status(String),
}

/// Shape in which a target should return documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
	#[default]
	Table,
	/// Plain objects, as needed for json/yaml output.
	Object,
}

/// One query, sent unchanged to every target.
#[derive(Debug, Clone)]
pub struct QueryRequest {
	pub resources: Vec<ResourceRequest>,
	pub namespace: String,
	pub all_namespaces: bool,
	pub label_selector: Option<String>,
	pub field_selector: Option<String>,
	pub page_size: u32,
	pub content: ContentType,
	pub ignore_not_found: bool,
}

impl QueryRequest {
	/// Namespace the query is scoped to, `None` when it spans all of them.
	pub fn scoped_namespace(&self) -> Option<&str> {
		(!self.all_namespaces).then_some(self.namespace.as_str())
	}
}

/// One document returned by a target for a query.
#[derive(Debug, Clone)]
pub struct QueryResponse {
	pub type_id: ResourceTypeId,
	pub namespaced: bool,
	/// Set when the document came from a get of a named object.
	pub name: Option<String>,
	pub document: Document,
}

/// Subscription parameters for one target.
#[derive(Debug, Clone)]
pub struct WatchRequest {
	pub type_id: ResourceTypeId,
	pub namespace: Option<String>,
	pub label_selector: Option<String>,
	pub field_selector: Option<String>,
	/// Restricts the watch to a single object.
	pub name: Option<String>,
	pub resource_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
	Added,
	Modified,
	Deleted,
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			EventType::Added => "ADDED",
			EventType::Modified => "MODIFIED",
			EventType::Deleted => "DELETED",
		})
	}
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
	pub event_type: EventType,
	pub document: Document,
}

pub type EventStream = BoxStream<'static, Result<WatchEvent, QueryError>>;

/// Connection to a single cluster.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
	/// Cheap reachability check, used before querying members.
	async fn probe(&self) -> Result<(), QueryError>;

	async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryResponse>, QueryError>;

	async fn watch(&self, request: &WatchRequest) -> Result<EventStream, QueryError>;
}

/// The control plane together with its registry of member clusters.
#[async_trait]
pub trait Fleet: Send + Sync {
	async fn registered_clusters(&self) -> Result<Vec<String>, QueryError>;

	/// Fail with `UnknownCluster` listing every name absent from the registry.
	async fn validate_names_exist(&self, names: &[String]) -> Result<(), GetError> {
		let registered: BTreeSet<String> = self
			.registered_clusters()
			.await
			.map_err(GetError::RegistryUnavailable)?
			.into_iter()
			.collect();
		let missing: Vec<String> = names
			.iter()
			.filter(|name| !registered.contains(*name))
			.cloned()
			.collect();
		if missing.is_empty() {
			Ok(())
		} else {
			Err(GetError::UnknownCluster(missing))
		}
	}

	fn control_plane(&self) -> Arc<dyn ClusterBackend>;

	fn member(&self, name: &str) -> Result<Arc<dyn ClusterBackend>, QueryError>;
}
