//! Common test utilities.

use std::{
	collections::HashMap,
	io::{self, ErrorKind, Write},
	sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use k8s::ResourceRequest;
use serde_json::{json, Value};

use crate::get::{
	backend::{
		ClusterBackend, ContentType, EventStream, EventType, Fleet, QueryError, QueryRequest,
		QueryResponse, WatchEvent, WatchRequest,
	},
	record::{ColumnDefinition, Document, ResourceTypeId, Table, TableRow},
};

/// A writer that simulates a broken pipe (SIGPIPE scenario).
///
/// This writer immediately returns `ErrorKind::BrokenPipe` on any write attempt,
/// simulating what happens when stdout is connected to a process that has exited.
pub struct BrokenPipeWriter;

impl Write for BrokenPipeWriter {
	fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}

	fn flush(&mut self) -> io::Result<()> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}
}

pub fn pods() -> ResourceTypeId {
	ResourceTypeId::new("", "v1", "Pod", "pods")
}

pub fn deployments() -> ResourceTypeId {
	ResourceTypeId::new("apps", "v1", "Deployment", "deployments")
}

/// A server-side table with a `Name` and `Status` column, one row per name.
pub fn table_of(names: &[&str], resource_version: &str) -> Table {
	labeled_table_of(names, &[], resource_version)
}

/// Like [`table_of`], with the rows named in `managed` carrying the managed label.
pub fn labeled_table_of(names: &[&str], managed: &[&str], resource_version: &str) -> Table {
	let mut table = Table {
		column_definitions: vec![
			ColumnDefinition {
				format: "name".to_string(),
				..ColumnDefinition::string("Name", 0)
			},
			ColumnDefinition::string("Status", 0),
		],
		rows: names
			.iter()
			.map(|name| TableRow {
				cells: vec![json!(name), json!("Running")],
				object: Some(json!({
					"kind": "PartialObjectMetadata",
					"apiVersion": "meta.k8s.io/v1",
					"metadata": {
						"name": name,
						"namespace": "default",
						"labels": if managed.contains(name) {
							json!({"karmada.io/managed": "true"})
						} else {
							json!({})
						}
					}
				})),
			})
			.collect(),
		..Table::default()
	};
	table.metadata.resource_version = Some(resource_version.to_string());
	table
}

pub fn query_request(resources: &[&str]) -> QueryRequest {
	QueryRequest {
		resources: resources.iter().map(|r| ResourceRequest::new(*r)).collect(),
		namespace: "default".to_string(),
		all_namespaces: false,
		label_selector: None,
		field_selector: None,
		page_size: 500,
		content: ContentType::Table,
		ignore_not_found: false,
	}
}

/// Scripted watch event.
#[derive(Clone)]
pub enum FakeEvent {
	Event(EventType, String),
	/// An event whose object is not a Table.
	Raw(EventType, Value),
	Error(String),
}

impl FakeEvent {
	pub fn added(name: &str) -> Self {
		FakeEvent::Event(EventType::Added, name.to_string())
	}

	pub fn modified(name: &str) -> Self {
		FakeEvent::Event(EventType::Modified, name.to_string())
	}

	pub fn error(message: &str) -> Self {
		FakeEvent::Error(message.to_string())
	}

	pub fn raw(object: Value) -> Self {
		FakeEvent::Raw(EventType::Added, object)
	}

	fn into_event(self) -> Result<WatchEvent, QueryError> {
		match self {
			FakeEvent::Event(event_type, name) => Ok(WatchEvent {
				event_type,
				document: Document::Typed(Box::new(table_of(&[name.as_str()], "100"))),
			}),
			FakeEvent::Raw(event_type, object) => Ok(WatchEvent {
				event_type,
				document: Document::Generic(object),
			}),
			FakeEvent::Error(message) => Err(QueryError::Status(message)),
		}
	}
}

/// In-memory cluster serving a fixed set of objects per resource type.
#[derive(Default)]
pub struct FakeBackend {
	objects: Vec<(ResourceTypeId, Vec<String>)>,
	managed: Vec<String>,
	probe_fails: bool,
	missing: Option<(String, String)>,
	events: Vec<FakeEvent>,
	hanging: bool,
	stalled: bool,
	watches: Mutex<Vec<WatchRequest>>,
}

impl FakeBackend {
	pub fn with_pods(names: &[&str]) -> Self {
		Self::default().with_objects(pods(), names)
	}

	pub fn unreachable() -> Self {
		Self::default().failing_probe()
	}

	/// Every query fails with `NotFound` for the given object.
	pub fn missing(resource: &str, name: &str) -> Self {
		Self {
			missing: Some((resource.to_string(), name.to_string())),
			..Self::default()
		}
	}

	pub fn with_deployments(self, names: &[&str]) -> Self {
		self.with_objects(deployments(), names)
	}

	pub fn with_objects(mut self, type_id: ResourceTypeId, names: &[&str]) -> Self {
		self.objects
			.push((type_id, names.iter().map(|n| n.to_string()).collect()));
		self
	}

	/// Objects with these names carry the managed label.
	pub fn managing(mut self, names: &[&str]) -> Self {
		self.managed = names.iter().map(|n| n.to_string()).collect();
		self
	}

	pub fn failing_probe(mut self) -> Self {
		self.probe_fails = true;
		self
	}

	pub fn with_events(mut self, events: Vec<FakeEvent>) -> Self {
		self.events = events;
		self
	}

	/// Watch streams never end on their own.
	pub fn hanging(mut self) -> Self {
		self.hanging = true;
		self
	}

	/// Queries never answer.
	pub fn stalled(mut self) -> Self {
		self.stalled = true;
		self
	}

	pub fn watch_requests(&self) -> Vec<WatchRequest> {
		self.watches.lock().unwrap().clone()
	}

	fn table(&self, names: &[&str]) -> Table {
		let managed: Vec<&str> = self.managed.iter().map(String::as_str).collect();
		labeled_table_of(names, &managed, "1")
	}

	fn lookup(&self, resource: &str) -> Option<&(ResourceTypeId, Vec<String>)> {
		self.objects
			.iter()
			.find(|(type_id, _)| type_id.plural == resource)
	}
}

#[async_trait]
impl ClusterBackend for FakeBackend {
	async fn probe(&self) -> Result<(), QueryError> {
		if self.probe_fails {
			return Err(QueryError::Status("connection refused".to_string()));
		}
		Ok(())
	}

	async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryResponse>, QueryError> {
		if self.stalled {
			future::pending::<()>().await;
		}
		if let Some((resource, name)) = &self.missing {
			return Err(QueryError::NotFound {
				resource: resource.clone(),
				name: name.clone(),
			});
		}
		let mut responses = Vec::new();
		for wanted in &request.resources {
			let Some((type_id, names)) = self.lookup(&wanted.resource) else {
				continue;
			};
			if wanted.names.is_empty() {
				let rows: Vec<&str> = names.iter().map(String::as_str).collect();
				responses.push(QueryResponse {
					type_id: type_id.clone(),
					namespaced: true,
					name: None,
					document: Document::Typed(Box::new(self.table(&rows))),
				});
				continue;
			}
			for name in &wanted.names {
				if !names.contains(name) {
					if request.ignore_not_found {
						continue;
					}
					return Err(QueryError::NotFound {
						resource: wanted.resource.clone(),
						name: name.clone(),
					});
				}
				responses.push(QueryResponse {
					type_id: type_id.clone(),
					namespaced: true,
					name: Some(name.clone()),
					document: Document::Typed(Box::new(self.table(&[name.as_str()]))),
				});
			}
		}
		Ok(responses)
	}

	async fn watch(&self, request: &WatchRequest) -> Result<EventStream, QueryError> {
		self.watches.lock().unwrap().push(request.clone());
		let events = stream::iter(self.events.clone().into_iter().map(FakeEvent::into_event));
		if self.hanging {
			Ok(events.chain(stream::pending()).boxed())
		} else {
			Ok(events.boxed())
		}
	}
}

/// Fleet with a fixed registry; members without scripted backends serve nothing.
pub struct FakeFleet {
	clusters: Vec<String>,
	registry_broken: bool,
	control_plane: Arc<dyn ClusterBackend>,
	members: HashMap<String, Arc<dyn ClusterBackend>>,
}

impl FakeFleet {
	pub fn new(clusters: &[&str]) -> Self {
		Self {
			clusters: clusters.iter().map(|c| c.to_string()).collect(),
			registry_broken: false,
			control_plane: Arc::new(FakeBackend::default()),
			members: HashMap::new(),
		}
	}

	pub fn with_broken_registry(mut self) -> Self {
		self.registry_broken = true;
		self
	}

	pub fn with_control_plane(mut self, backend: FakeBackend) -> Self {
		self.control_plane = Arc::new(backend);
		self
	}

	pub fn with_member(mut self, name: &str, backend: FakeBackend) -> Self {
		if !self.clusters.iter().any(|c| c == name) {
			self.clusters.push(name.to_string());
		}
		self.members.insert(name.to_string(), Arc::new(backend));
		self
	}
}

#[async_trait]
impl Fleet for FakeFleet {
	async fn registered_clusters(&self) -> Result<Vec<String>, QueryError> {
		if self.registry_broken {
			return Err(QueryError::Status("clusters.cluster.karmada.io is forbidden".to_string()));
		}
		Ok(self.clusters.clone())
	}

	fn control_plane(&self) -> Arc<dyn ClusterBackend> {
		self.control_plane.clone()
	}

	fn member(&self, name: &str) -> Result<Arc<dyn ClusterBackend>, QueryError> {
		Ok(self
			.members
			.get(name)
			.cloned()
			.unwrap_or_else(|| Arc::new(FakeBackend::default())))
	}
}
