//! [`ClusterBackend`] over a kube client.

use async_trait::async_trait;
use futures::{future, StreamExt};
use http::{header::ACCEPT, HeaderValue};
use kube::{
	api::{ApiResource, DynamicObject, GetParams, ListParams, WatchParams},
	core::{GroupVersionKind, Request, WatchEvent as KubeWatchEvent},
	Client, Resource,
};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::discovery::{DiscoveredResource, DiscoveryError, ResourceCatalog};
use crate::get::{
	backend::{
		ClusterBackend, ContentType, EventStream, EventType, QueryError, QueryRequest,
		QueryResponse, WatchEvent, WatchRequest, TABLE_ACCEPT,
	},
	record::{Document, Table},
};

/// A cluster reached through a kube client; its discovery catalog is fetched on first use.
pub struct KubeBackend {
	client: Client,
	catalog: OnceCell<ResourceCatalog>,
}

impl KubeBackend {
	pub fn new(client: Client) -> Self {
		Self {
			client,
			catalog: OnceCell::new(),
		}
	}

	async fn catalog(&self) -> Result<&ResourceCatalog, QueryError> {
		self.catalog
			.get_or_try_init(|| async {
				ResourceCatalog::discover(&self.client)
					.await
					.map_err(|DiscoveryError::FullDiscovery(e)| QueryError::Discovery(e))
			})
			.await
	}

	fn resolve<'a>(
		catalog: &'a ResourceCatalog,
		resource: &str,
	) -> Result<&'a DiscoveredResource, QueryError> {
		catalog
			.resolve(resource)
			.ok_or_else(|| QueryError::UnknownResourceType(resource.to_string()))
	}

	async fn send(
		&self,
		mut request: http::Request<Vec<u8>>,
		content: ContentType,
	) -> Result<Value, QueryError> {
		if content == ContentType::Table {
			request
				.headers_mut()
				.insert(ACCEPT, HeaderValue::from_static(TABLE_ACCEPT));
		}
		Ok(self.client.request::<Value>(request).await?)
	}

	/// List one resource type, following `continue` tokens until the last page.
	#[instrument(skip_all, fields(resource = %resource.api_resource.plural))]
	async fn list(
		&self,
		resource: &DiscoveredResource,
		query: &QueryRequest,
	) -> Result<Vec<QueryResponse>, QueryError> {
		let namespace = query.scoped_namespace().filter(|_| resource.namespaced());
		let url = DynamicObject::url_path(&resource.api_resource, namespace);

		let mut responses = Vec::new();
		let mut continue_token: Option<String> = None;
		loop {
			let mut params = ListParams::default().limit(query.page_size);
			if let Some(selector) = &query.label_selector {
				params = params.labels(selector);
			}
			if let Some(selector) = &query.field_selector {
				params = params.fields(selector);
			}
			if let Some(token) = &continue_token {
				params = params.continue_token(token);
			}

			let document = self
				.send(Request::new(&url).list(&params)?, query.content)
				.await?;
			continue_token = document
				.pointer("/metadata/continue")
				.and_then(Value::as_str)
				.filter(|token| !token.is_empty())
				.map(str::to_string);
			responses.push(QueryResponse {
				type_id: resource.type_id(),
				namespaced: resource.namespaced(),
				name: None,
				document: Document::Generic(document),
			});
			if continue_token.is_none() {
				break;
			}
			debug!(pages = responses.len(), "fetching next page");
		}
		Ok(responses)
	}

	#[instrument(skip_all, fields(resource = %resource.api_resource.plural, %name))]
	async fn get(
		&self,
		resource: &DiscoveredResource,
		name: &str,
		query: &QueryRequest,
	) -> Result<Option<QueryResponse>, QueryError> {
		let namespace = query.scoped_namespace().filter(|_| resource.namespaced());
		let url = DynamicObject::url_path(&resource.api_resource, namespace);
		let request = Request::new(&url).get(name, &GetParams::default())?;

		match self.send(request, query.content).await {
			Ok(document) => Ok(Some(QueryResponse {
				type_id: resource.type_id(),
				namespaced: resource.namespaced(),
				name: Some(name.to_string()),
				document: Document::Generic(document),
			})),
			Err(QueryError::Kube(kube::Error::Api(status))) if status.code == 404 => {
				if query.ignore_not_found {
					debug!("object not found, ignoring");
					return Ok(None);
				}
				Err(QueryError::NotFound {
					resource: resource.api_resource.plural.clone(),
					name: name.to_string(),
				})
			}
			Err(e) => Err(e),
		}
	}
}

#[async_trait]
impl ClusterBackend for KubeBackend {
	#[instrument(skip_all)]
	async fn probe(&self) -> Result<(), QueryError> {
		let request = http::Request::get("/api")
			.body(Vec::new())
			.map_err(|e| QueryError::Connection(Box::new(e)))?;
		self.client.request_text(request).await?;
		Ok(())
	}

	async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryResponse>, QueryError> {
		let catalog = self.catalog().await?;
		let mut responses = Vec::new();
		for wanted in &request.resources {
			let resource = Self::resolve(catalog, &wanted.resource)?;
			if wanted.names.is_empty() {
				responses.extend(self.list(resource, request).await?);
				continue;
			}
			for name in &wanted.names {
				responses.extend(self.get(resource, name, request).await?);
			}
		}
		Ok(responses)
	}

	#[instrument(skip_all, fields(resource = %request.type_id.plural, resource_version = %request.resource_version))]
	async fn watch(&self, request: &WatchRequest) -> Result<EventStream, QueryError> {
		let type_id = &request.type_id;
		let api_resource = ApiResource::from_gvk_with_plural(
			&GroupVersionKind::gvk(&type_id.group, &type_id.version, &type_id.kind),
			&type_id.plural,
		);
		let url = DynamicObject::url_path(&api_resource, request.namespace.as_deref());

		let mut params = WatchParams::default().disable_bookmarks();
		if let Some(selector) = &request.label_selector {
			params = params.labels(selector);
		}
		let fields = [
			request.field_selector.clone(),
			request.name.as_ref().map(|name| format!("metadata.name={name}")),
		]
		.into_iter()
		.flatten()
		.collect::<Vec<_>>()
		.join(",");
		if !fields.is_empty() {
			params = params.fields(&fields);
		}

		let mut http_request = Request::new(&url).watch(&params, &request.resource_version)?;
		http_request
			.headers_mut()
			.insert(ACCEPT, HeaderValue::from_static(TABLE_ACCEPT));
		let events = self.client.request_events::<Table>(http_request).await?;

		Ok(events
			.filter_map(|event| {
				future::ready(match event {
					Ok(KubeWatchEvent::Added(table)) => Some(Ok(typed(EventType::Added, table))),
					Ok(KubeWatchEvent::Modified(table)) => Some(Ok(typed(EventType::Modified, table))),
					Ok(KubeWatchEvent::Deleted(table)) => Some(Ok(typed(EventType::Deleted, table))),
					Ok(KubeWatchEvent::Bookmark(_)) => None,
					Ok(KubeWatchEvent::Error(status)) => Some(Err(QueryError::Status(status.message.clone()))),
					Err(e) => Some(Err(QueryError::Kube(e))),
				})
			})
			.boxed())
	}
}

fn typed(event_type: EventType, table: Table) -> WatchEvent {
	WatchEvent {
		event_type,
		document: Document::Typed(Box::new(table)),
	}
}
