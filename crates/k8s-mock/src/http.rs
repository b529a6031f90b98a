//! HTTP-based mock federated Kubernetes server using wiremock.
//!
//! The control plane is served at the root of the mock server. Every member
//! cluster is served under the control plane's cluster proxy path, so a client
//! pointed at `<uri><proxy path>` sees a complete member API server.

use std::{
	collections::{BTreeMap, HashMap},
	sync::{Arc, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{header_regex, method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::{DiscoveryMode, MockDiscovery, REGISTRY_GROUP_VERSION},
	helpers::{matches_field_selector, matches_label_selector, status_failure, to_table},
};

/// Proxy path template under which member clusters are reachable.
pub const DEFAULT_PROXY_PATH: &str = "/apis/cluster.karmada.io/v1alpha1/clusters/{cluster}/proxy";

/// Priority for member mocks, so they win over the control plane's catch-all routes.
const MEMBER_PRIORITY: u8 = 1;

/// Priority of control plane mocks (wiremock's default).
const CONTROL_PLANE_PRIORITY: u8 = 5;

/// Objects keyed by (collection path, name).
type ResourceMap = BTreeMap<(String, String), Value>;

/// Type alias for the shared resources map of one served API.
pub type SharedResources = Arc<RwLock<ResourceMap>>;

/// A watch event served by the mock watch endpoint.
#[derive(Clone)]
pub struct MockWatchEvent {
	pub event_type: String,
	pub object: Value,
}

impl MockWatchEvent {
	pub fn added(object: Value) -> Self {
		Self {
			event_type: "ADDED".to_string(),
			object,
		}
	}

	pub fn modified(object: Value) -> Self {
		Self {
			event_type: "MODIFIED".to_string(),
			object,
		}
	}

	pub fn deleted(object: Value) -> Self {
		Self {
			event_type: "DELETED".to_string(),
			object,
		}
	}
}

/// A member cluster registered with the mock control plane.
pub struct MockMember {
	pub name: String,
	pub resources: Vec<Value>,
	pub watch_events: Vec<MockWatchEvent>,
	/// When false, every request through the proxy fails with 503.
	pub reachable: bool,
}

impl MockMember {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			resources: Vec::new(),
			watch_events: Vec::new(),
			reachable: true,
		}
	}

	/// A registered member whose proxy always fails.
	pub fn unreachable(name: &str) -> Self {
		Self {
			reachable: false,
			..Self::new(name)
		}
	}

	pub fn with_resources(mut self, resources: Vec<Value>) -> Self {
		self.resources = resources;
		self
	}

	pub fn with_watch_events(mut self, events: Vec<MockWatchEvent>) -> Self {
		self.watch_events = events;
		self
	}
}

/// A mock federated Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	#[builder(default)]
	discovery_mode: DiscoveryMode,
	/// Control plane objects, as raw manifests. API paths are derived from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<Value>,
	/// Events replayed by control plane watch requests.
	#[builder(default)]
	watch_events: Vec<MockWatchEvent>,
	/// Member clusters; each is also registered as a `Cluster` object.
	#[builder(default)]
	members: Vec<MockMember>,
	#[builder(default = DEFAULT_PROXY_PATH.to_string())]
	proxy_path: String,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

/// One API server (control plane or member) mounted under a path prefix.
struct ServedApi {
	prefix: String,
	priority: u8,
	discovery: MockDiscovery,
	resources: SharedResources,
	watch_events: Arc<Vec<MockWatchEvent>>,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured clusters.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut control_plane_resources = self.resources;
		for member in &self.members {
			control_plane_resources.push(json!({
				"apiVersion": REGISTRY_GROUP_VERSION,
				"kind": "Cluster",
				"metadata": {"name": member.name}
			}));
		}

		// Members first: wiremock picks the highest priority, then the earliest mount.
		for member in self.members {
			let prefix = self.proxy_path.replace("{cluster}", &member.name);
			if !member.reachable {
				mount_unreachable(&server, &prefix).await;
				continue;
			}
			let api = ServedApi::new(
				prefix,
				MEMBER_PRIORITY,
				MockDiscovery::default(),
				member.resources,
				member.watch_events,
			);
			api.mount(&server, self.discovery_mode).await;
		}

		let control_plane = ServedApi::new(
			String::new(),
			CONTROL_PLANE_PRIORITY,
			MockDiscovery::control_plane(),
			control_plane_resources,
			self.watch_events,
		);
		control_plane.mount(&server, self.discovery_mode).await;

		RunningHttpMockK8sServer { server }
	}
}

impl ServedApi {
	fn new(
		prefix: String,
		priority: u8,
		discovery: MockDiscovery,
		manifests: Vec<Value>,
		watch_events: Vec<MockWatchEvent>,
	) -> Self {
		let mut resources = ResourceMap::new();
		for manifest in manifests {
			if let Some(key) = storage_key(&manifest, &discovery) {
				trace!(prefix = %prefix, collection = %key.0, name = %key.1, "Registered resource");
				resources.insert(key, manifest);
			}
		}

		resources
			.entry(("/api/v1/namespaces".to_string(), "default".to_string()))
			.or_insert_with(|| {
				json!({
					"apiVersion": "v1",
					"kind": "Namespace",
					"metadata": {"name": "default"}
				})
			});

		Self {
			prefix,
			priority,
			discovery,
			resources: Arc::new(RwLock::new(resources)),
			watch_events: Arc::new(watch_events),
		}
	}

	async fn mount(self, server: &MockServer, mode: DiscoveryMode) {
		mount_discovery(server, &self.prefix, self.priority, &self.discovery, mode).await;
		self.mount_reads(server).await;
	}

	/// GET handler for single objects, lists and watches.
	async fn mount_reads(self, server: &MockServer) {
		let prefix = self.prefix.clone();
		let priority = self.priority;
		let api = Arc::new(self);

		Mock::given(method("GET"))
			.and(path_regex(format!(r"^{}/api(s)?/.*", prefix)))
			.respond_with(move |req: &Request| api.respond(req))
			.with_priority(priority)
			.mount(server)
			.await;
	}

	fn respond(&self, req: &Request) -> ResponseTemplate {
		let full_path = req.url.path();
		let rel_path = full_path
			.strip_prefix(self.prefix.as_str())
			.unwrap_or(full_path)
			.trim_end_matches('/');
		let query: HashMap<String, String> = req.url.query_pairs().into_owned().collect();
		let as_table = req
			.headers
			.get("accept")
			.and_then(|v| v.to_str().ok())
			.is_some_and(|accept| accept.contains("as=Table"));

		let Some(target) = parse_api_path(rel_path, &self.discovery) else {
			return ResponseTemplate::new(404).set_body_json(status_failure(
				404,
				"NotFound",
				"the server could not find the requested resource",
			));
		};

		let label_selector = query.get("labelSelector").map(String::as_str).unwrap_or("");
		let field_selector = query.get("fieldSelector").map(String::as_str).unwrap_or("");

		if query
			.get("watch")
			.is_some_and(|w| w == "true" || w == "1")
		{
			return self.respond_watch(&target, label_selector, field_selector, as_table);
		}

		let resources = self
			.resources
			.read()
			.unwrap_or_else(std::sync::PoisonError::into_inner);

		if let Some(name) = &target.name {
			let Some(object) = resources.get(&(target.collection.clone(), name.clone())) else {
				return ResponseTemplate::new(404).set_body_json(status_failure(
					404,
					"NotFound",
					&format!("{} \"{}\" not found", target.plural, name),
				));
			};
			if as_table {
				let rv = k8s::meta::resource_version(object).unwrap_or("1");
				return ResponseTemplate::new(200).set_body_json(to_table(&[object], rv));
			}
			return ResponseTemplate::new(200).set_body_json(object.clone());
		}

		let items: Vec<&Value> = resources
			.iter()
			.filter(|((collection, _), _)| target.matches_collection(collection))
			.map(|(_, object)| object)
			.filter(|object| matches_label_selector(object, label_selector))
			.filter(|object| matches_field_selector(object, field_selector))
			.collect();

		if as_table {
			return ResponseTemplate::new(200).set_body_json(to_table(&items, "1"));
		}

		ResponseTemplate::new(200).set_body_json(json!({
			"kind": "List",
			"apiVersion": "v1",
			"metadata": {"resourceVersion": "1"},
			"items": items
		}))
	}

	/// Replay configured events as a newline-delimited watch stream, then close it.
	fn respond_watch(
		&self,
		target: &ApiPath,
		label_selector: &str,
		field_selector: &str,
		as_table: bool,
	) -> ResponseTemplate {
		let mut body = String::new();
		for event in self.watch_events.iter() {
			let Some((collection, _)) = storage_key(&event.object, &self.discovery) else {
				continue;
			};
			if !target.matches_collection(&collection)
				|| !matches_label_selector(&event.object, label_selector)
				|| !matches_field_selector(&event.object, field_selector)
			{
				continue;
			}
			let object = if as_table {
				let rv = k8s::meta::resource_version(&event.object).unwrap_or("1");
				to_table(&[&event.object], rv)
			} else {
				event.object.clone()
			};
			body.push_str(&json!({"type": event.event_type, "object": object}).to_string());
			body.push('\n');
		}

		ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/json")
	}
}

/// A parsed resource API path.
struct ApiPath {
	/// `/api/v1/namespaces/default/pods` or `/api/v1/pods` style collection path.
	collection: String,
	plural: String,
	/// Set for cluster-wide collection paths (all namespaces or cluster-scoped types).
	cluster_wide: bool,
	name: Option<String>,
}

impl ApiPath {
	fn matches_collection(&self, stored: &str) -> bool {
		stored == self.collection
			|| (self.cluster_wide
				&& cluster_wide_path(stored).as_deref() == Some(self.collection.as_str()))
	}
}

/// Parse `/api/v1[/namespaces/<ns>]/<plural>[/<name>]` (or the `/apis/<group>/<version>` form).
fn parse_api_path(path: &str, discovery: &MockDiscovery) -> Option<ApiPath> {
	let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
	let (api_version, base_len) = match segments.as_slice() {
		["api", version, ..] => ((*version).to_string(), 2),
		["apis", group, version, ..] => (format!("{group}/{version}"), 3),
		_ => return None,
	};
	let base = format!("/{}", segments[..base_len].join("/"));
	let rest = &segments[base_len..];

	let (collection, plural, namespaced, name) = match rest {
		[plural] => (format!("{base}/{plural}"), *plural, false, None),
		["namespaces", ns, plural] => (
			format!("{base}/namespaces/{ns}/{plural}"),
			*plural,
			true,
			None,
		),
		["namespaces", ns, plural, name] => (
			format!("{base}/namespaces/{ns}/{plural}"),
			*plural,
			true,
			Some((*name).to_string()),
		),
		[plural, name] => (
			format!("{base}/{plural}"),
			*plural,
			false,
			Some((*name).to_string()),
		),
		_ => return None,
	};

	if !discovery.serves(&api_version, plural) {
		return None;
	}

	Some(ApiPath {
		collection,
		plural: plural.to_string(),
		cluster_wide: !namespaced,
		name,
	})
}

/// Derive the (collection path, name) storage key for a manifest using discovery data.
fn storage_key(manifest: &Value, discovery: &MockDiscovery) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = k8s::meta::name(manifest)?.to_string();
	let (plural, namespaced) = discovery.lookup_kind(api_version, kind)?;

	let root = if api_version.contains('/') {
		format!("/apis/{}", api_version)
	} else {
		format!("/api/{}", api_version)
	};

	let collection = if namespaced {
		let ns = k8s::meta::namespace(manifest).unwrap_or("default");
		format!("{}/namespaces/{}/{}", root, ns, plural)
	} else {
		format!("{}/{}", root, plural)
	};

	Some((collection, name))
}

/// Extract a cluster-wide path from a namespaced API path.
///
/// Examples:
/// - `/api/v1/namespaces/default/configmaps` -> Some(`/api/v1/configmaps`)
/// - `/apis/apps/v1/namespaces/default/deployments` -> Some(`/apis/apps/v1/deployments`)
/// - `/api/v1/namespaces` -> None
fn cluster_wide_path(path: &str) -> Option<String> {
	let ns_idx = path.find("/namespaces/")?;
	let before_ns = &path[..ns_idx];
	let after_ns = &path[ns_idx + "/namespaces/".len()..];
	let slash_idx = after_ns.find('/')?;
	Some(format!("{}{}", before_ns, &after_ns[slash_idx..]))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to the control plane of this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}
}

async fn mount_unreachable(server: &MockServer, prefix: &str) {
	Mock::given(path_regex(format!(r"^{}(/.*)?$", prefix)))
		.respond_with(ResponseTemplate::new(503).set_body_json(status_failure(
			503,
			"ServiceUnavailable",
			"the cluster is not reachable",
		)))
		.with_priority(MEMBER_PRIORITY)
		.mount(server)
		.await;
}

fn aggregated_resources(
	discovery_resources: &[super::discovery::MockApiResource],
	group: &str,
	version: &str,
) -> Vec<Value> {
	discovery_resources
		.iter()
		.map(|r| {
			json!({
				"resource": r.name,
				"responseKind": {
					"group": group,
					"version": version,
					"kind": r.kind
				},
				"scope": if r.namespaced { "Namespaced" } else { "Cluster" },
				"verbs": r.verbs,
			})
		})
		.collect()
}

fn legacy_resources(discovery_resources: &[super::discovery::MockApiResource]) -> Vec<Value> {
	discovery_resources
		.iter()
		.map(|r| {
			json!({
				"name": r.name,
				"singularName": "",
				"namespaced": r.namespaced,
				"kind": r.kind,
				"verbs": r.verbs,
			})
		})
		.collect()
}

async fn mount_discovery(
	server: &MockServer,
	prefix: &str,
	priority: u8,
	discovery: &MockDiscovery,
	mode: DiscoveryMode,
) {
	let aggregated_core_body = json!({
		"kind": "APIGroupDiscoveryList",
		"apiVersion": "apidiscovery.k8s.io/v2",
		"items": [{
			"metadata": {"name": ""},
			"versions": [{
				"version": "v1",
				"resources": aggregated_resources(&discovery.core_resources, "", "v1"),
				"freshness": "Current"
			}]
		}]
	});

	let aggregated_groups: Vec<_> = discovery
		.group_resources
		.iter()
		.map(|(gv, rs)| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			json!({
				"metadata": {"name": group},
				"versions": [{
					"version": version,
					"resources": aggregated_resources(rs, group, version),
					"freshness": "Current"
				}]
			})
		})
		.collect();

	let aggregated_apis_body = json!({
		"kind": "APIGroupDiscoveryList",
		"apiVersion": "apidiscovery.k8s.io/v2",
		"items": aggregated_groups
	});

	// The Content-Type must announce the aggregated format for clients to parse it.
	const AGGREGATED_DISCOVERY_CONTENT_TYPE: &str =
		"application/json;g=apidiscovery.k8s.io;v=v2;as=APIGroupDiscoveryList";

	let core_path = format!("{prefix}/api");
	let apis_path = format!("{prefix}/apis");

	for (endpoint, body) in [
		(&core_path, &aggregated_core_body),
		(&apis_path, &aggregated_apis_body),
	] {
		let response = match mode {
			// set_body_raw, since set_body_json overwrites Content-Type
			DiscoveryMode::Aggregated => ResponseTemplate::new(200).set_body_raw(
				serde_json::to_vec(body).expect("serializing discovery JSON should never fail"),
				AGGREGATED_DISCOVERY_CONTENT_TYPE,
			),
			DiscoveryMode::Legacy => ResponseTemplate::new(406),
		};
		Mock::given(method("GET"))
			.and(path(endpoint.as_str()))
			.and(header_regex("accept", "apidiscovery"))
			.respond_with(response)
			.with_priority(priority)
			.mount(server)
			.await;
	}

	// Legacy discovery endpoints (fallback, and the member liveness probe)
	Mock::given(method("GET"))
		.and(path(core_path.as_str()))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.with_priority(priority)
		.mount(server)
		.await;

	let groups: Vec<_> = discovery
		.group_resources
		.keys()
		.map(|gv| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			json!({
				"name": group,
				"versions": [{"groupVersion": gv, "version": version}],
				"preferredVersion": {"groupVersion": gv, "version": version}
			})
		})
		.collect();

	Mock::given(method("GET"))
		.and(path(apis_path.as_str()))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIGroupList",
			"apiVersion": "v1",
			"groups": groups
		})))
		.with_priority(priority)
		.mount(server)
		.await;

	Mock::given(method("GET"))
		.and(path(format!("{prefix}/api/v1")))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIResourceList",
			"apiVersion": "v1",
			"groupVersion": "v1",
			"resources": legacy_resources(&discovery.core_resources)
		})))
		.with_priority(priority)
		.mount(server)
		.await;

	for (gv, rs) in &discovery.group_resources {
		Mock::given(method("GET"))
			.and(path(format!("{prefix}/apis/{gv}")))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"kind": "APIResourceList",
				"apiVersion": "v1",
				"groupVersion": gv,
				"resources": legacy_resources(rs)
			})))
			.with_priority(priority)
			.mount(server)
			.await;
	}
}
