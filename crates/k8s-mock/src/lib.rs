//! Mock federated Kubernetes API server for testing.
//!
//! Serves a control plane and its member clusters (behind the control plane's
//! cluster proxy path) over HTTP, so kubeconfig-based connections work unchanged.

pub mod discovery;
mod helpers;
pub mod http;

pub use discovery::{DiscoveryMode, MockApiResource, MockDiscovery};
pub use http::{
	HttpMockK8sServer, MockMember, MockWatchEvent, RunningHttpMockK8sServer, DEFAULT_PROXY_PATH,
};
