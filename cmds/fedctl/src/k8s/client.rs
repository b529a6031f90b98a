//! Control-plane connection and member clients reached through the cluster proxy.

use std::{path::Path, time::Duration};

use http::Uri;
use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::{debug, instrument};

/// Default connect timeout for the control plane and members.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to the control plane or a member.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your $KUBECONFIG")]
	ContextNotFound(String),

	#[error("kubeconfig has no current context; pass --context")]
	NoCurrentContext,

	#[error("invalid proxy url `{url}`")]
	InvalidProxyUrl {
		url: String,
		#[source]
		source: http::uri::InvalidUri,
	},

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Connection to the control plane.
///
/// Member clients are derived from it by pointing the same credentials at the control
/// plane's per-cluster proxy path.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	config: Config,
	context: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("context", &self.context)
			.field("cluster_url", &self.config.cluster_url)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using the kubeconfig at `path`, or the default kubeconfig lookup.
	#[instrument(skip_all)]
	pub async fn infer(
		path: Option<&Path>,
		context: Option<&str>,
		timeout: Duration,
	) -> Result<Self, ConnectionError> {
		let kubeconfig = match path {
			Some(path) => Kubeconfig::read_from(path)?,
			None => Kubeconfig::read()?,
		};
		Self::from_kubeconfig(kubeconfig, context, timeout).await
	}

	/// Connect using a provided kubeconfig, with `context` or the current context.
	#[instrument(skip_all, fields(context))]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
		timeout: Duration,
	) -> Result<Self, ConnectionError> {
		let context = match context {
			Some(name) if kubeconfig.contexts.iter().any(|c| c.name == name) => name.to_string(),
			Some(name) => return Err(ConnectionError::ContextNotFound(name.to_string())),
			None => kubeconfig
				.current_context
				.clone()
				.ok_or(ConnectionError::NoCurrentContext)?,
		};
		tracing::Span::current().record("context", context.as_str());

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(context.clone()),
				..Default::default()
			},
		)
		.await?;
		config.connect_timeout = Some(timeout);
		debug!(cluster_url = %config.cluster_url, "connecting to control plane");
		let client = Client::try_from(config.clone())?;

		Ok(Self {
			client,
			config,
			context,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Get the default namespace from the current context.
	pub fn default_namespace(&self) -> &str {
		self.client.default_namespace()
	}

	pub fn context(&self) -> &str {
		&self.context
	}

	/// Client whose requests go to `<control plane>/<proxy_path>/...`.
	pub fn proxied_client(&self, proxy_path: &str) -> Result<Client, ConnectionError> {
		let mut config = self.config.clone();
		let url = format!(
			"{}/{}",
			config.cluster_url.to_string().trim_end_matches('/'),
			proxy_path.trim_matches('/')
		);
		config.cluster_url = url
			.parse::<Uri>()
			.map_err(|source| ConnectionError::InvalidProxyUrl { url, source })?;
		Ok(Client::try_from(config)?)
	}
}
