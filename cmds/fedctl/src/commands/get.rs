//! Get command handler.
//!
//! Displays one or many resources from the control plane and its member clusters,
//! optionally watching them for changes.

use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use k8s::parse_resource_args;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
	config::FedctlConfig,
	get::{
		self, ContentType, GetOptions, OperationScope, OutputCoordinator, OutputFormat,
		QueryRequest, RenderConfig,
	},
	k8s::{client::ClusterConnection, registry::KubeFleet},
};

/// Output formats accepted by `-o`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
	/// Table with additional columns.
	Wide,
	Json,
	Yaml,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
	#[error("--output-watch-events is only valid with --watch or --watch-only")]
	WatchEventsWithoutWatch,

	#[error("--watch and --watch-only only support table output, not `-o {0}`")]
	WatchRequiresTable(&'static str),
}

#[derive(Args, Debug)]
pub struct GetArgs {
	/// Resources to display: TYPE[.VERSION][.GROUP] [NAME...] or TYPE/NAME...
	#[arg(required = true)]
	pub resources: Vec<String>,

	/// Path to the kubeconfig file of the control plane
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Name of the kubeconfig context to use
	#[arg(long)]
	pub context: Option<String>,

	/// Namespace to query; defaults to the context's namespace
	#[arg(short = 'n', long)]
	pub namespace: Option<String>,

	/// List the requested objects across all namespaces
	#[arg(short = 'A', long)]
	pub all_namespaces: bool,

	/// Which clusters to query
	#[arg(short = 's', long, value_enum, default_value = "control-plane")]
	pub operation_scope: OperationScope,

	/// Member clusters to query, comma separated; defaults to every registered member
	#[arg(short = 'C', long, value_delimiter = ',')]
	pub clusters: Vec<String>,

	/// Label selector to filter on
	#[arg(short = 'l', long)]
	pub selector: Option<String>,

	/// Field selector to filter on
	#[arg(long)]
	pub field_selector: Option<String>,

	/// After listing the requested objects, watch for changes
	#[arg(short = 'w', long)]
	pub watch: bool,

	/// Watch for changes without listing the current objects first
	#[arg(long)]
	pub watch_only: bool,

	/// Add an EVENT column with the type of each watch event
	#[arg(long)]
	pub output_watch_events: bool,

	/// Output format
	#[arg(short = 'o', long, value_enum)]
	pub output: Option<OutputArg>,

	/// Don't print headers
	#[arg(long)]
	pub no_headers: bool,

	/// Don't fail when a requested object does not exist
	#[arg(long)]
	pub ignore_not_found: bool,

	/// Page size of list requests; overrides `chunkSize` from .fedctl.yaml
	#[arg(long)]
	pub chunk_size: Option<u32>,

	/// Log level (possible values: error, warn, info, debug, trace)
	#[arg(long)]
	pub log_level: Option<tracing::Level>,
}

impl GetArgs {
	fn watching(&self) -> bool {
		self.watch || self.watch_only
	}

	fn format(&self) -> OutputFormat {
		match self.output {
			None => OutputFormat::Table { wide: false },
			Some(OutputArg::Wide) => OutputFormat::Table { wide: true },
			Some(OutputArg::Json) => OutputFormat::Json,
			Some(OutputArg::Yaml) => OutputFormat::Yaml,
		}
	}

	pub fn validate(&self) -> Result<(), UsageError> {
		if self.output_watch_events && !self.watching() {
			return Err(UsageError::WatchEventsWithoutWatch);
		}
		if self.watching() {
			match self.output {
				Some(OutputArg::Json) => return Err(UsageError::WatchRequiresTable("json")),
				Some(OutputArg::Yaml) => return Err(UsageError::WatchRequiresTable("yaml")),
				_ => {}
			}
		}
		Ok(())
	}

	/// Engine options, with flags taking precedence over `config`.
	pub fn options(&self, config: &FedctlConfig, default_namespace: &str) -> Result<GetOptions> {
		let namespace = self
			.namespace
			.clone()
			.unwrap_or_else(|| default_namespace.to_string());
		let format = self.format();

		Ok(GetOptions {
			scope: self.operation_scope,
			clusters: self.clusters.clone(),
			control_plane_name: config.control_plane_name(),
			query: QueryRequest {
				resources: parse_resource_args(&self.resources)?,
				namespace: namespace.clone(),
				all_namespaces: self.all_namespaces,
				label_selector: self.selector.clone(),
				field_selector: self.field_selector.clone(),
				page_size: self.chunk_size.unwrap_or_else(|| config.chunk_size()),
				content: ContentType::default(),
				ignore_not_found: self.ignore_not_found,
			},
			render: RenderConfig {
				namespace,
				all_namespaces: self.all_namespaces,
				no_headers: self.no_headers,
				ignore_not_found: self.ignore_not_found,
				output_watch_events: self.output_watch_events,
				watch_only: self.watch_only,
				scope: self.operation_scope,
				managed_label: config.managed_label(),
				elevated_adoption: config.elevated_adoption_resources(),
			},
			format,
			watch: self.watching(),
		})
	}
}

/// Run the get command.
pub fn run<W: Write + Send + 'static>(args: GetArgs, writer: W) -> Result<()> {
	args.validate()?;

	let cwd = std::env::current_dir().context("reading the working directory")?;
	let config = FedctlConfig::load_from_directory(&cwd)?.unwrap_or_default();

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(run_async(args, config, writer))
}

#[instrument(skip_all)]
async fn run_async<W: Write + Send + 'static>(
	args: GetArgs,
	config: FedctlConfig,
	writer: W,
) -> Result<()> {
	let connection = ClusterConnection::infer(
		args.kubeconfig.as_deref(),
		args.context.as_deref(),
		config.api_timeout(),
	)
	.await
	.context("connecting to the control plane")?;
	let options = args.options(&config, connection.default_namespace())?;
	let fleet = KubeFleet::new(connection, config.registry_settings());

	let out = Arc::new(OutputCoordinator::new(writer));
	let cancel = CancellationToken::new();
	let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));

	let outcome = get::run(&fleet, options, out.clone(), cancel).await;
	interrupt.abort();
	let outcome = outcome?;

	out.with_sink(|sink| sink.flush())?;
	if let Some(diagnostic) = &outcome.diagnostic {
		eprintln!("{diagnostic}");
	}
	if !outcome.errors.is_empty() {
		return Err(outcome.errors.into());
	}
	Ok(())
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
	if tokio::signal::ctrl_c().await.is_ok() {
		debug!("interrupted, stopping watches");
		cancel.cancel();
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use clap::Parser;
	use k8s::ResourceRequest;

	use super::*;

	#[derive(Parser)]
	struct Cli {
		#[command(flatten)]
		args: GetArgs,
	}

	fn parse(argv: &[&str]) -> GetArgs {
		Cli::try_parse_from(std::iter::once("fedctl").chain(argv.iter().copied()))
			.unwrap()
			.args
	}

	#[test]
	fn test_flags_override_config() {
		let config: FedctlConfig =
			serde_yaml_with_quirks::from_str("chunkSize: 100\ncontrolPlaneName: hub").unwrap();
		let args = parse(&["pods", "nginx", "-s", "all", "-C", "m1,m2", "--chunk-size", "7", "-o", "wide"]);

		let options = args.options(&config, "team-a").unwrap();

		assert_eq!(options.scope, OperationScope::All);
		assert_eq!(options.clusters, vec!["m1", "m2"]);
		assert_eq!(options.control_plane_name, "hub");
		assert_eq!(options.query.page_size, 7);
		assert_eq!(options.query.namespace, "team-a");
		assert_eq!(
			options.query.resources,
			vec![ResourceRequest::new("pods").with_names(["nginx"])]
		);
		assert_eq!(options.format, OutputFormat::Table { wide: true });
		assert!(!options.watch);
	}

	#[test]
	fn test_defaults() {
		let options = parse(&["po"]).options(&FedctlConfig::default(), "default").unwrap();
		assert_eq!(options.scope, OperationScope::ControlPlane);
		assert_eq!(options.control_plane_name, "karmada");
		assert_eq!(options.query.page_size, 500);
		assert_eq!(options.query.resources, vec![ResourceRequest::new("pods")]);
		assert_eq!(options.render.elevated_adoption, vec!["pods"]);
	}

	#[test]
	fn test_watch_only_implies_watch() {
		let options = parse(&["pods", "--watch-only", "-n", "kube-system"])
			.options(&FedctlConfig::default(), "default")
			.unwrap();
		assert!(options.watch);
		assert!(options.render.watch_only);
		assert_eq!(options.render.namespace, "kube-system");
	}

	#[test]
	fn test_watch_events_require_watch() {
		assert_matches!(
			parse(&["pods", "--output-watch-events"]).validate(),
			Err(UsageError::WatchEventsWithoutWatch)
		);
		assert_matches!(parse(&["pods", "-w", "--output-watch-events"]).validate(), Ok(()));
	}

	#[test]
	fn test_watch_requires_table_output() {
		assert_matches!(
			parse(&["pods", "-w", "-o", "json"]).validate(),
			Err(UsageError::WatchRequiresTable("json"))
		);
		assert_matches!(parse(&["pods", "-w", "-o", "wide"]).validate(), Ok(()));
	}

	#[test]
	fn test_resource_arguments_are_required() {
		assert!(Cli::try_parse_from(["fedctl"]).is_err());
	}

	#[test]
	fn test_mixed_argument_forms_are_rejected() {
		let err = parse(&["pods", "pods/nginx"])
			.options(&FedctlConfig::default(), "default")
			.unwrap_err();
		assert!(err.to_string().contains("resource/name form"));
	}
}
