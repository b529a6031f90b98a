//! Federated `get`: send one query to the control plane and its member clusters and
//! present the answers as a single table (or a single live stream when watching).

pub mod backend;
pub mod error;
pub mod fanout;
pub mod printer;
pub mod record;
pub mod table;
pub mod target;
pub mod watch;
pub mod writer;

use std::{
	io::Write,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, field, instrument, warn, Span};

pub use self::{
	backend::{ClusterBackend, ContentType, Fleet, QueryError, QueryRequest},
	error::{ErrorSet, GetError},
	printer::{OutputFormat, Printers},
	table::{Diagnostic, ManagedLabel, RenderConfig},
	target::OperationScope,
	writer::OutputCoordinator,
};
use self::{
	fanout::{collect, collect_for_watch, Collected, WatchCollected},
	printer::print_list,
	table::render_list,
	target::resolve_targets,
	watch::run_watch,
};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything one invocation needs besides the fleet and the sink.
#[derive(Debug, Clone)]
pub struct GetOptions {
	pub scope: OperationScope,
	pub clusters: Vec<String>,
	/// Cluster cell shown for control-plane rows.
	pub control_plane_name: String,
	pub query: QueryRequest,
	pub render: RenderConfig,
	pub format: OutputFormat,
	/// Watch or watch-only; the latter is `render.watch_only`.
	pub watch: bool,
}

#[derive(Debug, Default)]
pub struct GetOutcome {
	pub errors: ErrorSet,
	pub diagnostic: Option<Diagnostic>,
}

/// Run one `get`.
///
/// Problems affecting the invocation as a whole are returned as `Err`; per-target failures
/// are collected into [`GetOutcome::errors`] while the other targets are still shown.
#[instrument(name = "get", skip_all, fields(scope = ?options.scope, watch = options.watch, targets = field::Empty))]
pub async fn run<W: Write + Send + 'static>(
	fleet: &dyn Fleet,
	options: GetOptions,
	out: Arc<OutputCoordinator<W>>,
	cancel: CancellationToken,
) -> Result<GetOutcome, GetError> {
	let GetOptions {
		scope,
		clusters,
		control_plane_name,
		mut query,
		mut render,
		format,
		watch,
	} = options;
	query.content = if format.is_table() {
		ContentType::Table
	} else {
		ContentType::Object
	};
	render.scope = scope;

	let targets = resolve_targets(fleet, scope, &clusters, &control_plane_name).await?;
	let member_count = targets.iter().filter(|t| !t.is_control_plane).count();
	Span::current().record("targets", targets.len());
	debug!(member_count, "querying");
	let printers = Printers {
		format,
		no_headers: render.no_headers,
	};

	if watch {
		let names: usize = query.resources.iter().map(|r| r.names.len()).sum();
		if names > 1 {
			return Err(GetError::WatchTooManyObjects(names));
		}
		let WatchCollected {
			handles,
			mut errors,
		} = collect_for_watch(&targets, &query, &cancel).await?;
		if handles.iter().all(|h| h.responses.is_empty()) {
			if errors.is_empty() {
				return Err(GetError::NoWatchTargets);
			}
			return Ok(GetOutcome {
				errors,
				diagnostic: None,
			});
		}
		match run_watch(handles, &query, Arc::new(render), &printers, out, cancel).await {
			Ok(watch_errors) => errors.extend(watch_errors),
			Err(e) => {
				warn!(error = %e, "watch aborted");
				errors.push(None, e);
			}
		}
		return Ok(GetOutcome {
			errors,
			diagnostic: None,
		});
	}

	let Collected {
		records,
		mut errors,
	} = collect(&targets, &query, &cancel).await?;
	let diagnostic = match format {
		OutputFormat::Table { .. } => render_list(&records, &render, member_count, &printers, &out, &mut errors),
		format => {
			if let Err(e) = out.with_sink(|sink| print_list(format, &records, sink)) {
				errors.push(None, e.into());
			}
			None
		}
	};
	Ok(GetOutcome { errors, diagnostic })
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use assert_matches::assert_matches;
	use indoc::indoc;
	use k8s::ResourceRequest;
	use serde_json::Value;

	use super::*;
	use crate::test_utils::{query_request, FakeBackend, FakeEvent, FakeFleet};

	fn options(scope: OperationScope) -> GetOptions {
		GetOptions {
			scope,
			clusters: Vec::new(),
			control_plane_name: "karmada".to_string(),
			query: query_request(&["pods"]),
			render: RenderConfig {
				scope,
				..RenderConfig::default()
			},
			format: OutputFormat::Table { wide: false },
			watch: false,
		}
	}

	async fn get(fleet: &FakeFleet, options: GetOptions) -> (Result<GetOutcome, GetError>, String) {
		let out = Arc::new(OutputCoordinator::new(Vec::new()));
		let result = run(fleet, options, out.clone(), CancellationToken::new()).await;
		let output = Arc::try_unwrap(out).ok().unwrap().into_inner();
		(result, String::from_utf8(output).unwrap())
	}

	#[tokio::test]
	async fn test_member_rows_with_adoption() {
		let fleet = FakeFleet::new(&[]).with_member(
			"member1",
			FakeBackend::with_pods(&["nginx", "redis"]).managing(&["nginx"]),
		);

		let (result, output) = get(&fleet, options(OperationScope::All)).await;

		let outcome = result.unwrap();
		assert!(outcome.errors.is_empty());
		assert_eq!(outcome.diagnostic, None);
		assert_eq!(
			output,
			indoc! {"
				NAME    CLUSTER   STATUS    ADOPTION
				nginx   member1   Running   Y
				redis   member1   Running   N
			"}
		);
	}

	#[tokio::test]
	async fn test_unknown_cluster_fails_before_querying() {
		let fleet = FakeFleet::new(&["member1"]);
		let mut options = options(OperationScope::All);
		options.clusters = vec!["member9".to_string()];

		let (result, output) = get(&fleet, options).await;

		assert_matches!(result, Err(GetError::UnknownCluster(missing)) if missing == vec!["member9"]);
		assert_eq!(output, "");
	}

	#[tokio::test]
	async fn test_unreachable_member_is_reported_alongside_rows() {
		let fleet = FakeFleet::new(&[])
			.with_control_plane(FakeBackend::with_pods(&["cp-pod"]))
			.with_member("member1", FakeBackend::unreachable())
			.with_member("member2", FakeBackend::with_pods(&["nginx"]));
		let mut options = options(OperationScope::All);
		options.query.ignore_not_found = true;
		options.render.ignore_not_found = true;

		let (result, output) = get(&fleet, options).await;

		let outcome = result.unwrap();
		assert_eq!(
			outcome.errors.messages(),
			vec!["cluster(member1) is inaccessible, please check authorization or network"]
		);
		assert!(output.contains("cp-pod   karmada"));
		assert!(output.contains("nginx    member2"));
		assert!(!output.contains("member1"));
	}

	#[tokio::test]
	async fn test_members_scope_without_members() {
		let (result, output) = get(&FakeFleet::new(&[]), options(OperationScope::Members)).await;
		let outcome = result.unwrap();
		assert_eq!(output, "");
		assert_eq!(outcome.diagnostic, Some(Diagnostic::NoMemberClusters));
	}

	#[tokio::test]
	async fn test_json_output_has_no_provenance() {
		let fleet = FakeFleet::new(&[]).with_control_plane(FakeBackend::with_pods(&["cp-pod"]));
		let mut options = options(OperationScope::ControlPlane);
		options.format = OutputFormat::Json;

		let (result, output) = get(&fleet, options).await;

		assert!(result.unwrap().errors.is_empty());
		let list: Value = serde_json::from_str(&output).unwrap();
		assert_eq!(list["kind"], "List");
		assert!(!output.contains("CLUSTER"));
	}

	#[tokio::test]
	async fn test_watch_across_targets_prints_header_once() {
		let fleet = FakeFleet::new(&[])
			.with_control_plane(
				FakeBackend::with_pods(&["cp-pod"]).with_events(vec![FakeEvent::modified("cp-pod")]),
			)
			.with_member(
				"member1",
				FakeBackend::with_pods(&["nginx"]).with_events(vec![FakeEvent::added("fresh")]),
			);
		let mut options = options(OperationScope::All);
		options.watch = true;

		let (result, output) = get(&fleet, options).await;

		assert!(result.unwrap().errors.is_empty());
		let lines: Vec<_> = output.lines().collect();
		assert_eq!(lines.len(), 5);
		assert!(lines[0].starts_with("NAME"));
		assert!(lines[1].starts_with("cp-pod"));
		assert!(lines[2].starts_with("nginx"));
		assert!(lines[3..].iter().any(|l| l.starts_with("cp-pod")));
		assert!(lines[3..].iter().any(|l| l.starts_with("fresh")));
		assert_eq!(output.matches("NAME").count(), 1);
	}

	#[tokio::test]
	async fn test_aborted_watch_keeps_target_errors() {
		let fleet = FakeFleet::new(&[])
			.with_control_plane(FakeBackend::with_pods(&["a"]).with_deployments(&["b"]))
			.with_member("member1", FakeBackend::unreachable());
		let mut options = options(OperationScope::All);
		options.watch = true;
		options.query = query_request(&["pods", "deployments"]);

		let (result, output) = get(&fleet, options).await;

		let outcome = result.unwrap();
		assert_eq!(
			outcome.errors.messages(),
			vec![
				"cluster(member1) is inaccessible, please check authorization or network",
				"watch is only supported on individual resources and resource collections - more than 1 resource was found",
			]
		);
		assert_eq!(output, "");
	}

	#[tokio::test]
	async fn test_interrupt_while_collecting() {
		let fleet = FakeFleet::new(&[])
			.with_control_plane(FakeBackend::with_pods(&["cp-pod"]))
			.with_member("member1", FakeBackend::with_pods(&["nginx"]).stalled());
		let out = Arc::new(OutputCoordinator::new(Vec::new()));
		let cancel = CancellationToken::new();

		let canceller = {
			let cancel = cancel.clone();
			tokio::spawn(async move {
				tokio::time::sleep(Duration::from_millis(20)).await;
				cancel.cancel();
			})
		};
		let result = run(&fleet, options(OperationScope::All), out, cancel).await;
		canceller.await.unwrap();

		assert_matches!(result, Err(GetError::Interrupted));
	}

	#[tokio::test]
	async fn test_watch_rejects_several_names() {
		let fleet = FakeFleet::new(&[]);
		let mut options = options(OperationScope::ControlPlane);
		options.watch = true;
		options.query.resources = vec![ResourceRequest::new("pods").with_names(["a", "b"])];

		let (result, _) = get(&fleet, options).await;
		assert_matches!(result, Err(GetError::WatchTooManyObjects(2)));
	}

	#[tokio::test]
	async fn test_watch_without_anything_to_watch() {
		let (result, _) = {
			let mut options = options(OperationScope::Members);
			options.watch = true;
			get(&FakeFleet::new(&[]), options).await
		};
		assert_matches!(result, Err(GetError::NoWatchTargets));
	}
}
