//! Concurrent per-target collection.

use std::{
	collections::HashMap,
	mem,
	sync::{Arc, Mutex},
};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{
	backend::{QueryError, QueryRequest, QueryResponse},
	error::{ErrorSet, GetError},
	lock,
	record::ResourceRecord,
	target::Target,
};

/// Everything gathered by one list pass, records sorted by resource type.
#[derive(Debug, Default)]
pub struct Collected {
	pub records: Vec<ResourceRecord>,
	pub errors: ErrorSet,
}

/// A target that answered the initial query of a watch, with what it returned.
#[derive(Debug)]
pub struct WatchHandle {
	pub target: Target,
	pub responses: Vec<QueryResponse>,
}

#[derive(Debug, Default)]
pub struct WatchCollected {
	pub handles: Vec<WatchHandle>,
	pub errors: ErrorSet,
}

#[derive(Debug, Default)]
struct Shared {
	records: Vec<ResourceRecord>,
	handles: Vec<WatchHandle>,
	errors: ErrorSet,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
	List,
	Watch,
}

/// Query every target concurrently; failing targets end up in the error set.
///
/// Fails with [`GetError::Interrupted`] when `cancel` fires before every target answered.
pub async fn collect(
	targets: &[Target],
	request: &QueryRequest,
	cancel: &CancellationToken,
) -> Result<Collected, GetError> {
	let Shared {
		mut records, errors, ..
	} = fan_out(targets, request, Mode::List, cancel).await?;
	// Stable: arrival order is kept within a resource type.
	records.sort_by_cached_key(|r| r.type_id.to_string());
	Ok(Collected { records, errors })
}

/// Like [`collect`], keeping each target's responses together for subscribing afterwards.
pub async fn collect_for_watch(
	targets: &[Target],
	request: &QueryRequest,
	cancel: &CancellationToken,
) -> Result<WatchCollected, GetError> {
	let Shared {
		mut handles,
		errors,
		..
	} = fan_out(targets, request, Mode::Watch, cancel).await?;
	let order: HashMap<&str, usize> = targets
		.iter()
		.enumerate()
		.map(|(i, t)| (t.name.as_str(), i))
		.collect();
	handles.sort_by_key(|h| order.get(h.target.name.as_str()).copied().unwrap_or(usize::MAX));
	Ok(WatchCollected { handles, errors })
}

async fn fan_out(
	targets: &[Target],
	request: &QueryRequest,
	mode: Mode,
	cancel: &CancellationToken,
) -> Result<Shared, GetError> {
	let shared = Arc::new(Mutex::new(Shared::default()));
	let request = Arc::new(request.clone());

	let mut join_set = JoinSet::new();
	let mut names = HashMap::new();
	for target in targets {
		let handle = join_set.spawn(collect_target(
			target.clone(),
			request.clone(),
			mode,
			shared.clone(),
		));
		names.insert(handle.id(), target.name.clone());
	}

	loop {
		let result = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				debug!(pending = join_set.len(), "interrupted while collecting");
				join_set.abort_all();
				return Err(GetError::Interrupted);
			}
			next = join_set.join_next_with_id() => match next {
				Some(result) => result,
				None => break,
			},
		};
		if let Err(e) = result {
			let cluster = names.get(&e.id()).cloned().unwrap_or_default();
			warn!(%cluster, error = %e, "collection task failed");
			lock(&shared)
				.errors
				.push(Some(&cluster), GetError::TaskPanicked { cluster: cluster.clone() });
		}
	}

	let taken = mem::take(&mut *lock(&shared));
	Ok(taken)
}

#[instrument(skip_all, fields(cluster = %target.name))]
async fn collect_target(
	target: Target,
	request: Arc<QueryRequest>,
	mode: Mode,
	shared: Arc<Mutex<Shared>>,
) {
	if !target.is_control_plane {
		if let Err(source) = target.backend.probe().await {
			warn!(error = %source, "member cluster unreachable");
			lock(&shared).errors.push(
				Some(&target.name),
				GetError::TargetUnreachable {
					cluster: target.name.clone(),
					source,
				},
			);
			return;
		}
	}

	let responses = match target.backend.query(&request).await {
		Ok(responses) => responses,
		Err(QueryError::NotFound { resource, name }) if request.ignore_not_found => {
			debug!(%resource, %name, "ignoring missing object");
			return;
		}
		Err(QueryError::NotFound { resource, name }) => {
			lock(&shared).errors.push(
				Some(&target.name),
				GetError::NotFound {
					cluster: target.name.clone(),
					resource,
					name,
				},
			);
			return;
		}
		Err(source) => {
			warn!(error = %source, "query failed");
			lock(&shared).errors.push(
				Some(&target.name),
				GetError::QueryFailed {
					cluster: target.name.clone(),
					source,
				},
			);
			return;
		}
	};
	debug!(documents = responses.len(), "query finished");

	let origin = target.origin();
	let mut shared = lock(&shared);
	match mode {
		Mode::List => shared
			.records
			.extend(responses.into_iter().map(|response| ResourceRecord {
				origin: origin.clone(),
				type_id: response.type_id,
				namespaced: response.namespaced,
				document: response.document,
			})),
		Mode::Watch => shared.handles.push(WatchHandle { target, responses }),
	}
}
