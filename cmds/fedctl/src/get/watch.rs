//! Watch multiplexing: one subscription per target, merged into a single ordered output.

use std::{
	collections::HashMap,
	io::{self, Write},
	mem,
	sync::{Arc, Mutex},
};

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{
	backend::{EventType, QueryRequest, WatchRequest},
	error::{ErrorSet, GetError},
	fanout::WatchHandle,
	lock,
	printer::{PrinterFactory, ResourcePrinter},
	record::{Origin, ResourceRecord, ResourceTypeId, Table},
	table::{build_table, reconstruct_table, RenderConfig},
	target::Target,
	writer::OutputCoordinator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// The next event duplicates a row that was already printed.
	AwaitingFirstEvent,
	Streaming,
}

/// A live subscription against one target.
#[derive(Debug)]
pub struct WatchSession {
	target: Target,
	request: WatchRequest,
	state: SessionState,
}

impl WatchSession {
	/// Sessions for a single named object start by discarding the server's first event.
	pub fn new(target: Target, request: WatchRequest) -> Self {
		let state = if request.name.is_some() {
			SessionState::AwaitingFirstEvent
		} else {
			SessionState::Streaming
		};
		Self {
			target,
			request,
			state,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Advance on an incoming event; returns whether it should be rendered.
	pub fn observe(&mut self) -> bool {
		match self.state {
			SessionState::AwaitingFirstEvent => {
				self.state = SessionState::Streaming;
				false
			}
			SessionState::Streaming => true,
		}
	}
}

/// The single resource type every handle returned.
fn watched_type(handles: &[WatchHandle]) -> Result<(ResourceTypeId, bool), GetError> {
	let mut responses = handles.iter().flat_map(|h| h.responses.iter());
	let first = responses.next().ok_or(GetError::NoWatchTargets)?;
	if responses.any(|r| !r.type_id.same_kind(&first.type_id)) {
		return Err(GetError::MultipleKindsWatchUnsupported);
	}
	Ok((first.type_id.clone(), first.namespaced))
}

/// Print one table, carrying column headers only until they have been emitted once.
///
/// A table without rows prints just its headers.
fn render<W: Write>(
	out: &OutputCoordinator<W>,
	printer: &dyn ResourcePrinter,
	mut table: Table,
) -> io::Result<()> {
	out.with_sink(|sink| {
		if sink.headers_emitted() {
			table.column_definitions.clear();
		}
		if table.rows.is_empty() {
			if printer.print_headers(&table, sink)? {
				sink.mark_headers_emitted();
			}
		} else {
			printer.print_table(&table, sink)?;
			if !table.column_definitions.is_empty() {
				sink.mark_headers_emitted();
			}
		}
		sink.flush()
	})
}

/// Print the initial state of every target, then stream events until all subscriptions end
/// or `cancel` fires.
///
/// Structural problems fail before any subscription is opened; per-target failures are
/// returned in the error set while the other targets keep streaming.
pub async fn run_watch<W: Write + Send + 'static>(
	handles: Vec<WatchHandle>,
	query: &QueryRequest,
	config: Arc<RenderConfig>,
	printers: &dyn PrinterFactory,
	out: Arc<OutputCoordinator<W>>,
	cancel: CancellationToken,
) -> Result<ErrorSet, GetError> {
	let (type_id, namespaced) = watched_type(&handles)?;
	let printer: Arc<dyn ResourcePrinter> = Arc::from(printers.make_printer(
		&type_id,
		config.with_namespace(namespaced),
		false,
	)?);
	let initial_event = config.output_watch_events.then_some(EventType::Added);

	let mut records = Vec::new();
	let mut sessions = Vec::new();
	for WatchHandle { target, responses } in handles {
		let Some(first) = responses.first() else {
			continue;
		};
		let origin = target.origin();
		records.extend(responses.iter().map(|response| ResourceRecord {
			origin: origin.clone(),
			type_id: type_id.clone(),
			namespaced,
			document: response.document.clone(),
		}));

		let resource_version = match &first.name {
			Some(_) => "0".to_string(),
			None => first
				.document
				.resource_version()
				.unwrap_or_else(|| "0".to_string()),
		};
		let request = WatchRequest {
			type_id: type_id.clone(),
			namespace: query
				.scoped_namespace()
				.filter(|_| namespaced)
				.map(str::to_string),
			label_selector: query.label_selector.clone(),
			field_selector: query.field_selector.clone(),
			name: first.name.clone(),
			resource_version,
		};
		sessions.push(WatchSession::new(target, request));
	}

	// One table for every target, so the initial rows share column widths.
	let mut table = build_table(&records, &config, initial_event)?;
	if config.watch_only {
		table.rows.clear();
	}
	render(&out, printer.as_ref(), table)?;

	let errors = Arc::new(Mutex::new(ErrorSet::new()));
	let mut join_set = JoinSet::new();
	let mut names = HashMap::new();
	for session in sessions {
		let cluster = session.target.name.clone();
		let handle = join_set.spawn(stream_session(
			session,
			printer.clone(),
			config.clone(),
			out.clone(),
			errors.clone(),
			cancel.clone(),
		));
		names.insert(handle.id(), cluster);
	}
	while let Some(result) = join_set.join_next_with_id().await {
		if let Err(e) = result {
			let cluster = names.get(&e.id()).cloned().unwrap_or_default();
			warn!(%cluster, error = %e, "watch task failed");
			lock(&errors).push(Some(&cluster), GetError::TaskPanicked { cluster: cluster.clone() });
		}
	}

	let taken = mem::take(&mut *lock(&errors));
	Ok(taken)
}

fn record_error(errors: &Mutex<ErrorSet>, origin: &Origin, error: GetError) {
	lock(errors).push(Some(&origin.cluster), error);
}

#[instrument(skip_all, fields(cluster = %session.target.name))]
async fn stream_session<W: Write + Send + 'static>(
	mut session: WatchSession,
	printer: Arc<dyn ResourcePrinter>,
	config: Arc<RenderConfig>,
	out: Arc<OutputCoordinator<W>>,
	errors: Arc<Mutex<ErrorSet>>,
	cancel: CancellationToken,
) {
	let origin = session.target.origin();
	let opened = tokio::select! {
		_ = cancel.cancelled() => return,
		opened = session.target.backend.watch(&session.request) => opened,
	};
	let mut events = match opened {
		Ok(events) => events,
		Err(source) => {
			warn!(error = %source, "failed to open watch");
			let cluster = origin.cluster.clone();
			record_error(&errors, &origin, GetError::WatchFailed { cluster, source });
			return;
		}
	};
	debug!(resource_version = %session.request.resource_version, "watch opened");

	loop {
		let next = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				debug!("watch cancelled");
				break;
			}
			next = events.next() => next,
		};
		let event = match next {
			None => {
				debug!("watch stream closed");
				break;
			}
			Some(Err(source)) => {
				warn!(error = %source, "watch stream failed");
				let cluster = origin.cluster.clone();
				record_error(&errors, &origin, GetError::WatchFailed { cluster, source });
				break;
			}
			Some(Ok(event)) => event,
		};
		if !session.observe() {
			debug!("skipping first event of a single-object watch");
			continue;
		}

		let table = match event.document.to_table() {
			Ok(table) => table,
			Err(e) => {
				record_error(&errors, &origin, e.into());
				break;
			}
		};
		let table = reconstruct_table(
			table,
			&origin,
			&session.request.type_id,
			&config,
			config.output_watch_events.then_some(event.event_type),
		);
		if cancel.is_cancelled() {
			break;
		}
		if let Err(e) = render(&out, printer.as_ref(), table) {
			record_error(&errors, &origin, GetError::Output(e));
			break;
		}
	}
}
