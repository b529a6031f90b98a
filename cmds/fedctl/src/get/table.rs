//! Table reconstruction: provenance columns, adoption and type-grouped rendering.

use std::{fmt, io::Write};

use serde_json::Value;
use tracing::warn;

use super::{
	backend::EventType,
	error::{ErrorSet, GetError},
	printer::PrinterFactory,
	record::{multiple_kinds, ColumnDefinition, DecodeError, Origin, ResourceRecord, ResourceTypeId, Table, TableRow},
	target::OperationScope,
	writer::OutputCoordinator,
};

pub const CLUSTER_COLUMN: &str = "CLUSTER";
pub const ADOPTION_COLUMN: &str = "ADOPTION";
pub const EVENT_COLUMN: &str = "EVENT";

/// Whether a member-cluster object is managed by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adoption {
	Managed,
	Unmanaged,
	/// Control-plane rows: the notion does not apply.
	NotApplicable,
}

impl fmt::Display for Adoption {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Adoption::Managed => "Y",
			Adoption::Unmanaged => "N",
			Adoption::NotApplicable => "-",
		})
	}
}

/// Label marking an object as propagated by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedLabel {
	pub key: String,
	pub value: String,
}

impl Default for ManagedLabel {
	fn default() -> Self {
		Self {
			key: "karmada.io/managed".to_string(),
			value: "true".to_string(),
		}
	}
}

/// Per-invocation rendering settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
	pub namespace: String,
	pub all_namespaces: bool,
	pub no_headers: bool,
	pub ignore_not_found: bool,
	pub output_watch_events: bool,
	pub watch_only: bool,
	pub scope: OperationScope,
	pub managed_label: ManagedLabel,
	/// Resource plurals whose adoption column is shown without `-o wide`.
	pub elevated_adoption: Vec<String>,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			namespace: "default".to_string(),
			all_namespaces: false,
			no_headers: false,
			ignore_not_found: false,
			output_watch_events: false,
			watch_only: false,
			scope: OperationScope::default(),
			managed_label: ManagedLabel::default(),
			elevated_adoption: vec!["pods".to_string()],
		}
	}
}

impl RenderConfig {
	pub fn adoption_priority(&self, type_id: &ResourceTypeId) -> i32 {
		if self.elevated_adoption.contains(&type_id.plural) {
			0
		} else {
			1
		}
	}

	pub fn with_namespace(&self, namespaced: bool) -> bool {
		self.all_namespaces && namespaced
	}
}

pub fn adoption(origin: &Origin, row: &TableRow, label: &ManagedLabel) -> Adoption {
	if origin.is_control_plane {
		return Adoption::NotApplicable;
	}
	let Some(object) = &row.object else {
		warn!(cluster = %origin.cluster, "table row carries no object metadata, treating as unmanaged");
		return Adoption::Unmanaged;
	};
	if object.get("metadata").is_none_or(|m| !m.is_object()) {
		warn!(cluster = %origin.cluster, "table row object metadata is not decodable, treating as unmanaged");
		return Adoption::Unmanaged;
	}
	if k8s::meta::has_label(object, &label.key, &label.value) {
		Adoption::Managed
	} else {
		Adoption::Unmanaged
	}
}

/// Insert the cluster cell after the name cell, append adoption, optionally prepend the event.
pub fn reconstruct_row(
	mut row: TableRow,
	origin: &Origin,
	label: &ManagedLabel,
	event: Option<EventType>,
) -> TableRow {
	let adoption = adoption(origin, &row, label);
	let at = row.cells.len().min(1);
	row.cells.insert(at, Value::String(origin.cluster.clone()));
	row.cells.push(Value::String(adoption.to_string()));
	if let Some(event) = event {
		row.cells.insert(0, Value::String(event.to_string()));
	}
	row
}

/// Column schema matching [`reconstruct_row`]. Empty input stays empty.
pub fn merge_columns(
	columns: &[ColumnDefinition],
	adoption_priority: i32,
	with_event: bool,
) -> Vec<ColumnDefinition> {
	if columns.is_empty() {
		return Vec::new();
	}
	let mut merged = Vec::with_capacity(columns.len() + 3);
	if with_event {
		merged.push(ColumnDefinition::string(EVENT_COLUMN, 0));
	}
	merged.push(columns[0].clone());
	merged.push(ColumnDefinition::string(CLUSTER_COLUMN, 0));
	merged.extend(columns[1..].iter().cloned());
	merged.push(ColumnDefinition::string(ADOPTION_COLUMN, adoption_priority));
	merged
}

/// Decode one document and reconstruct its rows for `origin`.
pub fn reconstruct_table(
	table: Table,
	origin: &Origin,
	type_id: &ResourceTypeId,
	config: &RenderConfig,
	event: Option<EventType>,
) -> Table {
	Table {
		metadata: table.metadata,
		column_definitions: merge_columns(
			&table.column_definitions,
			config.adoption_priority(type_id),
			event.is_some(),
		),
		rows: table
			.rows
			.into_iter()
			.map(|row| reconstruct_row(row, origin, &config.managed_label, event))
			.collect(),
	}
}

/// Combine the records of one resource type into a single table.
///
/// The column schema comes from the first record carrying one; rows keep record order.
pub fn build_table(
	records: &[ResourceRecord],
	config: &RenderConfig,
	event: Option<EventType>,
) -> Result<Table, DecodeError> {
	let mut combined = Table::default();
	for record in records {
		let table = reconstruct_table(
			record.document.to_table()?,
			&record.origin,
			&record.type_id,
			config,
			event,
		);
		if combined.column_definitions.is_empty() {
			combined.column_definitions = table.column_definitions;
			combined.metadata = table.metadata;
		}
		combined.rows.extend(table.rows);
	}
	Ok(combined)
}

/// Message printed to stderr when nothing was written and nothing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
	NoMemberClusters,
	NoResourcesInNamespace(String),
	NoResources,
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Diagnostic::NoMemberClusters => write!(f, "No member clusters found in the control plane"),
			Diagnostic::NoResourcesInNamespace(ns) => write!(f, "No resources found in {ns} namespace."),
			Diagnostic::NoResources => write!(f, "No resources found"),
		}
	}
}

pub fn diagnostic(config: &RenderConfig, member_count: usize, all_namespaced: bool) -> Diagnostic {
	if !config.scope.includes_control_plane() && member_count == 0 {
		Diagnostic::NoMemberClusters
	} else if all_namespaced {
		Diagnostic::NoResourcesInNamespace(config.namespace.clone())
	} else {
		Diagnostic::NoResources
	}
}

/// Render sorted records, one printer per run of equal resource type.
///
/// Failures land in `errors`; a decode failure stops rendering.
pub fn render_list<W: Write>(
	records: &[ResourceRecord],
	config: &RenderConfig,
	member_count: usize,
	printers: &dyn PrinterFactory,
	out: &OutputCoordinator<W>,
	errors: &mut ErrorSet,
) -> Option<Diagnostic> {
	let with_kind = multiple_kinds(records);
	let all_namespaced = !config.all_namespaces && records.iter().all(|r| r.namespaced);
	let mut printed_group = false;

	for group in records.chunk_by(|a, b| a.type_id == b.type_id) {
		let first = &group[0];
		let printer = match printers.make_printer(
			&first.type_id,
			config.with_namespace(first.namespaced),
			with_kind,
		) {
			Ok(printer) => printer,
			Err(e) => {
				errors.push(None, e.into());
				continue;
			}
		};
		let table = match build_table(group, config, None) {
			Ok(table) => table,
			Err(e) => {
				errors.push(None, e.into());
				return None;
			}
		};

		let written = out.with_sink(|sink| {
			if printed_group && !config.no_headers && sink.written() > 0 {
				sink.set_separator_ready();
			}
			printer.print_table(&table, sink)?;
			sink.flush()
		});
		if let Err(e) = written {
			errors.push(None, GetError::Output(e));
			return None;
		}
		printed_group = true;
	}

	(out.written() == 0 && !config.ignore_not_found && errors.is_empty())
		.then(|| diagnostic(config, member_count, all_namespaced))
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use rstest::rstest;
	use serde_json::json;

	use super::*;
	use crate::get::{
		printer::{OutputFormat, Printers},
		record::Document,
	};

	fn member(name: &str) -> Origin {
		Origin {
			cluster: name.to_string(),
			is_control_plane: false,
		}
	}

	fn control_plane() -> Origin {
		Origin {
			cluster: "karmada".to_string(),
			is_control_plane: true,
		}
	}

	fn pods() -> ResourceTypeId {
		ResourceTypeId::new("", "v1", "Pod", "pods")
	}

	fn deployments() -> ResourceTypeId {
		ResourceTypeId::new("apps", "v1", "Deployment", "deployments")
	}

	fn row(name: &str, labels: Value) -> TableRow {
		TableRow {
			cells: vec![json!(name), json!("Running")],
			object: Some(json!({"metadata": {"name": name, "namespace": "default", "labels": labels}})),
		}
	}

	fn table_doc(rows: Vec<TableRow>) -> Document {
		Document::Typed(Box::new(Table {
			column_definitions: vec![
				ColumnDefinition {
					format: "name".to_string(),
					..ColumnDefinition::string("Name", 0)
				},
				ColumnDefinition::string("Status", 0),
			],
			rows,
			..Table::default()
		}))
	}

	fn record(origin: Origin, type_id: ResourceTypeId, rows: Vec<TableRow>) -> ResourceRecord {
		ResourceRecord {
			origin,
			type_id,
			namespaced: true,
			document: table_doc(rows),
		}
	}

	fn printers() -> Printers {
		Printers {
			format: OutputFormat::Table { wide: false },
			no_headers: false,
		}
	}

	fn render(records: &[ResourceRecord], config: &RenderConfig) -> (String, Option<Diagnostic>, ErrorSet) {
		let out = OutputCoordinator::new(Vec::new());
		let mut errors = ErrorSet::new();
		let diag = render_list(records, config, 1, &printers(), &out, &mut errors);
		(String::from_utf8(out.into_inner()).unwrap(), diag, errors)
	}

	#[rstest]
	#[case::managed(member("m1"), json!({"karmada.io/managed": "true"}), Adoption::Managed)]
	#[case::other_value(member("m1"), json!({"karmada.io/managed": "false"}), Adoption::Unmanaged)]
	#[case::unlabeled(member("m1"), json!({}), Adoption::Unmanaged)]
	#[case::control_plane(control_plane(), json!({"karmada.io/managed": "true"}), Adoption::NotApplicable)]
	fn test_adoption(#[case] origin: Origin, #[case] labels: Value, #[case] expected: Adoption) {
		assert_eq!(adoption(&origin, &row("nginx", labels), &ManagedLabel::default()), expected);
	}

	#[test]
	fn test_undecodable_metadata_is_unmanaged() {
		let broken = TableRow {
			cells: vec![json!("nginx")],
			object: Some(json!({"metadata": "garbage"})),
		};
		assert_eq!(adoption(&member("m1"), &broken, &ManagedLabel::default()), Adoption::Unmanaged);
	}

	#[rstest]
	#[case::plain(vec![json!("a"), json!("b"), json!("c")], None, vec!["a", "m1", "b", "c", "N"])]
	#[case::single_cell(vec![json!("a")], None, vec!["a", "m1", "N"])]
	#[case::no_cells(vec![], None, vec!["m1", "N"])]
	#[case::with_event(vec![json!("a"), json!("b")], Some(EventType::Modified), vec!["MODIFIED", "a", "m1", "b", "N"])]
	fn test_reconstruct_row_cell_count(
		#[case] cells: Vec<Value>,
		#[case] event: Option<EventType>,
		#[case] expected: Vec<&str>,
	) {
		let original_len = cells.len();
		let row = TableRow {
			cells,
			object: Some(json!({"metadata": {"name": "a"}})),
		};
		let rebuilt = reconstruct_row(row, &member("m1"), &ManagedLabel::default(), event);

		let extra = if event.is_some() { 3 } else { 2 };
		assert_eq!(rebuilt.cells.len(), original_len + extra);
		assert_eq!(rebuilt.cells, expected.into_iter().map(Value::from).collect::<Vec<_>>());
	}

	#[test]
	fn test_merge_columns() {
		let columns = vec![
			ColumnDefinition::string("Name", 0),
			ColumnDefinition::string("Ready", 0),
		];
		let merged = merge_columns(&columns, 1, true);
		let names: Vec<_> = merged.iter().map(|c| c.name.as_str()).collect();
		assert_eq!(names, vec!["EVENT", "Name", "CLUSTER", "Ready", "ADOPTION"]);
		assert_eq!(merged.last().map(|c| c.priority), Some(1));

		assert!(merge_columns(&[], 0, true).is_empty());
	}

	#[test]
	fn test_adoption_priority_follows_policy() {
		let config = RenderConfig::default();
		assert_eq!(config.adoption_priority(&pods()), 0);
		assert_eq!(config.adoption_priority(&deployments()), 1);
	}

	#[test]
	fn test_pods_across_control_plane_and_members() {
		let records = vec![
			record(control_plane(), pods(), vec![row("cp-pod", json!({}))]),
			record(member("m1"), pods(), vec![row("nginx", json!({"karmada.io/managed": "true"}))]),
			record(member("m2"), pods(), vec![row("redis", json!({}))]),
		];
		let (output, diag, errors) = render(&records, &RenderConfig::default());

		assert!(errors.is_empty());
		assert_eq!(diag, None);
		assert_eq!(
			output,
			indoc! {"
				NAME     CLUSTER   STATUS    ADOPTION
				cp-pod   karmada   Running   -
				nginx    m1        Running   Y
				redis    m2        Running   N
			"}
		);
	}

	#[test]
	fn test_groups_are_separated_and_qualified() {
		let records = vec![
			record(member("m1"), pods(), vec![row("nginx", json!({}))]),
			record(member("m1"), deployments(), vec![row("web", json!({}))]),
		];
		let (output, _, errors) = render(&records, &RenderConfig::default());

		assert!(errors.is_empty());
		assert_eq!(
			output,
			indoc! {"
				NAME        CLUSTER   STATUS    ADOPTION
				pod/nginx   m1        Running   N

				NAME                  CLUSTER   STATUS
				deployment.apps/web   m1        Running
			"}
		);
	}

	#[test]
	fn test_no_separator_without_headers() {
		let records = vec![
			record(member("m1"), pods(), vec![row("nginx", json!({}))]),
			record(member("m1"), deployments(), vec![row("web", json!({}))]),
		];
		let config = RenderConfig {
			no_headers: true,
			..RenderConfig::default()
		};
		let out = OutputCoordinator::new(Vec::new());
		let mut errors = ErrorSet::new();
		let factory = Printers {
			format: OutputFormat::Table { wide: false },
			no_headers: true,
		};
		render_list(&records, &config, 1, &factory, &out, &mut errors);

		let output = String::from_utf8(out.into_inner()).unwrap();
		assert!(!output.contains("\n\n"));
		assert_eq!(output.lines().count(), 2);
	}

	#[test]
	fn test_empty_result_diagnostics() {
		let (output, diag, _) = render(&[], &RenderConfig::default());
		assert_eq!(output, "");
		assert_eq!(diag, Some(Diagnostic::NoResourcesInNamespace("default".to_string())));

		let config = RenderConfig {
			all_namespaces: true,
			..RenderConfig::default()
		};
		assert_eq!(render(&[], &config).1, Some(Diagnostic::NoResources));

		let config = RenderConfig {
			ignore_not_found: true,
			..RenderConfig::default()
		};
		assert_eq!(render(&[], &config).1, None);
	}

	#[test]
	fn test_no_members_diagnostic() {
		let config = RenderConfig {
			scope: OperationScope::Members,
			..RenderConfig::default()
		};
		assert_eq!(diagnostic(&config, 0, true), Diagnostic::NoMemberClusters);
		assert_eq!(
			diagnostic(&RenderConfig::default(), 0, true),
			Diagnostic::NoResourcesInNamespace("default".to_string())
		);
	}

	#[test]
	fn test_decode_failure_aborts_render() {
		let records = vec![ResourceRecord {
			origin: member("m1"),
			type_id: pods(),
			namespaced: true,
			document: Document::Generic(json!({"kind": "PodList", "items": []})),
		}];
		let (output, diag, errors) = render(&records, &RenderConfig::default());
		assert_eq!(output, "");
		assert_eq!(diag, None);
		assert_eq!(errors.messages(), vec!["attempt to decode a PodList object as a table"]);
	}

	#[test]
	fn test_render_is_idempotent() {
		let records = vec![
			record(member("m1"), pods(), vec![row("nginx", json!({}))]),
			record(member("m2"), pods(), vec![row("redis", json!({}))]),
		];
		assert_eq!(
			render(&records, &RenderConfig::default()).0,
			render(&records, &RenderConfig::default()).0
		);
	}
}
