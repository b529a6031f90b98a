//! Printers turning tables (or raw objects) into terminal output.

use std::{
	io::{self, Write},
	sync::Mutex,
};

use serde_json::{json, Value};
use tabwriter::TabWriter;
use thiserror::Error;

use super::{
	lock,
	record::{ColumnDefinition, ResourceRecord, ResourceTypeId, Table, TableRow},
};

#[derive(Debug, Error)]
pub enum PrinterError {
	#[error("output format {0} does not render tables")]
	NotTabular(&'static str),

	#[error("serializing output as json")]
	Json(#[from] serde_json::Error),

	#[error("serializing output as yaml")]
	Yaml(#[from] serde_yaml_with_quirks::Error),

	#[error("writing output")]
	Io(#[from] io::Error),
}

/// Renders tables of a single resource type.
pub trait ResourcePrinter: Send + Sync {
	/// Print the rows of `table`; a table without rows prints nothing.
	fn print_table(&self, table: &Table, out: &mut dyn Write) -> io::Result<()>;

	/// Print only the header line of `table`. Returns whether anything was written.
	fn print_headers(&self, table: &Table, out: &mut dyn Write) -> io::Result<bool>;
}

pub trait PrinterFactory: Send + Sync {
	fn make_printer(
		&self,
		type_id: &ResourceTypeId,
		with_namespace: bool,
		with_kind: bool,
	) -> Result<Box<dyn ResourcePrinter>, PrinterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
	Table { wide: bool },
	Json,
	Yaml,
}

impl OutputFormat {
	pub fn is_table(self) -> bool {
		matches!(self, OutputFormat::Table { .. })
	}

	fn name(self) -> &'static str {
		match self {
			OutputFormat::Table { wide: false } => "table",
			OutputFormat::Table { wide: true } => "wide",
			OutputFormat::Json => "json",
			OutputFormat::Yaml => "yaml",
		}
	}
}

/// Factory for the printers of one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Printers {
	pub format: OutputFormat,
	pub no_headers: bool,
}

impl PrinterFactory for Printers {
	fn make_printer(
		&self,
		type_id: &ResourceTypeId,
		with_namespace: bool,
		with_kind: bool,
	) -> Result<Box<dyn ResourcePrinter>, PrinterError> {
		let OutputFormat::Table { wide } = self.format else {
			return Err(PrinterError::NotTabular(self.format.name()));
		};
		Ok(Box::new(HumanReadablePrinter {
			wide,
			no_headers: self.no_headers,
			with_namespace,
			kind_prefix: with_kind.then(|| type_id.qualified_kind()),
			columns: Mutex::new(Vec::new()),
		}))
	}
}

/// kubectl-style aligned columns.
///
/// Column definitions are remembered across calls, so tables that omit them (later watch
/// events, secondary targets) are laid out like the first one but print no header line.
pub struct HumanReadablePrinter {
	wide: bool,
	no_headers: bool,
	with_namespace: bool,
	kind_prefix: Option<String>,
	columns: Mutex<Vec<ColumnDefinition>>,
}

impl HumanReadablePrinter {
	fn visible(&self, column: Option<&ColumnDefinition>) -> bool {
		column.is_none_or(|c| c.priority == 0 || self.wide)
	}

	fn header(&self, columns: &[ColumnDefinition]) -> Vec<String> {
		let name_at = name_column(columns);
		let mut fields = Vec::new();
		for (i, column) in columns.iter().enumerate() {
			if !self.visible(Some(column)) {
				continue;
			}
			if self.with_namespace && i == name_at {
				fields.push("NAMESPACE".to_string());
			}
			fields.push(column.name.to_uppercase());
		}
		fields
	}

	fn row(&self, columns: &[ColumnDefinition], row: &TableRow) -> Vec<String> {
		let name_at = name_column(columns);
		let mut fields = Vec::new();
		for (i, cell) in row.cells.iter().enumerate() {
			let column = columns.get(i);
			if column.is_none() && !columns.is_empty() {
				// More cells than columns: nothing sensible to align them under.
				break;
			}
			if !self.visible(column) {
				continue;
			}
			if self.with_namespace && i == name_at {
				let namespace = row
					.object
					.as_ref()
					.and_then(k8s::meta::namespace)
					.unwrap_or_default();
				fields.push(namespace.to_string());
			}
			let text = format_cell(cell);
			match &self.kind_prefix {
				Some(kind) if i == name_at => fields.push(format!("{kind}/{text}")),
				_ => fields.push(text),
			}
		}
		fields
	}
}

impl HumanReadablePrinter {
	/// Columns of `table`, or of the last table that carried any.
	fn remember(&self, table: &Table) -> Vec<ColumnDefinition> {
		let mut known = lock(&self.columns);
		if !table.column_definitions.is_empty() {
			*known = table.column_definitions.clone();
		}
		known.clone()
	}
}

impl ResourcePrinter for HumanReadablePrinter {
	fn print_headers(&self, table: &Table, out: &mut dyn Write) -> io::Result<bool> {
		let columns = self.remember(table);
		if self.no_headers || table.column_definitions.is_empty() {
			return Ok(false);
		}
		let mut tw = TabWriter::new(out).minwidth(6).padding(3);
		writeln!(tw, "{}", self.header(&columns).join("\t"))?;
		tw.flush()?;
		Ok(true)
	}

	fn print_table(&self, table: &Table, out: &mut dyn Write) -> io::Result<()> {
		let columns = self.remember(table);
		if table.rows.is_empty() {
			return Ok(());
		}

		let mut tw = TabWriter::new(out).minwidth(6).padding(3);
		if !self.no_headers && !table.column_definitions.is_empty() {
			writeln!(tw, "{}", self.header(&columns).join("\t"))?;
		}
		for row in &table.rows {
			writeln!(tw, "{}", self.row(&columns, row).join("\t"))?;
		}
		tw.flush()
	}
}

fn name_column(columns: &[ColumnDefinition]) -> usize {
	columns.iter().position(|c| c.format == "name").unwrap_or(0)
}

fn format_cell(cell: &Value) -> String {
	match cell {
		Value::Null => "<none>".to_string(),
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

/// Print every collected object as a single `v1` List.
pub fn print_list(
	format: OutputFormat,
	records: &[ResourceRecord],
	out: &mut dyn Write,
) -> Result<(), PrinterError> {
	let mut items = Vec::new();
	for record in records {
		let value = record.document.to_value();
		match value.get("items").and_then(Value::as_array) {
			Some(list_items) => items.extend(
				list_items
					.iter()
					.map(|item| with_type_meta(item.clone(), &record.type_id)),
			),
			None => items.push(with_type_meta(value, &record.type_id)),
		}
	}
	let list = json!({
		"apiVersion": "v1",
		"kind": "List",
		"metadata": {"resourceVersion": ""},
		"items": items,
	});

	match format {
		OutputFormat::Json => {
			serde_json::to_writer_pretty(&mut *out, &list)?;
			writeln!(out)?;
		}
		OutputFormat::Yaml => serde_yaml_with_quirks::to_writer(&mut *out, &list)?,
		OutputFormat::Table { .. } => return Err(PrinterError::NotTabular(format.name())),
	}
	Ok(())
}

/// List items come back without apiVersion/kind; restore them from the type identity.
fn with_type_meta(mut item: Value, type_id: &ResourceTypeId) -> Value {
	if let Some(object) = item.as_object_mut() {
		if !object.contains_key("kind") {
			object.insert("kind".to_string(), type_id.kind.clone().into());
		}
		if !object.contains_key("apiVersion") {
			let api_version = if type_id.group.is_empty() {
				type_id.version.clone()
			} else {
				format!("{}/{}", type_id.group, type_id.version)
			};
			object.insert("apiVersion".to_string(), api_version.into());
		}
	}
	item
}
