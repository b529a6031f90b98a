//! Retrieved objects and the server-side Table model they decode into.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identity of a resource type: kind, group, version and plural name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceTypeId {
	pub group: String,
	pub version: String,
	pub kind: String,
	pub plural: String,
}

impl ResourceTypeId {
	pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> Self {
		Self {
			group: group.to_string(),
			version: version.to_string(),
			kind: kind.to_string(),
			plural: plural.to_string(),
		}
	}

	/// Whether both identities name the same group/version/kind.
	pub fn same_kind(&self, other: &Self) -> bool {
		self.group == other.group && self.version == other.version && self.kind == other.kind
	}

	/// `pod`, `deployment.apps`: the prefix used when names are qualified by kind.
	pub fn qualified_kind(&self) -> String {
		let kind = self.kind.to_lowercase();
		if self.group.is_empty() {
			kind
		} else {
			format!("{}.{}", kind, self.group)
		}
	}
}

impl fmt::Display for ResourceTypeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}, Resource={}", self.group, self.version, self.plural)
	}
}

/// Column metadata of a server-side table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
	pub name: String,
	#[serde(rename = "type", default)]
	pub type_: String,
	#[serde(default)]
	pub format: String,
	#[serde(default)]
	pub description: String,
	/// 0 is shown by default, anything higher only in wide output.
	#[serde(default)]
	pub priority: i32,
}

impl ColumnDefinition {
	pub fn string(name: &str, priority: i32) -> Self {
		Self {
			name: name.to_string(),
			type_: "string".to_string(),
			priority,
			..Self::default()
		}
	}
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
	#[serde(default)]
	pub cells: Vec<Value>,
	/// Partial object metadata (or the full object) the row was rendered from.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object: Option<Value>,
}

/// A `meta.k8s.io/v1` Table, as returned for `Accept: application/json;as=Table`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
	#[serde(default)]
	pub metadata: ListMeta,
	#[serde(default)]
	pub column_definitions: Vec<ColumnDefinition>,
	#[serde(default)]
	pub rows: Vec<TableRow>,
}

/// A document that cannot be turned into a table.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("attempt to decode a {kind} object as a table")]
	NotATable { kind: String },

	#[error("decoding table")]
	Malformed(#[source] serde_json::Error),
}

/// A retrieved object, either still generic JSON or already decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
	/// Raw JSON as returned by the server.
	Generic(Value),
	/// A table decoded by the transport (watch events are delivered this way).
	Typed(Box<Table>),
}

impl Document {
	/// Convert into a table, failing when the document is not one.
	pub fn to_table(&self) -> Result<Table, DecodeError> {
		match self {
			Document::Typed(table) => Ok(table.as_ref().clone()),
			Document::Generic(value) => {
				let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
				if kind != "Table" {
					return Err(DecodeError::NotATable {
						kind: if kind.is_empty() {
							"untyped".to_string()
						} else {
							kind.to_string()
						},
					});
				}
				Table::deserialize(value).map_err(DecodeError::Malformed)
			}
		}
	}

	/// The version marker of the document (list or object), if any.
	pub fn resource_version(&self) -> Option<String> {
		match self {
			Document::Typed(table) => table.metadata.resource_version.clone(),
			Document::Generic(value) => k8s::meta::resource_version(value).map(str::to_string),
		}
		.filter(|rv| !rv.is_empty())
	}

	/// The document as plain JSON.
	pub fn to_value(&self) -> Value {
		match self {
			Document::Generic(value) => value.clone(),
			Document::Typed(table) => {
				let mut value = serde_json::to_value(table.as_ref()).unwrap_or(Value::Null);
				if let Some(object) = value.as_object_mut() {
					object.insert("kind".to_string(), "Table".into());
					object.insert("apiVersion".to_string(), "meta.k8s.io/v1".into());
				}
				value
			}
		}
	}
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
	pub cluster: String,
	pub is_control_plane: bool,
}

/// One retrieved object prepared for rendering.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
	pub origin: Origin,
	pub type_id: ResourceTypeId,
	pub namespaced: bool,
	pub document: Document,
}

/// Whether the records span more than one group/version/kind.
pub fn multiple_kinds(records: &[ResourceRecord]) -> bool {
	match records.split_first() {
		Some((first, rest)) => rest.iter().any(|r| !r.type_id.same_kind(&first.type_id)),
		None => false,
	}
}
