//! Accessors for object metadata inside generic JSON documents.

use serde_json::Value;

/// `metadata.name` of an object.
pub fn name(object: &Value) -> Option<&str> {
	object.pointer("/metadata/name")?.as_str()
}

/// `metadata.namespace` of an object.
pub fn namespace(object: &Value) -> Option<&str> {
	object.pointer("/metadata/namespace")?.as_str()
}

/// `metadata.resourceVersion` of an object or list.
pub fn resource_version(object: &Value) -> Option<&str> {
	object.pointer("/metadata/resourceVersion")?.as_str()
}

/// Value of a single label, if present.
pub fn label<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
	object
		.get("metadata")?
		.get("labels")?
		.get(key)?
		.as_str()
}

/// Whether the object carries `key=value` among its labels.
pub fn has_label(object: &Value, key: &str, value: &str) -> bool {
	label(object, key) == Some(value)
}
