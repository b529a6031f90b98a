//! Helper functions for mock Kubernetes testing.

use serde_json::{json, Value};

/// Render objects the way the API server does for `Accept: ...;as=Table`
/// on a type without additional printer columns.
pub fn to_table(items: &[&Value], resource_version: &str) -> Value {
	let rows: Vec<Value> = items
		.iter()
		.map(|item| {
			json!({
				"cells": [
					k8s::meta::name(item).unwrap_or_default(),
					item.pointer("/metadata/creationTimestamp")
						.and_then(Value::as_str)
						.unwrap_or("<unknown>"),
				],
				"object": {
					"kind": "PartialObjectMetadata",
					"apiVersion": "meta.k8s.io/v1",
					"metadata": item.get("metadata").cloned().unwrap_or_else(|| json!({})),
				}
			})
		})
		.collect();

	json!({
		"kind": "Table",
		"apiVersion": "meta.k8s.io/v1",
		"metadata": {"resourceVersion": resource_version},
		"columnDefinitions": [
			{
				"name": "Name",
				"type": "string",
				"format": "name",
				"description": "Name must be unique within a namespace.",
				"priority": 0
			},
			{
				"name": "Created At",
				"type": "date",
				"format": "",
				"description": "CreationTimestamp is a timestamp representing the server time when this object was created.",
				"priority": 0
			}
		],
		"rows": rows
	})
}

/// Match an object against an equality-only label selector (`a=b,c=d`).
pub fn matches_label_selector(object: &Value, selector: &str) -> bool {
	selector
		.split(',')
		.filter(|term| !term.is_empty())
		.all(|term| match term.split_once('=') {
			Some((key, value)) => {
				k8s::meta::has_label(object, key.trim_end_matches('='), value)
			}
			None => k8s::meta::label(object, term).is_some(),
		})
}

/// Match an object against a `metadata.name=<name>` field selector.
///
/// Other field selectors are accepted and ignored.
pub fn matches_field_selector(object: &Value, selector: &str) -> bool {
	selector
		.split(',')
		.filter_map(|term| term.strip_prefix("metadata.name="))
		.all(|name| k8s::meta::name(object) == Some(name))
}

/// A `Status` failure body as returned by the API server.
pub fn status_failure(code: u16, reason: &str, message: &str) -> Value {
	json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}
