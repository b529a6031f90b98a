//! Parsing of `get`-style resource arguments.
//!
//! Two forms are accepted, matching kubectl:
//! - `TYPE[,TYPE...] [NAME...]`, e.g. `pods`, `rs,services`, `deployments.v1.apps nginx`
//! - `TYPE/NAME [TYPE/NAME...]`, e.g. `rs/nginx service/kubernetes`

use thiserror::Error;

use crate::aliases;

/// Errors produced while parsing resource arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
	#[error("you must specify the type of resource to get")]
	Empty,

	#[error("arguments in resource/name form must have a single resource and name, got `{0}`")]
	MalformedTypeName(String),

	#[error(
		"there is no need to specify a resource type as a separate argument when passing \
		 arguments in resource/name form (e.g. 'get resource/<resource_name>' instead of \
		 'get resource resource/<resource_name>')"
	)]
	MixedForms,

	#[error("resource type must not be empty")]
	EmptyType,
}

/// One requested resource type, with the object names requested for it.
///
/// An empty `names` list means "list every object of this type".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
	/// Resource type as typed by the user, lower-cased and with short names expanded
	/// (`pods`, `deployments.v1.apps`, `deployment.apps`).
	pub resource: String,
	pub names: Vec<String>,
}

impl ResourceRequest {
	pub fn new(resource: impl Into<String>) -> Self {
		Self {
			resource: resource.into(),
			names: Vec::new(),
		}
	}

	pub fn with_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.names = names.into_iter().map(Into::into).collect();
		self
	}
}

/// Normalize a user-supplied type: lower-case it and expand a short name
/// in the first dotted segment (`deploy.apps` -> `deployments.apps`).
fn normalize_type(raw: &str) -> Result<String, ArgsError> {
	let raw = raw.trim().to_lowercase();
	if raw.is_empty() {
		return Err(ArgsError::EmptyType);
	}
	Ok(match raw.split_once('.') {
		Some((head, rest)) => format!("{}.{}", aliases::expand(head), rest),
		None => aliases::expand(&raw).to_string(),
	})
}

/// Parse `get` positional arguments into resource requests.
///
/// Requests for the same type are merged, preserving first-seen order.
pub fn parse_resource_args(args: &[String]) -> Result<Vec<ResourceRequest>, ArgsError> {
	let Some(first) = args.first() else {
		return Err(ArgsError::Empty);
	};

	let mut requests: Vec<ResourceRequest> = Vec::new();
	let mut push = |resource: String, name: Option<&str>| {
		let idx = match requests.iter().position(|r| r.resource == resource) {
			Some(idx) => idx,
			None => {
				requests.push(ResourceRequest::new(resource));
				requests.len() - 1
			}
		};
		if let Some(name) = name {
			requests[idx].names.push(name.to_string());
		}
	};

	if first.contains('/') {
		for arg in args {
			let Some((ty, name)) = arg.split_once('/') else {
				return Err(ArgsError::MixedForms);
			};
			if name.is_empty() || name.contains('/') {
				return Err(ArgsError::MalformedTypeName(arg.clone()));
			}
			push(normalize_type(ty)?, Some(name));
		}
		return Ok(requests);
	}

	let names = &args[1..];
	if names.iter().any(|n| n.contains('/')) {
		return Err(ArgsError::MixedForms);
	}

	for ty in first.split(',').filter(|t| !t.is_empty()) {
		let ty = normalize_type(ty)?;
		if names.is_empty() {
			push(ty, None);
		} else {
			for name in names {
				push(ty.clone(), Some(name));
			}
		}
	}

	if requests.is_empty() {
		return Err(ArgsError::EmptyType);
	}
	Ok(requests)
}
