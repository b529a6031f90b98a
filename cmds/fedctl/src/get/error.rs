use std::{collections::HashSet, fmt};

use thiserror::Error;

use super::{backend::QueryError, printer::PrinterError, record::DecodeError};

#[derive(Debug, Error)]
pub enum GetError {
	#[error("cluster({cluster}) is inaccessible, please check authorization or network")]
	TargetUnreachable {
		cluster: String,
		#[source]
		source: QueryError,
	},

	#[error("cluster({cluster}): {source}")]
	QueryFailed {
		cluster: String,
		#[source]
		source: QueryError,
	},

	#[error("cluster({cluster}): {resource} \"{name}\" not found")]
	NotFound {
		cluster: String,
		resource: String,
		name: String,
	},

	#[error(transparent)]
	Decode(#[from] DecodeError),

	#[error("clusters don't exist: {}", .0.join(","))]
	UnknownCluster(Vec<String>),

	#[error("failed to list member clusters registered in the control plane")]
	RegistryUnavailable(#[source] QueryError),

	#[error("watch is only supported on individual resources and resource collections - more than 1 resource was found")]
	MultipleKindsWatchUnsupported,

	#[error("watch is only supported on a single object name, got {0}")]
	WatchTooManyObjects(usize),

	#[error("no resources found to watch")]
	NoWatchTargets,

	#[error("cluster({cluster}): watch failed: {source}")]
	WatchFailed {
		cluster: String,
		#[source]
		source: QueryError,
	},

	#[error("interrupted")]
	Interrupted,

	#[error("cluster({cluster}): collection task panicked")]
	TaskPanicked { cluster: String },

	#[error(transparent)]
	Printer(#[from] PrinterError),

	#[error("writing output")]
	Output(#[from] std::io::Error),
}

/// A failure together with the target it came from, if any.
#[derive(Debug)]
pub struct TaggedError {
	pub target: Option<String>,
	pub error: GetError,
}

/// Errors accumulated during one invocation.
///
/// Entries are deduplicated by their rendered message; insertion order is kept.
#[derive(Debug, Default)]
pub struct ErrorSet {
	entries: Vec<TaggedError>,
	seen: HashSet<String>,
}

impl ErrorSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record an error. Returns false when an identical message was already recorded.
	pub fn push(&mut self, target: Option<&str>, error: GetError) -> bool {
		if !self.seen.insert(error.to_string()) {
			return false;
		}
		self.entries.push(TaggedError {
			target: target.map(str::to_string),
			error,
		});
		true
	}

	pub fn extend(&mut self, other: ErrorSet) {
		for entry in other.entries {
			self.push(entry.target.as_deref(), entry.error);
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &TaggedError> {
		self.entries.iter()
	}

	pub fn messages(&self) -> Vec<String> {
		self.entries.iter().map(|e| e.error.to_string()).collect()
	}
}

impl fmt::Display for ErrorSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.entries.as_slice() {
			[] => Ok(()),
			[only] => write!(f, "{}", only.error),
			entries => {
				write!(f, "[")?;
				for (i, entry) in entries.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{}", entry.error)?;
				}
				write!(f, "]")
			}
		}
	}
}

impl std::error::Error for ErrorSet {}

#[cfg(test)]
mod tests {
	use super::*;

	fn not_found(cluster: &str) -> GetError {
		GetError::NotFound {
			cluster: cluster.to_string(),
			resource: "pods".to_string(),
			name: "nginx".to_string(),
		}
	}

	#[test]
	fn test_duplicates_are_dropped() {
		let mut errors = ErrorSet::new();
		assert!(errors.push(Some("member1"), not_found("member1")));
		assert!(!errors.push(Some("member1"), not_found("member1")));
		assert!(errors.push(Some("member2"), not_found("member2")));

		assert_eq!(errors.len(), 2);
		assert_eq!(
			errors.to_string(),
			r#"[cluster(member1): pods "nginx" not found, cluster(member2): pods "nginx" not found]"#
		);
	}

	#[test]
	fn test_single_error_renders_bare() {
		let mut errors = ErrorSet::new();
		errors.push(None, GetError::UnknownCluster(vec!["a".into(), "b".into()]));
		assert_eq!(errors.to_string(), "clusters don't exist: a,b");
		assert_eq!(errors.iter().next().and_then(|e| e.target.as_deref()), None);
	}

	#[test]
	fn test_extend_keeps_order_and_dedups() {
		let mut first = ErrorSet::new();
		first.push(Some("member1"), not_found("member1"));
		let mut second = ErrorSet::new();
		second.push(Some("member1"), not_found("member1"));
		second.push(None, GetError::NoWatchTargets);

		first.extend(second);
		assert_eq!(
			first.messages(),
			vec![
				r#"cluster(member1): pods "nginx" not found"#.to_string(),
				"no resources found to watch".to_string(),
			]
		);
	}
}
