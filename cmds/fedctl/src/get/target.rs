use std::{fmt, sync::Arc};

use clap::ValueEnum;
use tracing::{debug, instrument};

use super::{
	backend::{ClusterBackend, Fleet},
	error::GetError,
	record::Origin,
};

/// Which clusters a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OperationScope {
	/// Only the control plane.
	#[default]
	ControlPlane,
	/// Only member clusters.
	Members,
	/// Control plane and member clusters.
	All,
}

impl OperationScope {
	pub fn includes_control_plane(self) -> bool {
		matches!(self, OperationScope::ControlPlane | OperationScope::All)
	}

	pub fn includes_members(self) -> bool {
		matches!(self, OperationScope::Members | OperationScope::All)
	}
}

/// A cluster queried by this invocation.
#[derive(Clone)]
pub struct Target {
	pub name: String,
	pub is_control_plane: bool,
	pub backend: Arc<dyn ClusterBackend>,
}

impl Target {
	pub fn origin(&self) -> Origin {
		Origin {
			cluster: self.name.clone(),
			is_control_plane: self.is_control_plane,
		}
	}
}

impl fmt::Debug for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Target")
			.field("name", &self.name)
			.field("is_control_plane", &self.is_control_plane)
			.finish_non_exhaustive()
	}
}

/// Turn the scope and explicit cluster names into the targets to query.
///
/// The control plane comes first; members follow in the order requested, or in registry
/// order when no names were given. Duplicates are dropped.
#[instrument(skip(fleet))]
pub async fn resolve_targets(
	fleet: &dyn Fleet,
	scope: OperationScope,
	clusters: &[String],
	control_plane_name: &str,
) -> Result<Vec<Target>, GetError> {
	let mut targets = Vec::new();
	if scope.includes_control_plane() {
		targets.push(Target {
			name: control_plane_name.to_string(),
			is_control_plane: true,
			backend: fleet.control_plane(),
		});
	}
	if !scope.includes_members() {
		return Ok(targets);
	}

	let names = if clusters.is_empty() {
		fleet
			.registered_clusters()
			.await
			.map_err(GetError::RegistryUnavailable)?
	} else {
		fleet.validate_names_exist(clusters).await?;
		clusters.to_vec()
	};

	for name in names {
		if targets.iter().any(|t| !t.is_control_plane && t.name == name) {
			continue;
		}
		let backend = fleet.member(&name).map_err(|source| GetError::QueryFailed {
			cluster: name.clone(),
			source,
		})?;
		targets.push(Target {
			name,
			is_control_plane: false,
			backend,
		});
	}
	debug!(count = targets.len(), "resolved targets");
	Ok(targets)
}
