//! Configuration file support for fedctl
//!
//! Supports `.fedctl.yaml` files that can be placed anywhere in the directory
//! hierarchy. fedctl searches from the working directory upward to the filesystem root.

use std::{
	fs,
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
	get::ManagedLabel,
	k8s::{client::DEFAULT_API_TIMEOUT, registry::RegistrySettings},
};

/// The name of the config file fedctl looks for
pub const CONFIG_FILE_NAME: &str = ".fedctl.yaml";

/// Root configuration structure for .fedctl.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FedctlConfig {
	/// Cluster cell shown for rows coming from the control plane.
	#[serde(default)]
	pub control_plane_name: Option<String>,

	#[serde(default)]
	pub managed_label: Option<ManagedLabelConfig>,

	/// Where member clusters are registered in the control plane.
	#[serde(default)]
	pub registry: RegistryConfig,

	/// Member proxy path template; `{cluster}` is replaced by the member name.
	#[serde(default)]
	pub proxy_path: Option<String>,

	/// List page size.
	#[serde(default)]
	pub chunk_size: Option<u32>,

	/// Connect timeout; reads keep kube's default so watches can idle.
	#[serde(default)]
	pub api_timeout_seconds: Option<u64>,

	/// Resource plurals whose ADOPTION column is shown without `-o wide`.
	#[serde(default)]
	pub elevated_adoption_resources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagedLabelConfig {
	pub key: String,
	pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
	pub group: Option<String>,
	pub version: Option<String>,
	pub kind: Option<String>,
	pub plural: Option<String>,
}

pub const DEFAULT_CONTROL_PLANE_NAME: &str = "karmada";
pub const DEFAULT_CHUNK_SIZE: u32 = 500;

impl FedctlConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		match find_config_file(start_dir) {
			Some(config_path) => Ok(Some(Self::load_from_file(&config_path)?)),
			None => Ok(None),
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let config: FedctlConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		Ok(config)
	}

	pub fn control_plane_name(&self) -> String {
		self.control_plane_name
			.clone()
			.unwrap_or_else(|| DEFAULT_CONTROL_PLANE_NAME.to_string())
	}

	pub fn managed_label(&self) -> ManagedLabel {
		match &self.managed_label {
			Some(label) => ManagedLabel {
				key: label.key.clone(),
				value: label.value.clone(),
			},
			None => ManagedLabel::default(),
		}
	}

	pub fn registry_settings(&self) -> RegistrySettings {
		let defaults = RegistrySettings::default();
		let registry = self.registry.clone();
		RegistrySettings {
			group: registry.group.unwrap_or(defaults.group),
			version: registry.version.unwrap_or(defaults.version),
			kind: registry.kind.unwrap_or(defaults.kind),
			plural: registry.plural.unwrap_or(defaults.plural),
			proxy_path: self.proxy_path.clone().unwrap_or(defaults.proxy_path),
		}
	}

	pub fn chunk_size(&self) -> u32 {
		self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
	}

	pub fn api_timeout(&self) -> Duration {
		self.api_timeout_seconds
			.map(Duration::from_secs)
			.unwrap_or(DEFAULT_API_TIMEOUT)
	}

	pub fn elevated_adoption_resources(&self) -> Vec<String> {
		self.elevated_adoption_resources
			.clone()
			.unwrap_or_else(|| vec!["pods".to_string()])
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let mut current = start_dir.to_path_buf();

	// Canonicalize if possible to handle relative paths
	if let Ok(canonical) = current.canonicalize() {
		current = canonical;
	}

	loop {
		let config_path = current.join(CONFIG_FILE_NAME);
		if config_path.exists() {
			return Some(config_path);
		}
		match current.parent() {
			Some(parent) if parent != current => current = parent.to_path_buf(),
			_ => return None,
		}
	}
}
