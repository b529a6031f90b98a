//! Built-in short names for well-known resource types.
//!
//! Discovery does not expose short names through kube-rs, so the common
//! ones kubectl users type every day are kept in a static table.

use phf::phf_map;

static SHORT_NAMES: phf::Map<&'static str, &'static str> = phf_map! {
	"cm" => "configmaps",
	"cs" => "componentstatuses",
	"crd" => "customresourcedefinitions",
	"crds" => "customresourcedefinitions",
	"cj" => "cronjobs",
	"deploy" => "deployments",
	"ds" => "daemonsets",
	"ep" => "endpoints",
	"ev" => "events",
	"hpa" => "horizontalpodautoscalers",
	"ing" => "ingresses",
	"limits" => "limitranges",
	"netpol" => "networkpolicies",
	"no" => "nodes",
	"ns" => "namespaces",
	"pc" => "priorityclasses",
	"pdb" => "poddisruptionbudgets",
	"po" => "pods",
	"pv" => "persistentvolumes",
	"pvc" => "persistentvolumeclaims",
	"quota" => "resourcequotas",
	"rc" => "replicationcontrollers",
	"rs" => "replicasets",
	"sa" => "serviceaccounts",
	"sc" => "storageclasses",
	"sts" => "statefulsets",
	"svc" => "services",
};

/// Expand a short name (`po`, `svc`, ...) to its plural resource name.
///
/// Returns the input unchanged when it is not a known short name.
pub fn expand(name: &str) -> &str {
	SHORT_NAMES.get(name).copied().unwrap_or(name)
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case::pods("po", "pods")]
	#[case::services("svc", "services")]
	#[case::deployments("deploy", "deployments")]
	#[case::plural_passthrough("pods", "pods")]
	#[case::unknown("widgets", "widgets")]
	fn test_expand(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(expand(input), expected);
	}
}
