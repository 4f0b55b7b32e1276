use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle policy for aspect instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeploymentModel {
    #[default]
    #[serde(rename = "perJVM")]
    PerJvm,
    #[serde(rename = "perClass")]
    PerClass,
    #[serde(rename = "perInstance")]
    PerInstance,
    #[serde(rename = "perTarget")]
    PerTarget,
    #[serde(rename = "perThis")]
    PerThis,
    #[serde(rename = "perThread")]
    PerThread,
    #[serde(rename = "perCflow")]
    PerCflow,
    #[serde(rename = "perCflowbelow")]
    PerCflowBelow,
}

impl DeploymentModel {
    pub const ALL: [DeploymentModel; 8] = [
        DeploymentModel::PerJvm,
        DeploymentModel::PerClass,
        DeploymentModel::PerInstance,
        DeploymentModel::PerTarget,
        DeploymentModel::PerThis,
        DeploymentModel::PerThread,
        DeploymentModel::PerCflow,
        DeploymentModel::PerCflowBelow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentModel::PerJvm => "perJVM",
            DeploymentModel::PerClass => "perClass",
            DeploymentModel::PerInstance => "perInstance",
            DeploymentModel::PerTarget => "perTarget",
            DeploymentModel::PerThis => "perThis",
            DeploymentModel::PerThread => "perThread",
            DeploymentModel::PerCflow => "perCflow",
            DeploymentModel::PerCflowBelow => "perCflowbelow",
        }
    }

    /// Lenient lookup: a missing or blank name is the default, an unknown name
    /// is the default plus a warning. Never fails.
    pub fn for_name(name: Option<&str>) -> (DeploymentModel, Option<ConfigurationWarning>) {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return (DeploymentModel::PerJvm, None);
        };
        match name.parse() {
            Ok(model) => (model, None),
            Err(warning) => {
                tracing::warn!(value = name, "{warning}");
                (DeploymentModel::PerJvm, Some(warning))
            }
        }
    }

    /// Instances live as long as a control flow region.
    pub fn is_per_cflow(self) -> bool {
        matches!(self, DeploymentModel::PerCflow | DeploymentModel::PerCflowBelow)
    }

    /// Instances are keyed by an object identity.
    pub fn is_per_object(self) -> bool {
        matches!(self, DeploymentModel::PerInstance | DeploymentModel::PerTarget | DeploymentModel::PerThis)
    }
}

impl FromStr for DeploymentModel {
    type Err = ConfigurationWarning;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        DeploymentModel::ALL
            .into_iter()
            .find(|model| model.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigurationWarning::new(name, "unknown deployment model, using perJVM"))
    }
}

impl fmt::Display for DeploymentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recoverable configuration problem; reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationWarning {
    pub subject: String,
    pub message: String,
}

impl ConfigurationWarning {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self { subject: subject.into(), message: message.into() }
    }
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}
