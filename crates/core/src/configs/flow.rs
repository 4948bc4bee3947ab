use std::fs;
use std::path::Path;
use std::time::Duration;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::execution::ExecuteOptions;
use crate::types::{TaskmillError, TaskmillResult};

/// Default name of the flow configuration file.
pub const CONFIG_FILE_NAME: &str = "taskmill.yml";

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlowConfig {
    /// Show the output of tasks that do not fail.
    pub verbose: Option<bool>,
    /// Run only the requested tasks, without their dependencies.
    pub no_deps: Option<bool>,
    /// Report every task as passed without running any action.
    pub dry_run: Option<bool>,
    /// Seconds between "still running" notices. Zero disables them.
    pub long_run_seconds: Option<u64>,
    /// Tasks whose action must not run.
    pub skip: Option<Vec<String>>,
}

impl FlowConfig {
    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }

    pub fn long_run(&self) -> Option<Duration> {
        self.long_run_seconds.map(Duration::from_secs)
    }

    /// Execution options described by the file.
    pub fn execute_options(&self) -> ExecuteOptions {
        let mut options = ExecuteOptions::new().skip(self.skip.iter().flatten().cloned());
        options.no_deps = self.no_deps.unwrap_or(false);
        options
    }

    fn validate(self) -> TaskmillResult<Self> {
        if self.skip.iter().flatten().any(String::is_empty) {
            return Err(TaskmillError::Config(
                "skip list contains an empty task name".to_string(),
            ));
        }
        Ok(self)
    }
}

pub fn parse_flow_config(yaml_str: &str) -> TaskmillResult<FlowConfig> {
    if yaml_str.trim().is_empty() {
        return Ok(FlowConfig::default());
    }
    let config: FlowConfig = serde_yaml::from_str(yaml_str)?;
    config.validate()
}

pub fn load_flow_config(path: &Path) -> TaskmillResult<FlowConfig> {
    let content = fs::read_to_string(path)?;
    parse_flow_config(&content)
}

/// JSON schema of the configuration file, for editor integration.
pub fn flow_config_schema() -> serde_json::Value {
    serde_json::to_value(schema_for!(FlowConfig)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_flow_config(
            r#"
verbose: true
noDeps: true
dryRun: false
longRunSeconds: 30
skip:
  - lint
  - docs
"#,
        )
        .unwrap();

        assert!(config.verbose());
        assert!(!config.dry_run());
        assert_eq!(config.long_run(), Some(Duration::from_secs(30)));

        let options = config.execute_options();
        assert!(options.no_deps);
        assert_eq!(options.skip, vec!["lint", "docs"]);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse_flow_config("").unwrap(), FlowConfig::default());
        assert_eq!(parse_flow_config("  \n").unwrap(), FlowConfig::default());
        assert_eq!(parse_flow_config("{}").unwrap(), FlowConfig::default());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = parse_flow_config("verbose: true\nparallel: 4\n").unwrap_err();
        assert!(matches!(err, TaskmillError::Yaml(_)), "got {err:?}");
    }

    #[test]
    fn test_empty_skip_name_is_rejected() {
        let err = parse_flow_config("skip: ['']\n").unwrap_err();
        assert!(matches!(err, TaskmillError::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "dryRun: true\n").unwrap();

        assert!(load_flow_config(&path).unwrap().dry_run());
        assert!(matches!(
            load_flow_config(&dir.path().join("missing.yml")),
            Err(TaskmillError::Io(_))
        ));
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = flow_config_schema();
        let properties = schema["properties"].as_object().unwrap();
        for field in ["verbose", "noDeps", "dryRun", "longRunSeconds", "skip"] {
            assert!(properties.contains_key(field), "missing {field}");
        }
    }
}
