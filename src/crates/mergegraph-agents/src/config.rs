//! Pipeline configuration
//!
//! Layered loading: built-in defaults, then an optional YAML file, then
//! environment variables prefixed with [`ENV_PREFIX`], then validation.
//!
//! ```yaml
//! loop_ceiling: 26
//! step_limit: 1000
//! approval: auto_approve
//! llm:
//!   model: mistral-saba-24b
//!   temperature: 0.7
//! ```

use crate::error::ConfigError;
use mergegraph_core::{RetryPolicy, DEFAULT_LOOP_CEILING, DEFAULT_STEP_LIMIT};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "MERGEGRAPH_";

type Result<T> = std::result::Result<T, ConfigError>;

/// How approval gates decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Ask on the terminal at every gate
    Interactive,
    #[default]
    AutoApprove,
    AutoReject,
}

impl FromStr for ApprovalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "interactive" => Ok(ApprovalMode::Interactive),
            "auto_approve" | "approve" => Ok(ApprovalMode::AutoApprove),
            "auto_reject" | "reject" => Ok(ApprovalMode::AutoReject),
            other => Err(ConfigError::Invalid(format!("unknown approval mode '{}'", other))),
        }
    }
}

/// Chat-completions collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "mistral-saba-24b".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            temperature: 0.7,
            max_tokens: 5000,
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Web-search collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub base_url: String,
    pub max_results: usize,
    pub search_depth: String,
    pub api_key_env: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            max_results: 5,
            search_depth: "advanced".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
        }
    }
}

/// Everything needed to assemble and run the deal workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loop_ceiling: u32,
    pub step_limit: usize,
    pub max_queries: usize,
    pub report_dir: PathBuf,
    pub merger_report_dir: PathBuf,
    pub approval: ApprovalMode,
    pub retry_delay_secs: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Use the deterministic offline model and skip web search
    pub offline: bool,
    pub llm: LlmSettings,
    pub search: SearchSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            loop_ceiling: DEFAULT_LOOP_CEILING,
            step_limit: DEFAULT_STEP_LIMIT,
            max_queries: 5,
            report_dir: PathBuf::from("report"),
            merger_report_dir: PathBuf::from("merger_reports"),
            approval: ApprovalMode::AutoApprove,
            retry_delay_secs: 10,
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 4,
            offline: false,
            llm: LlmSettings::default(),
            search: SearchSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then `path` if given, then `MERGEGRAPH_*` variables, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse YAML; missing fields keep their defaults
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Override fields from environment variables named `<prefix><FIELD>`
    pub fn apply_env(&mut self, prefix: &str) -> Result<&mut Self> {
        let key = |name: &str| build_env_key(prefix, name);

        if let Some(v) = get_env_parse(&key("loop_ceiling"))? {
            self.loop_ceiling = v;
        }
        if let Some(v) = get_env_parse(&key("step_limit"))? {
            self.step_limit = v;
        }
        if let Some(v) = get_env_parse(&key("max_queries"))? {
            self.max_queries = v;
        }
        if let Some(v) = get_env(&key("report_dir"))? {
            self.report_dir = PathBuf::from(v);
        }
        if let Some(v) = get_env(&key("merger_report_dir"))? {
            self.merger_report_dir = PathBuf::from(v);
        }
        if let Some(v) = get_env_parse(&key("approval"))? {
            self.approval = v;
        }
        if let Some(v) = get_env_parse(&key("retry_delay_secs"))? {
            self.retry_delay_secs = v;
        }
        if let Some(v) = get_env_parse(&key("chunk_size"))? {
            self.chunk_size = v;
        }
        if let Some(v) = get_env_parse(&key("chunk_overlap"))? {
            self.chunk_overlap = v;
        }
        if let Some(v) = get_env_parse(&key("top_k"))? {
            self.top_k = v;
        }
        if let Some(v) = get_env_bool(&key("offline"))? {
            self.offline = v;
        }
        if let Some(v) = get_env(&key("llm_model"))? {
            self.llm.model = v;
        }
        if let Some(v) = get_env(&key("llm_base_url"))? {
            self.llm.base_url = v;
        }
        if let Some(v) = get_env_parse(&key("llm_temperature"))? {
            self.llm.temperature = v;
        }
        if let Some(v) = get_env_parse(&key("llm_max_tokens"))? {
            self.llm.max_tokens = v;
        }
        if let Some(v) = get_env_parse(&key("search_max_results"))? {
            self.search.max_results = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.loop_ceiling == 0 {
            return Err(ConfigError::Invalid("loop_ceiling must be at least 1".into()));
        }
        if self.step_limit == 0 {
            return Err(ConfigError::Invalid("step_limit must be at least 1".into()));
        }
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.report_dir.as_os_str().is_empty() || self.merger_report_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("report directories must not be empty".into()));
        }
        if self.max_queries == 0 || self.top_k == 0 {
            return Err(ConfigError::Invalid("max_queries and top_k must be at least 1".into()));
        }
        Ok(())
    }

    /// Collaborator retry policy: one retry after `retry_delay_secs`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_secs(self.retry_delay_secs))
    }
}

pub(crate) fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::Env {
            key: key.to_string(),
            message: "contains invalid UTF-8".to_string(),
        }),
    }
}

fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => {
            let parsed = val.trim().parse::<T>().map_err(|e| ConfigError::Env {
                key: key.to_string(),
                message: format!("failed to parse '{}': {}", val, e),
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool(key: &str) -> Result<Option<bool>> {
    match get_env(key)? {
        Some(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Env {
                key: key.to_string(),
                message: format!("invalid boolean '{}'", val),
            }),
        },
        None => Ok(None),
    }
}

fn build_env_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.loop_ceiling, 26);
        assert_eq!(config.step_limit, 1000);
        assert_eq!(config.llm.model, "mistral-saba-24b");
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.retry_policy().max_attempts, 2);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = PipelineConfig::from_yaml_str(
            "loop_ceiling: 3\napproval: auto_reject\nllm:\n  temperature: 0.1\n",
        )
        .unwrap();
        assert_eq!(config.loop_ceiling, 3);
        assert_eq!(config.approval, ApprovalMode::AutoReject);
        assert_eq!(config.llm.temperature, 0.1);
        assert_eq!(config.llm.max_tokens, 5000);
        assert_eq!(config.report_dir, PathBuf::from("report"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "step_limit: 50\ntop_k: 2").unwrap();

        env::set_var("MERGEGRAPH_TEST_ENV_STEP_LIMIT", "75");
        env::set_var("MERGEGRAPH_TEST_ENV_OFFLINE", "yes");
        env::set_var("MERGEGRAPH_TEST_ENV_APPROVAL", "auto-reject");

        let mut config = PipelineConfig::from_file(file.path()).unwrap();
        config.apply_env("MERGEGRAPH_TEST_ENV_").unwrap();

        assert_eq!(config.step_limit, 75);
        assert_eq!(config.top_k, 2);
        assert!(config.offline);
        assert_eq!(config.approval, ApprovalMode::AutoReject);

        env::remove_var("MERGEGRAPH_TEST_ENV_STEP_LIMIT");
        env::remove_var("MERGEGRAPH_TEST_ENV_OFFLINE");
        env::remove_var("MERGEGRAPH_TEST_ENV_APPROVAL");
    }

    #[test]
    fn test_unparseable_env_is_an_error() {
        env::set_var("MERGEGRAPH_TEST_BAD_LOOP_CEILING", "many");
        let result = PipelineConfig::default().apply_env("MERGEGRAPH_TEST_BAD_").map(|_| ());
        assert!(matches!(result, Err(ConfigError::Env { .. })));
        env::remove_var("MERGEGRAPH_TEST_BAD_LOOP_CEILING");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_ceiling = PipelineConfig {
            loop_ceiling: 0,
            ..Default::default()
        };
        assert!(zero_ceiling.validate().is_err());

        let zero_steps = PipelineConfig {
            step_limit: 0,
            ..Default::default()
        };
        assert!(zero_steps.validate().is_err());

        let overlap = PipelineConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert!(overlap.validate().is_err());

        let empty_dir = PipelineConfig {
            report_dir: PathBuf::new(),
            ..Default::default()
        };
        assert!(empty_dir.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_of_effective_config() {
        let config = PipelineConfig::default();
        let text = config.to_yaml().unwrap();
        assert!(text.contains("approval: auto_approve"));
        assert_eq!(PipelineConfig::from_yaml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_approval_mode_parsing() {
        assert_eq!("interactive".parse::<ApprovalMode>().unwrap(), ApprovalMode::Interactive);
        assert_eq!("auto-approve".parse::<ApprovalMode>().unwrap(), ApprovalMode::AutoApprove);
        assert!("sometimes".parse::<ApprovalMode>().is_err());
    }
}
