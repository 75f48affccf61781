//! Prompt templates
//!
//! Templates live in a YAML document grouped by phase (`research`, `financial`,
//! `operations`, ...). A default copy is embedded in the binary; a user file can
//! override individual templates. Sections only organize the file: templates are
//! looked up by their own key, which must be unique across sections.

use crate::error::ConfigError;
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

const EMBEDDED_PROMPTS: &str = include_str!("prompts.yaml");

/// Well-known template keys
pub mod keys {
    pub const SYSTEM: &str = "system";
    pub const RAG_ANSWER: &str = "rag_answer";
    pub const QUERY_GENERATION: &str = "query_generation";
    pub const DCF_MODEL: &str = "dcf_model";
    pub const FINANCIAL_RATIOS: &str = "financial_ratios";
    pub const FINANCIAL_REPORTING: &str = "financial_reporting";
    pub const SUPPLY_CHAIN: &str = "supply_chain";
    pub const INDUSTRY_POSITIONING: &str = "industry_positioning";
    pub const OPERATIONS_REPORTING: &str = "operations_reporting";
    pub const MERGER_FEASIBILITY: &str = "merger_feasibility";
    pub const MERGER_VALUATION: &str = "merger_valuation";
    pub const INTEGRATION_RISKS: &str = "integration_risks";
    pub const REGULATORY_COMPLIANCE: &str = "regulatory_compliance";
    pub const LEGAL_DUE_DILIGENCE: &str = "legal_due_diligence";
    pub const LEGAL_RISKS: &str = "legal_risks";
    pub const REPORT_STRUCTURE: &str = "report_structure";
    pub const SECTION_TEMPLATES: &str = "section_templates";
    pub const RAG_SUMMARY: &str = "rag_summary";
    pub const CONSISTENCY_CHECK: &str = "consistency_check";
}

/// Loaded set of templates
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBook {
    templates: BTreeMap<String, String>,
}

impl PromptBook {
    /// The templates compiled into the crate
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_yaml_str(EMBEDDED_PROMPTS)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let document: BTreeMap<String, Value> = serde_yaml::from_str(text)?;
        let mut templates = BTreeMap::new();
        for (key, value) in document {
            collect(&key, value, &mut templates)?;
        }
        Ok(Self { templates })
    }

    /// Embedded templates with those from `path` layered on top
    pub fn with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut book = Self::embedded()?;
        book.templates.extend(Self::from_yaml_str(&text)?.templates);
        Ok(book)
    }

    pub fn template(&self, key: &str) -> Result<&str, ConfigError> {
        self.templates
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownPrompt(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Fill the `key` template with `vars`
    pub fn render(&self, key: &str, vars: &[(&str, &str)]) -> Result<String, ConfigError> {
        Ok(render_template(self.template(key)?, vars))
    }
}

fn collect(key: &str, value: Value, templates: &mut BTreeMap<String, String>) -> Result<(), ConfigError> {
    match value {
        Value::String(text) => {
            if templates.insert(key.to_string(), text).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate prompt '{}'", key)));
            }
            Ok(())
        }
        Value::Mapping(section) => {
            for (inner, value) in section {
                let Value::String(inner) = inner else {
                    return Err(ConfigError::Invalid(format!("non-string prompt key in '{}'", key)));
                };
                collect(&inner, value, templates)?;
            }
            Ok(())
        }
        _ => Err(ConfigError::Invalid(format!("prompt '{}' must be a string or a section", key))),
    }
}

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder pattern"));

/// Replace `{name}` placeholders found in `vars`; others stay as written
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
