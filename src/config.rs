//! Operator-level configuration threaded through every builder call
//!
//! Values come from CLI flags or environment variables (see `main.rs`) and are
//! resolved once at start-up into an immutable [`OperatorConfig`].

use regex::Regex;

use crate::error::{Error, Result};

/// Image used when the custom resource does not pin one
pub const DEFAULT_AGENT_IMAGE: &str = "public.ecr.aws/cloudwatch-agent/cloudwatch-agent:1.300044.0";

/// Field manager / managed-by value for everything this operator writes
pub const MANAGER_NAME: &str = "cwagent-operator";

/// Compiled label and annotation filters
///
/// Labels or annotations on the custom resource whose key matches any filter
/// are not propagated to generated objects.
#[derive(Clone, Debug, Default)]
pub struct FilterConfig {
    labels: Vec<Regex>,
    annotations: Vec<Regex>,
}

impl FilterConfig {
    /// Compile glob patterns (`*` matches any run of characters)
    pub fn new(label_globs: &[String], annotation_globs: &[String]) -> Result<Self> {
        Ok(Self {
            labels: compile_globs(label_globs)?,
            annotations: compile_globs(annotation_globs)?,
        })
    }

    pub fn is_label_filtered(&self, key: &str) -> bool {
        self.labels.iter().any(|re| re.is_match(key))
    }

    pub fn is_annotation_filtered(&self, key: &str) -> bool {
        self.annotations.iter().any(|re| re.is_match(key))
    }
}

fn compile_globs(globs: &[String]) -> Result<Vec<Regex>> {
    globs
        .iter()
        .filter(|g| !g.trim().is_empty())
        .map(|glob| {
            let pattern = format!("^{}$", glob_to_regex(glob.trim()));
            Regex::new(&pattern)
                .map_err(|e| Error::ConfigError(format!("invalid filter pattern {glob:?}: {e}")))
        })
        .collect()
}

/// Translate a filter glob into a regex body
///
/// Only `*` is special; everything else, dots included, matches literally.
fn glob_to_regex(glob: &str) -> String {
    glob.split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

/// Static configuration for a running operator
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub default_agent_image: String,
    pub filters: FilterConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_agent_image: DEFAULT_AGENT_IMAGE.to_string(),
            filters: FilterConfig::default(),
        }
    }
}

impl OperatorConfig {
    pub fn new(
        default_agent_image: Option<String>,
        label_globs: &[String],
        annotation_globs: &[String],
    ) -> Result<Self> {
        Ok(Self {
            default_agent_image: default_agent_image
                .filter(|i| !i.is_empty())
                .unwrap_or_else(|| DEFAULT_AGENT_IMAGE.to_string()),
            filters: FilterConfig::new(label_globs, annotation_globs)?,
        })
    }
}
