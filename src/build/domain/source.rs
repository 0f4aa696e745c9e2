//! Source repository selectors carried by a task.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Validated branch name of a source repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyBranch`] when the trimmed value is
    /// empty.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptyBranch);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the branch name as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Branch plus tool arguments requested for one source repository.
///
/// The core does not interpret argument values; they are appended to the
/// build command in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSelector {
    branch: BranchName,
    #[serde(default)]
    args: BTreeMap<String, Value>,
}

impl SourceSelector {
    /// Creates a selector for `branch` with no extra arguments.
    #[must_use]
    pub const fn new(branch: BranchName) -> Self {
        Self {
            branch,
            args: BTreeMap::new(),
        }
    }

    /// Sets the build arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Returns the requested branch.
    #[must_use]
    pub const fn branch(&self) -> &BranchName {
        &self.branch
    }

    /// Returns the build arguments in key order.
    #[must_use]
    pub const fn args(&self) -> &BTreeMap<String, Value> {
        &self.args
    }
}

/// Renders an argument value the way a command line expects it.
///
/// Strings are used verbatim; other JSON values use their compact JSON form.
#[must_use]
pub fn render_arg_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
