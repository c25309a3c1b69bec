//! Per-user path templates
//!
//! `%u` expands to the username, `%U` to the uid and `%%` to a literal
//! percent sign. Any other `%` sequence is kept as written.

use regex::{Captures, Regex};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%[uU%]").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Expand placeholders for one user
    pub fn render(&self, username: &str, uid: u32) -> String {
        PLACEHOLDER
            .replace_all(&self.0, |caps: &Captures<'_>| match &caps[0] {
                "%u" => username.to_string(),
                "%U" => uid.to_string(),
                _ => "%".to_string(),
            })
            .into_owned()
    }

    /// Expand placeholders into a path
    pub fn expand(&self, username: &str, uid: u32) -> PathBuf {
        PathBuf::from(self.render(username, uid))
    }

    /// Append a fixed file name to the template
    pub fn join(&self, name: &str) -> Self {
        Self(format!("{}/{}", self.0.trim_end_matches('/'), name))
    }
}
