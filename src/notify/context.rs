use serde::Serialize;
use serde_json::Value;
use std::{fs, path::PathBuf};

pub const REPOSITORY_VAR: &str = "GITHUB_REPOSITORY";
pub const EVENT_NAME_VAR: &str = "GITHUB_EVENT_NAME";
pub const EVENT_PATH_VAR: &str = "GITHUB_EVENT_PATH";
pub const REF_VAR: &str = "GITHUB_REF";

const PULL_REQUEST_EVENT: &str = "pull_request";
const PULL_REF_PREFIX: &str = "refs/pull/";

/// CI facts the dispatcher needs, read once at startup.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CiContext {
    pub repository: Option<String>,
    pub event_name: Option<String>,
    pub event_path: Option<PathBuf>,
    pub git_ref: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl CiContext {
    pub fn from_env() -> Self {
        Self {
            repository: non_empty_var(REPOSITORY_VAR),
            event_name: non_empty_var(EVENT_NAME_VAR),
            event_path: non_empty_var(EVENT_PATH_VAR).map(PathBuf::from),
            git_ref: non_empty_var(REF_VAR),
        }
    }

    /// PR number for `pull_request` events: the event payload first, then
    /// the `refs/pull/<id>/merge` ref.
    pub fn pull_request_id(&self) -> Option<String> {
        if self.event_name.as_deref() != Some(PULL_REQUEST_EVENT) {
            return None;
        }
        self.pr_id_from_event_payload()
            .or_else(|| self.git_ref.as_deref().and_then(pr_id_from_ref))
    }

    fn pr_id_from_event_payload(&self) -> Option<String> {
        let path = self.event_path.as_ref()?;
        if !path.exists() {
            return None;
        }

        let payload: Value = match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from))
        {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!(
                    "[notify] could not read or parse event payload {}: {err}",
                    path.display()
                );
                return None;
            }
        };

        identifier(payload.get("number"))
            .or_else(|| identifier(payload.get("issue").and_then(|issue| issue.get("number"))))
    }
}

/// A usable PR identifier: a positive integer or a non-empty string.
fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => n.as_u64().filter(|n| *n > 0).map(|n| n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn pr_id_from_ref(git_ref: &str) -> Option<String> {
    if !git_ref.starts_with(PULL_REF_PREFIX) {
        return None;
    }
    match git_ref.split('/').nth(2) {
        Some(id) if !id.is_empty() => Some(id.to_string()),
        _ => {
            log::warn!("[notify] could not parse PR number from {REF_VAR}: {git_ref}");
            None
        }
    }
}
