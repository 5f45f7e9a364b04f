mod context;
mod sink;

pub use context::{CiContext, EVENT_NAME_VAR, EVENT_PATH_VAR, REF_VAR, REPOSITORY_VAR};
pub use sink::{sink_from_kind, CommentSink, GhCliSink, LogSink};

use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    Delivered {
        repository: String,
        pr_id: String,
    },
    /// Repository or PR could not be resolved; nothing was sent.
    Undeliverable {
        repository: Option<String>,
        pr_id: Option<String>,
    },
}

/// Resolves where a message goes and hands it to a sink. No retries, no
/// state between calls.
pub struct NotificationDispatcher {
    context: CiContext,
    sink: Box<dyn CommentSink>,
}

impl NotificationDispatcher {
    pub fn new(context: CiContext, sink: Box<dyn CommentSink>) -> Self {
        Self { context, sink }
    }

    pub fn resolve(
        &self,
        pr_id: Option<&str>,
        repo_slug: Option<&str>,
    ) -> (Option<String>, Option<String>) {
        let repository = repo_slug
            .map(String::from)
            .or_else(|| self.context.repository.clone());
        let pr_id = pr_id
            .map(String::from)
            .or_else(|| self.context.pull_request_id());
        (repository, pr_id)
    }

    /// Errors only when a resolved destination rejects the message.
    pub fn notify(
        &self,
        message: &str,
        pr_id: Option<&str>,
        repo_slug: Option<&str>,
    ) -> Result<Delivery> {
        match self.resolve(pr_id, repo_slug) {
            (Some(repository), Some(pr_id)) => {
                log::info!("[notify] deliverable to {repository} PR #{pr_id}");
                self.sink.post(&repository, &pr_id, message)?;
                Ok(Delivery::Delivered { repository, pr_id })
            }
            (repository, pr_id) => {
                log::warn!(
                    "[notify] undeliverable, missing destination (repository={}, pr={})",
                    repository.as_deref().unwrap_or("<unset>"),
                    pr_id.as_deref().unwrap_or("<unset>")
                );
                Ok(Delivery::Undeliverable { repository, pr_id })
            }
        }
    }
}
