use anyhow::Result;

use crate::settings::SinkKind;
use crate::utils::process::run_tool;

/// Delivers a comment to a pull request.
pub trait CommentSink {
    fn post(&self, repository: &str, pr_id: &str, message: &str) -> Result<()>;
}

/// Logs the comment instead of posting it.
pub struct LogSink;

impl CommentSink for LogSink {
    fn post(&self, repository: &str, pr_id: &str, message: &str) -> Result<()> {
        log::info!("[notify] comment for {repository}#{pr_id}:\n---\n{message}\n---");
        Ok(())
    }
}

/// Posts through the GitHub CLI, which carries its own authentication.
pub struct GhCliSink {
    program: String,
}

impl GhCliSink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GhCliSink {
    fn default() -> Self {
        Self::new("gh")
    }
}

impl CommentSink for GhCliSink {
    fn post(&self, repository: &str, pr_id: &str, message: &str) -> Result<()> {
        run_tool(
            &self.program,
            &["pr", "comment", pr_id, "--repo", repository, "--body", message],
        )?;
        log::info!("[notify] posted comment via {} to {repository}#{pr_id}", self.program);
        Ok(())
    }
}

pub fn sink_from_kind(kind: SinkKind) -> Box<dyn CommentSink> {
    match kind {
        SinkKind::Log => Box::new(LogSink),
        SinkKind::Gh => Box::new(GhCliSink::default()),
    }
}
