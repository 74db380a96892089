//! Fallback markup sources for pages the plain fetch cannot load.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{DiscoveryError, PageTarget};

/// Default wall-clock limit for one render.
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 120;

/// Produces markup for a page by other means (headless browser, cache, ...).
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Returns the rendered markup.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::RenderFailed`] when no markup could be produced.
    async fn render(&self, target: &PageTarget) -> Result<String, DiscoveryError>;
}

/// Runs an external command and reads the page markup from its stdout.
///
/// The template is split on whitespace; `{url}` and `{key}` are substituted
/// per argument, e.g. `chromium --headless --dump-dom {url}`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    /// Parses a command template; `None` when it is blank.
    #[must_use]
    pub fn from_template(template: &str) -> Option<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
        })
    }

    /// Overrides the wall-clock limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn expand_args(&self, target: &PageTarget) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{url}", &target.url).replace("{key}", &target.group_key))
            .collect()
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(skip(self), fields(program = %self.program, url = %target.url))]
    async fn render(&self, target: &PageTarget) -> Result<String, DiscoveryError> {
        let fail = |reason: String| DiscoveryError::render_failed(&self.program, &target.url, reason);

        let child = Command::new(&self.program)
            .args(self.expand_args(target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| fail(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| fail(format!("could not start: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("{}: {}", output.status, stderr.trim())));
        }

        let markup = String::from_utf8_lossy(&output.stdout).into_owned();
        if markup.trim().is_empty() {
            return Err(fail("empty output".to_string()));
        }
        debug!(bytes = markup.len(), "Rendered page");
        Ok(markup)
    }
}
