use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// How awaitable loads observe completion.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AwaitMode {
    /// Suspend on the handle's completion future.
    #[default]
    Completion,
    /// Re-check the handle status (and the cancel token) once per tick.
    Poll,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub await_mode: AwaitMode,
    /// Delay between polls in [`AwaitMode::Poll`]. Without it the task
    /// yields to the scheduler once per poll.
    pub poll_interval_ms: Option<u64>,
    /// Upper bound for synchronous loads. Without it they wait forever.
    pub sync_timeout_ms: Option<u64>,
    /// Release everything still registered when the last loader clone is
    /// dropped.
    pub release_on_drop: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            await_mode: AwaitMode::Completion,
            poll_interval_ms: None,
            sync_timeout_ms: None,
            release_on_drop: true,
        }
    }
}

impl LoaderConfig {
    pub fn parse(data: &str) -> Result<LoaderConfig> {
        let config = serde_json::from_str(data)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<LoaderConfig> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read {}", path.display()))?;
        LoaderConfig::parse(&data).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_ms.map(Duration::from_millis)
    }
}
