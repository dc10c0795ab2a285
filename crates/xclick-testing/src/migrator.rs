//! Migrator that records what it was asked to apply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use xclick::{BoxError, DriverError, MigrationSource, Migrator};

/// One recorded migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSource {
    /// Name of the applied source.
    pub source: String,
    /// Number of scripts in the source.
    pub files: usize,
    /// Connection strings the source was applied to.
    pub dsns: Vec<String>,
}

/// A [`Migrator`] that records each run and can fail on a named source.
///
/// Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingMigrator {
    fail_on: Option<String>,
    delay: Option<Duration>,
    applied: Arc<Mutex<Vec<AppliedSource>>>,
}

impl RecordingMigrator {
    /// Create a migrator that accepts every source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when asked to apply the source with this name.
    #[must_use]
    pub fn fail_on(mut self, source: impl Into<String>) -> Self {
        self.fail_on = Some(source.into());
        self
    }

    /// Sleep before applying each source.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Runs recorded so far, in order. Failed runs are not recorded.
    #[must_use]
    pub fn applied(&self) -> Vec<AppliedSource> {
        self.applied.lock().clone()
    }

    /// Names of the sources applied so far.
    #[must_use]
    pub fn applied_names(&self) -> Vec<String> {
        self.applied.lock().iter().map(|run| run.source.clone()).collect()
    }
}

#[async_trait]
impl Migrator for RecordingMigrator {
    async fn apply(&self, source: &MigrationSource, dsns: &[String]) -> Result<(), BoxError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.as_deref() == Some(source.name()) {
            return Err(DriverError::other(format!("migration {} failed: dirty database", source.name())).into());
        }

        self.applied.lock().push(AppliedSource {
            source: source.name().to_string(),
            files: source.len(),
            dsns: dsns.to_vec(),
        });
        Ok(())
    }
}
