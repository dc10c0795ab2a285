//! Migration sources and the migrator seam.
//!
//! A [`MigrationSource`] is an ordered bundle of schema-change scripts,
//! usually embedded in the binary with `include_str!`. Executing them is the
//! job of a [`Migrator`]; the pool only decides when and against which
//! targets it runs.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, Error, Result};

/// One migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    name: Cow<'static, str>,
    contents: Cow<'static, str>,
}

impl MigrationFile {
    /// Create a migration script.
    pub fn new(name: impl Into<Cow<'static, str>>, contents: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    /// File name, e.g. `000001_create_tasks.up.sql`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Script body.
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.contents
    }
}

/// An ordered set of migration scripts.
///
/// Files are kept sorted by name, which is the order a migrator applies them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    name: String,
    files: Vec<MigrationFile>,
}

impl MigrationSource {
    /// Create an empty source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    /// Create a source from embedded `(file name, contents)` pairs.
    ///
    /// ```rust,ignore
    /// static TASKS: &[(&str, &str)] = &[
    ///     ("000001_create_tasks.up.sql", include_str!("../migrations/000001_create_tasks.up.sql")),
    /// ];
    /// let source = MigrationSource::from_static("tasks", TASKS);
    /// ```
    pub fn from_static(name: impl Into<String>, files: &'static [(&'static str, &'static str)]) -> Self {
        files
            .iter()
            .fold(Self::new(name), |source, (file, contents)| {
                source.with_file(*file, *contents)
            })
    }

    /// Load every `.sql` file of a directory.
    ///
    /// The source is named after the directory. Subdirectories are ignored.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut source = Self::new(name);
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();
            if !entry.file_type()?.is_file()
                || file_path.extension().is_none_or(|ext| ext != "sql")
            {
                continue;
            }
            let contents = std::fs::read_to_string(&file_path)?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            source = source.with_file(file_name, contents);
        }

        tracing::debug!(
            source = %source.name,
            files = source.files.len(),
            "loaded migration directory"
        );
        Ok(source)
    }

    /// Add a script, keeping files ordered by name.
    ///
    /// A script with the same name as an existing one replaces it.
    #[must_use]
    pub fn with_file(
        mut self,
        name: impl Into<Cow<'static, str>>,
        contents: impl Into<Cow<'static, str>>,
    ) -> Self {
        let file = MigrationFile::new(name, contents);
        match self
            .files
            .binary_search_by(|existing| existing.name().cmp(file.name()))
        {
            Ok(index) => self.files[index] = file,
            Err(index) => self.files.insert(index, file),
        }
        self
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scripts in application order.
    #[must_use]
    pub fn files(&self) -> &[MigrationFile] {
        &self.files
    }

    /// Number of scripts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the source has no scripts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Applies pending migrations.
///
/// `dsns` holds one connection string per configured host, formatted by
/// [`format_dsn`](crate::format_dsn). The migrator applies the source
/// against every target and returns the first failure.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Apply all pending scripts of `source` to each target.
    async fn apply(
        &self,
        source: &MigrationSource,
        dsns: &[String],
    ) -> std::result::Result<(), BoxError>;
}

#[async_trait]
impl<M: Migrator + ?Sized> Migrator for Arc<M> {
    async fn apply(
        &self,
        source: &MigrationSource,
        dsns: &[String],
    ) -> std::result::Result<(), BoxError> {
        (**self).apply(source, dsns).await
    }
}

/// Apply sources one after another, stopping at the first failure.
pub(crate) async fn apply_sources(
    migrator: &dyn Migrator,
    sources: &[MigrationSource],
    dsns: &[String],
) -> Result<()> {
    for source in sources {
        tracing::info!(
            source = %source.name(),
            files = source.len(),
            targets = dsns.len(),
            "applying migrations"
        );

        migrator
            .apply(source, dsns)
            .await
            .map_err(|err| Error::Migration {
                source_name: source.name().to_string(),
                source: err,
            })?;
    }
    Ok(())
}
