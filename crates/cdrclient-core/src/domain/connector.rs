//! Connector entity
//!
//! A [`Connector`] pairs a local source/target folder pair (plus optional
//! per-document-type overrides) with a processing mode. Connectors are read
//! from the configuration snapshot at startup and never change afterwards.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::document_type::DocumentType;
use super::errors::DomainError;
use super::newtypes::ConnectorId;

// ============================================================================
// ProcessingMode
// ============================================================================

/// Processing mode of a connector; must match the endpoint the documents go to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingMode {
    Test,
    Production,
}

impl ProcessingMode {
    /// Wire value used in the `cdr-processing-mode` header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            ProcessingMode::Test => "test",
            ProcessingMode::Production => "production",
        }
    }
}

impl Display for ProcessingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Test => write!(f, "TEST"),
            ProcessingMode::Production => write!(f, "PRODUCTION"),
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TEST" => Ok(ProcessingMode::Test),
            "PRODUCTION" => Ok(ProcessingMode::Production),
            other => Err(DomainError::InvalidMode(other.to_string())),
        }
    }
}

// ============================================================================
// DocTypeFolders
// ============================================================================

/// Optional source/target override for one document type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTypeFolders {
    #[serde(default)]
    pub source_folder: Option<PathBuf>,
    #[serde(default)]
    pub target_folder: Option<PathBuf>,
}

// ============================================================================
// Connector
// ============================================================================

/// A configured routing unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    /// Connector id as issued by the platform
    pub id: ConnectorId,
    /// Whether documents go to the test or production endpoint
    pub mode: ProcessingMode,
    /// Folder watched and polled for outgoing `.xml` documents
    pub source_folder: PathBuf,
    /// Folder where downloaded documents land by default
    pub target_folder: PathBuf,
    /// Media type sent as `Content-Type` on upload
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Keep successfully uploaded documents instead of deleting them
    #[serde(default)]
    pub archive_enabled: bool,
    /// Root of the date-stamped archive; required when archiving is enabled
    #[serde(default)]
    pub archive_folder: Option<PathBuf>,
    /// Where rejected uploads are parked; falls back to the temp dir
    #[serde(default)]
    pub error_folder: Option<PathBuf>,
    /// Per-document-type folder overrides
    #[serde(default)]
    pub doc_type_folders: BTreeMap<DocumentType, DocTypeFolders>,
}

fn default_content_type() -> String {
    "application/forumdatenaustausch+xml;charset=UTF-8".to_string()
}

impl Connector {
    /// Creates a connector with the mandatory fields and defaults for the rest
    pub fn new(
        id: ConnectorId,
        mode: ProcessingMode,
        source_folder: impl Into<PathBuf>,
        target_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            mode,
            source_folder: source_folder.into(),
            target_folder: target_folder.into(),
            content_type: default_content_type(),
            archive_enabled: false,
            archive_folder: None,
            error_folder: None,
            doc_type_folders: BTreeMap::new(),
        }
    }

    /// Enables archiving into the given root folder
    pub fn with_archive(mut self, archive_folder: impl Into<PathBuf>) -> Self {
        self.archive_enabled = true;
        self.archive_folder = Some(archive_folder.into());
        self
    }

    /// Sets an explicit error folder
    pub fn with_error_folder(mut self, error_folder: impl Into<PathBuf>) -> Self {
        self.error_folder = Some(error_folder.into());
        self
    }

    /// Adds a document type override
    pub fn with_doc_type_folders(mut self, doc_type: DocumentType, folders: DocTypeFolders) -> Self {
        self.doc_type_folders.insert(doc_type, folders);
        self
    }

    /// Human-readable `id/MODE` key used in logs and guards
    pub fn key(&self) -> String {
        format!("{}/{}", self.id, self.mode)
    }

    /// All folders watched and polled for uploads: the connector's own source
    /// folder followed by every document type source override
    pub fn source_folders(&self) -> Vec<&Path> {
        let mut folders = vec![self.source_folder.as_path()];
        folders.extend(
            self.doc_type_folders
                .values()
                .filter_map(|f| f.source_folder.as_deref()),
        );
        folders
    }

    /// All folders downloaded documents may land in
    pub fn target_folders(&self) -> Vec<&Path> {
        let mut folders = vec![self.target_folder.as_path()];
        folders.extend(
            self.doc_type_folders
                .values()
                .filter_map(|f| f.target_folder.as_deref()),
        );
        folders
    }

    /// Target folder for a downloaded document of the given type
    ///
    /// Falls back to the connector's base target folder when the type is
    /// unknown or has no target override.
    pub fn target_folder_for(&self, doc_type: Option<DocumentType>) -> &Path {
        doc_type
            .and_then(|t| self.doc_type_folders.get(&t))
            .and_then(|f| f.target_folder.as_deref())
            .unwrap_or(&self.target_folder)
    }

    /// Archive root if archiving is enabled and configured
    pub fn archive_root(&self) -> Option<&Path> {
        if self.archive_enabled {
            self.archive_folder.as_deref()
        } else {
            None
        }
    }
}
