//! Connector routing
//!
//! Pure lookups over the immutable connector set: which connector owns a
//! discovered file, and which folders a document moves through on its way
//! out (archive, error) or in (in-flight, target).

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::domain::connector::Connector;
use crate::domain::document_type::DocumentType;

/// Folder name below the temp root for parked uploads without an error folder
const ERROR_SUBDIR: &str = "errors";

/// Folder name below the temp root for downloads awaiting acknowledgement
const DOWNLOAD_SUBDIR: &str = "downloads";

/// Formats a date as basic ISO 8601 (`YYYYMMDD`), the archive folder name
pub fn basic_iso_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Resolves paths and document types to connectors and effective folders
#[derive(Debug, Clone)]
pub struct ConnectorRouter {
    connectors: Vec<Connector>,
    temp_root: PathBuf,
}

impl ConnectorRouter {
    /// Creates a router over an already validated connector set
    ///
    /// # Arguments
    /// * `connectors` - The connector set from the configuration snapshot
    /// * `temp_root` - Local temp directory used for fallback folders
    pub fn new(connectors: Vec<Connector>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            connectors,
            temp_root: temp_root.into(),
        }
    }

    /// All configured connectors
    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    /// The local temp root
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Every folder watched and polled for uploads, across all connectors
    pub fn source_folders(&self) -> Vec<PathBuf> {
        self.connectors
            .iter()
            .flat_map(|c| c.source_folders())
            .map(Path::to_path_buf)
            .collect()
    }

    /// Finds the connector whose source (or document type source) folder
    /// directly contains `path`
    ///
    /// Source folders are unique across connectors, so at most one matches.
    pub fn connector_for_path(&self, path: &Path) -> Option<&Connector> {
        let parent = path.parent()?;
        self.connectors
            .iter()
            .find(|c| c.source_folders().into_iter().any(|f| f == parent))
    }

    /// Target folder for a downloaded document
    pub fn target_folder_for<'a>(
        &self,
        connector: &'a Connector,
        doc_type: Option<DocumentType>,
    ) -> &'a Path {
        connector.target_folder_for(doc_type)
    }

    /// Date-stamped archive folder, `None` when the connector does not archive
    pub fn archive_folder_for(&self, connector: &Connector, date: NaiveDate) -> Option<PathBuf> {
        connector
            .archive_root()
            .map(|root| root.join(basic_iso_date(date)))
    }

    /// Folder where rejected uploads of `connector` are parked
    ///
    /// An explicitly configured error folder is used as-is. The fallback below
    /// the temp root is split per connector, mode and day.
    pub fn error_folder_for(&self, connector: &Connector, date: NaiveDate) -> PathBuf {
        match &connector.error_folder {
            Some(folder) => folder.clone(),
            None => self
                .temp_root
                .join(ERROR_SUBDIR)
                .join(connector.id.as_str())
                .join(connector.mode.as_header_value())
                .join(basic_iso_date(date)),
        }
    }

    /// Folder where downloads of `connector` wait for acknowledgement
    pub fn in_flight_folder_for(&self, connector: &Connector) -> PathBuf {
        self.temp_root
            .join(DOWNLOAD_SUBDIR)
            .join(connector.id.as_str())
            .join(connector.mode.as_header_value())
    }

    /// Every folder the engine writes to or reads from, for startup creation
    pub fn all_folders(&self) -> Vec<PathBuf> {
        let mut folders = Vec::new();
        for c in &self.connectors {
            folders.extend(c.source_folders().into_iter().map(Path::to_path_buf));
            folders.extend(c.target_folders().into_iter().map(Path::to_path_buf));
            if let Some(root) = c.archive_root() {
                folders.push(root.to_path_buf());
            }
            if let Some(err) = &c.error_folder {
                folders.push(err.clone());
            }
            folders.push(self.in_flight_folder_for(c));
        }
        folders.sort();
        folders.dedup();
        folders
    }
}
