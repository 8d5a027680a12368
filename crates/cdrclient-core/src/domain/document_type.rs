//! Document types and detection
//!
//! Downloaded documents are routed by type. The type is read from the
//! (prefixed) name of the XML root element, so only the head of the file is
//! needed.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Number of leading bytes inspected when detecting the document type
pub const DETECTION_HEAD_BYTES: usize = 8 * 1024;

/// Kind of document exchanged through the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Container,
    Credit,
    Form,
    HospitalMcd,
    Invoice,
    Notification,
    Request,
}

impl DocumentType {
    /// All variants, in matching precedence order
    ///
    /// Root elements often combine several keywords (`generalInvoiceRequest`),
    /// so the more specific kinds come first.
    pub const PRECEDENCE: [DocumentType; 7] = [
        DocumentType::Container,
        DocumentType::HospitalMcd,
        DocumentType::Credit,
        DocumentType::Invoice,
        DocumentType::Notification,
        DocumentType::Form,
        DocumentType::Request,
    ];

    fn keyword(&self) -> &'static str {
        match self {
            DocumentType::Container => "container",
            DocumentType::Credit => "credit",
            DocumentType::Form => "form",
            DocumentType::HospitalMcd => "mcd",
            DocumentType::Invoice => "invoice",
            DocumentType::Notification => "notification",
            DocumentType::Request => "request",
        }
    }

    /// Detects the document type from the head of an XML document
    ///
    /// Returns `None` when no root element is found or its name matches no
    /// known type.
    pub fn detect(head: &[u8]) -> Option<DocumentType> {
        let text = String::from_utf8_lossy(head);
        let root = root_element_name(&text)?.to_ascii_lowercase();
        Self::PRECEDENCE
            .into_iter()
            .find(|t| root.contains(t.keyword()))
    }
}

impl Display for DocumentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentType::Container => "CONTAINER",
            DocumentType::Credit => "CREDIT",
            DocumentType::Form => "FORM",
            DocumentType::HospitalMcd => "HOSPITAL_MCD",
            DocumentType::Invoice => "INVOICE",
            DocumentType::Notification => "NOTIFICATION",
            DocumentType::Request => "REQUEST",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PRECEDENCE
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::InvalidDocumentType(s.to_string()))
    }
}

/// Finds the first element start tag, skipping the XML declaration,
/// processing instructions, comments and doctype, and returns its qualified
/// name. The prefix is kept: `invoice:request` is an invoice.
fn root_element_name(text: &str) -> Option<&str> {
    let mut rest = text;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') {
            let end = if rest.starts_with("!--") {
                rest.find("-->")? + 3
            } else {
                rest.find('>')? + 1
            };
            rest = &rest[end..];
            continue;
        }
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let qualified = &rest[..name_end];
        return if qualified.is_empty() {
            None
        } else {
            Some(qualified)
        };
    }
}
