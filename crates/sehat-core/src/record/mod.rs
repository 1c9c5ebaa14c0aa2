//! Patient record data model.
//!
//! [`ContentRecord`] is the JSON document uploaded to the content store:
//! patient fields, an embedded list of [`FileRef`]s for separately uploaded
//! attachments, and stamp metadata. The document is immutable once stored
//! (content addressing guarantees any mutation produces a different content
//! id), so there is no update path here, only construction.
//!
//! Field names on the wire are camelCase to stay compatible with documents
//! already pinned by earlier deployments of the system.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum accepted byte length for a patient identifier.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Current schema version stamped into uploaded documents.
pub const SCHEMA_VERSION: &str = "1.0";

/// Errors raised when validating a patient identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The identifier is empty or whitespace-only.
    #[error("patient identifier is empty")]
    Empty,

    /// The identifier exceeds [`MAX_IDENTIFIER_LEN`].
    #[error("patient identifier too long: {0} bytes exceeds {MAX_IDENTIFIER_LEN}")]
    TooLong(usize),
}

/// An opaque, validated patient identifier (e.g. a 12-digit national ID).
///
/// The raw string never leaves the client; ledger calls only ever see its
/// derived [`crate::RecordKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientId(String);

impl PatientId {
    /// Validates and wraps an identifier string.
    ///
    /// The identifier is opaque: only emptiness and length are checked here.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] if the trimmed identifier is empty or too
    /// long.
    pub fn new(identifier: &str) -> Result<Self, IdentifierError> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if trimmed.len() > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong(trimmed.len()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Demographic and medical fields of a patient record.
///
/// `extra` carries any fields this version does not model, so documents
/// written by newer or older clients survive a round trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Patient name.
    pub name: String,

    /// Age in years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    /// Gender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// Blood pressure reading, e.g. "130/85".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,

    /// Known heart disease, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_disease: Option<String>,

    /// Current diagnosis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,

    /// Prescribed treatment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,

    /// Unmodeled fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Reference to an attachment uploaded separately to the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Content id of the uploaded file.
    #[serde(rename = "ipfsHash")]
    pub content_id: String,

    /// Original file name.
    #[serde(rename = "fileName")]
    pub file_name: String,

    /// MIME type of the file.
    #[serde(rename = "fileType")]
    pub mime_type: String,

    /// File size in bytes.
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Stamp metadata embedded in every uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// RFC 3339 creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: String,

    /// Document schema version.
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
}

impl RecordMetadata {
    /// Stamps metadata for a document created now.
    #[must_use]
    pub fn stamp() -> Self {
        Self {
            created_at: chrono::Utc::now().to_rfc3339(),
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// The combined JSON document uploaded to the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Patient fields, flattened into the document root.
    #[serde(flatten)]
    pub patient: PatientRecord,

    /// References to separately uploaded attachments. Empty is valid.
    pub files: Vec<FileRef>,

    /// Stamp metadata.
    pub metadata: RecordMetadata,
}

/// An in-memory file handed to the upload path.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    /// File name, used for validation error messages and [`FileRef`]s.
    pub file_name: String,

    /// Declared MIME type.
    pub mime_type: String,

    /// File contents.
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    /// Creates an attachment from raw bytes.
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Returns the attachment size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_id_trims_and_accepts() {
        let id = PatientId::new("  123456789012  ").unwrap();
        assert_eq!(id.as_str(), "123456789012");
    }

    #[test]
    fn patient_id_rejects_empty() {
        assert_eq!(PatientId::new("   "), Err(IdentifierError::Empty));
    }

    #[test]
    fn patient_id_rejects_overlong() {
        let long = "9".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(matches!(
            PatientId::new(&long),
            Err(IdentifierError::TooLong(_))
        ));
    }

    #[test]
    fn content_record_serializes_flat_with_camel_case() {
        let record = ContentRecord {
            patient: PatientRecord {
                name: "Rahul Sharma".into(),
                age: Some(35),
                blood_pressure: Some("130/85".into()),
                disease: Some("Diabetes".into()),
                ..PatientRecord::default()
            },
            files: vec![FileRef {
                content_id: "QmExampleExample".into(),
                file_name: "report.pdf".into(),
                mime_type: "application/pdf".into(),
                size_bytes: 1024,
            }],
            metadata: RecordMetadata {
                created_at: "2024-01-01T00:00:00Z".into(),
                schema_version: SCHEMA_VERSION.into(),
            },
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "Rahul Sharma");
        assert_eq!(value["bloodPressure"], "130/85");
        assert_eq!(value["files"][0]["ipfsHash"], "QmExampleExample");
        assert_eq!(value["files"][0]["fileType"], "application/pdf");
        assert_eq!(value["metadata"]["schemaVersion"], "1.0");
    }

    #[test]
    fn unknown_fields_round_trip_through_extra() {
        let json = serde_json::json!({
            "name": "A",
            "disease": "Flu",
            "aadhaarMasked": "XXXX-XXXX-9012",
            "files": [],
            "metadata": {"createdAt": "2024-01-01T00:00:00Z", "schemaVersion": "1.0"},
        });

        let record: ContentRecord = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(
            record.patient.extra.get("aadhaarMasked").unwrap(),
            "XXXX-XXXX-9012"
        );

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back, json);
    }
}
