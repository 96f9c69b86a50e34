use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::image_guard::format_bytes;

/// Where a candidate image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Upload,
    Camera,
}

/// An image picked by the user (file upload, drag-drop or camera capture)
/// before it has passed the image guard. Transient: replaced by the next
/// selection or discarded on reset.
#[derive(Debug, Clone)]
pub struct CandidateImage {
    pub bytes: Vec<u8>,
    /// Declared media type (e.g. "image/jpeg"), if the source provided one.
    pub media_type: Option<String>,
    pub file_name: Option<String>,
    pub origin: ImageOrigin,
}

impl CandidateImage {
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Inline data URL for previewing the image without touching disk.
    pub fn data_url(&self) -> String {
        let mime = self.media_type.as_deref().unwrap_or("application/octet-stream");
        format!("data:{};base64,{}", mime, BASE64.encode(&self.bytes))
    }

    /// Human-readable summary line, e.g. `capture-17001.jpg (1.84 MB)`.
    pub fn details(&self) -> String {
        let name = self.file_name.as_deref().unwrap_or("image");
        format!("{} ({})", name, format_bytes(self.byte_len()))
    }
}

/// A candidate image that passed the image guard. Only the guard can build
/// one, so every path into the flow is validated.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    inner: CandidateImage,
}

impl SelectedImage {
    pub(crate) fn new(inner: CandidateImage) -> Self {
        Self { inner }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn media_type(&self) -> Option<&str> {
        self.inner.media_type.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.inner.file_name.as_deref()
    }

    pub fn origin(&self) -> ImageOrigin {
        self.inner.origin
    }

    pub fn as_candidate(&self) -> &CandidateImage {
        &self.inner
    }
}

/// Licence fields as sent to `POST /license/validate`. Blank fields are
/// transmitted as explicit nulls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub address_line: Option<String>,
    pub licence_number: Option<String>,
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// One blocking validation failure, tagged with the wire-level field key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingError {
    pub code: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Validation verdict. The remote service and the local validator both
/// produce this shape; blocking errors gate submission, warnings do not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanValidation {
    #[serde(default)]
    pub blocking_errors: Vec<BlockingError>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Envelope returned by `POST /license/scan`. Immutable once received; the
/// editable form state is derived from it, never written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub request_id: String,
    pub selected_engine: Option<String>,
    #[serde(default)]
    pub attempted_engines: Vec<String>,
    pub ocr_confidence: Option<f64>,
    pub confidence_threshold: Option<f64>,
    pub processing_time_ms: Option<u64>,
    pub fields: Option<ScanFields>,
    pub validation: Option<ScanValidation>,
}

/// Error body the service may attach to a non-2xx response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanErrorPayload {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Keys of the user-editable licence fields. `as_str` yields the camelCase
/// wire name used for error tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    FirstName,
    LastName,
    DateOfBirth,
    AddressLine,
    LicenceNumber,
    ExpiryDate,
    Categories,
}

impl FieldKey {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::FirstName => "firstName",
            FieldKey::LastName => "lastName",
            FieldKey::DateOfBirth => "dateOfBirth",
            FieldKey::AddressLine => "addressLine",
            FieldKey::LicenceNumber => "licenceNumber",
            FieldKey::ExpiryDate => "expiryDate",
            FieldKey::Categories => "categories",
        }
    }
}

/// Mutable projection of a scan result for the review form. Every field is
/// always present; absent values are empty strings, never missing keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditableFields {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub address_line: String,
    pub licence_number: String,
    pub expiry_date: String,
    /// Category list joined by ", " for display.
    pub categories: String,
}

impl EditableFields {
    pub fn from_scan(result: &ScanResult) -> Self {
        let fields = result.fields.as_ref();
        let take = |pick: fn(&ScanFields) -> Option<&String>| {
            fields.and_then(pick).cloned().unwrap_or_default()
        };
        Self {
            first_name: take(|s| s.first_name.as_ref()),
            last_name: take(|s| s.last_name.as_ref()),
            date_of_birth: take(|s| s.date_of_birth.as_ref()),
            address_line: take(|s| s.address_line.as_ref()),
            licence_number: take(|s| s.licence_number.as_ref()),
            expiry_date: take(|s| s.expiry_date.as_ref()),
            categories: fields
                .map(|s| s.categories.join(", "))
                .unwrap_or_default(),
        }
    }

    /// Convert back to the wire shape: trimmed, blanks as nulls, categories
    /// split on commas with empties dropped.
    pub fn to_scan_fields(&self) -> ScanFields {
        let opt = |s: &str| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };
        ScanFields {
            first_name: opt(&self.first_name),
            last_name: opt(&self.last_name),
            date_of_birth: opt(&self.date_of_birth),
            address_line: opt(&self.address_line),
            licence_number: opt(&self.licence_number),
            expiry_date: opt(&self.expiry_date),
            categories: self
                .categories
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn get(&self, key: FieldKey) -> &str {
        match key {
            FieldKey::FirstName => &self.first_name,
            FieldKey::LastName => &self.last_name,
            FieldKey::DateOfBirth => &self.date_of_birth,
            FieldKey::AddressLine => &self.address_line,
            FieldKey::LicenceNumber => &self.licence_number,
            FieldKey::ExpiryDate => &self.expiry_date,
            FieldKey::Categories => &self.categories,
        }
    }

    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        let value = value.into();
        match key {
            FieldKey::FirstName => self.first_name = value,
            FieldKey::LastName => self.last_name = value,
            FieldKey::DateOfBirth => self.date_of_birth = value,
            FieldKey::AddressLine => self.address_line = value,
            FieldKey::LicenceNumber => self.licence_number = value,
            FieldKey::ExpiryDate => self.expiry_date = value,
            FieldKey::Categories => self.categories = value,
        }
    }
}
