//! KYC data model: field names, the mutable extraction record, and the
//! finalised output.
//!
//! Models return loosely-typed JSON, so [`ExtractionRecord`] is a plain
//! field-name → string map rather than a struct. That keeps the merge rule
//! ("write every incoming key that carries a real value") simple and lets the
//! validator treat a missing key, an empty string and the `NA` sentinel the
//! same way. Only once validation passes is the record converted into the
//! strongly-typed [`KycInfo`].

use crate::error::{KycError, ModelTier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Explicit "value genuinely absent" marker used in model replies.
pub const SENTINEL: &str = "NA";

/// Length of a legacy US passport number.
pub const PASSPORT_ID_LEN: usize = 9;

/// The six canonical KYC fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycField {
    Name,
    Dob,
    DocumentId,
    ExpiryDate,
    IssuingState,
    Address,
}

impl KycField {
    /// Fields every document must carry, in validation order.
    pub const ALWAYS_REQUIRED: [KycField; 5] = [
        KycField::Name,
        KycField::Dob,
        KycField::DocumentId,
        KycField::ExpiryDate,
        KycField::IssuingState,
    ];

    /// All six fields in output order.
    pub const ALL: [KycField; 6] = [
        KycField::Name,
        KycField::Dob,
        KycField::DocumentId,
        KycField::ExpiryDate,
        KycField::IssuingState,
        KycField::Address,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KycField::Name => "name",
            KycField::Dob => "dob",
            KycField::DocumentId => "document_id",
            KycField::ExpiryDate => "expiry_date",
            KycField::IssuingState => "issuing_state",
            KycField::Address => "address",
        }
    }
}

impl fmt::Display for KycField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `true` when `value` is empty after trimming or equals the `NA` sentinel
/// (case-insensitive, trimmed).
pub fn is_absent(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SENTINEL)
}

/// Document type, derived from `document_id` and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    DrivingLicense,
}

impl DocumentType {
    /// Classify a document by its identifier: exactly nine characters means
    /// a passport, anything else a driving license.
    pub fn classify(document_id: &str) -> Self {
        if document_id.chars().count() == PASSPORT_ID_LEN {
            DocumentType::Passport
        } else {
            DocumentType::DrivingLicense
        }
    }

    /// Whether this document type must carry an address.
    pub fn requires_address(&self) -> bool {
        matches!(self, DocumentType::DrivingLicense)
    }
}

/// Field-name → value map threaded through the extraction pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionRecord {
    fields: BTreeMap<String, String>,
}

impl ExtractionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a model's JSON reply.
    ///
    /// Strings are kept verbatim, numbers and booleans are stringified and
    /// `null` is treated as an absent key. Nested arrays or objects mean the
    /// model ignored the schema, which is reported as a model-call failure so
    /// the retry policy gets a chance to ask again.
    pub fn from_json(value: Value, tier: ModelTier) -> Result<Self, KycError> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(KycError::model(
                    tier,
                    format!("expected a JSON object, got: {other}"),
                ))
            }
        };

        let mut fields = BTreeMap::new();
        for (key, value) in map {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(KycError::model(
                        tier,
                        format!("field '{key}' is not a scalar: {other}"),
                    ))
                }
            };
            fields.insert(key, text);
        }
        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn field(&self, field: KycField) -> Option<&str> {
        self.get(field.as_str())
    }

    /// Value of `field`, or `None` if it is absent, empty or `NA`.
    pub fn present(&self, field: KycField) -> Option<&str> {
        self.field(field).filter(|v| !is_absent(v))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge a partial result into this record.
    ///
    /// Only keys present in `partial` whose value is not absent (see
    /// [`is_absent`]) are written, so a fresh `NA` never clobbers a value
    /// obtained earlier. Returns the keys that were written.
    pub fn merge(&mut self, partial: &ExtractionRecord) -> Vec<String> {
        let mut written = Vec::new();
        for (key, value) in partial.iter() {
            if is_absent(value) {
                continue;
            }
            self.fields.insert(key.to_string(), value.to_string());
            written.push(key.to_string());
        }
        written
    }

    /// Document type implied by `document_id`, if one is present.
    pub fn document_type(&self) -> Option<DocumentType> {
        self.present(KycField::DocumentId).map(DocumentType::classify)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtractionRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Finalised KYC information with exactly the six canonical fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycInfo {
    pub name: String,
    pub dob: String,
    pub document_id: String,
    pub expiry_date: String,
    pub issuing_state: String,
    /// Required for driving licenses only.
    pub address: Option<String>,
}

impl TryFrom<&ExtractionRecord> for KycInfo {
    type Error = KycError;

    /// Copy the six fields out of a record the validator accepted.
    ///
    /// Values are taken verbatim. An always-required field that is missing
    /// here means the caller skipped validation, which is an internal error.
    fn try_from(record: &ExtractionRecord) -> Result<Self, Self::Error> {
        let required = |field: KycField| {
            record
                .field(field)
                .map(str::to_string)
                .ok_or_else(|| KycError::Internal(format!("finalising record without '{field}'")))
        };

        Ok(Self {
            name: required(KycField::Name)?,
            dob: required(KycField::Dob)?,
            document_id: required(KycField::DocumentId)?,
            expiry_date: required(KycField::ExpiryDate)?,
            issuing_state: required(KycField::IssuingState)?,
            address: record.field(KycField::Address).map(str::to_string),
        })
    }
}
