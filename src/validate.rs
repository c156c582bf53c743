//! Field validation: which required KYC fields are still missing?
//!
//! Pure and deterministic; no I/O. The rules are:
//!
//! 1. `name`, `dob`, `document_id`, `expiry_date` and `issuing_state` are
//!    always required, checked in that order.
//! 2. If `document_id` is missing the document type cannot be determined, so
//!    `address` is not evaluated at all.
//! 3. Otherwise a driving license (any `document_id` that is not exactly nine
//!    characters) also requires `address`; a passport does not.
//!
//! A field is missing when it is absent, blank, or the `NA` sentinel.

use crate::record::{DocumentType, ExtractionRecord, KycField};
use serde::Serialize;
use std::fmt;

/// Ordered list of fields the validator found missing. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MissingFieldSet(Vec<KycField>);

impl MissingFieldSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: KycField) -> bool {
        self.0.contains(&field)
    }

    pub fn fields(&self) -> &[KycField] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<KycField> {
        self.0
    }

    /// Comma-separated field names, as used in prompts.
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MissingFieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.joined())
    }
}

/// Compute the missing-field set for `record`.
pub fn validate(record: &ExtractionRecord) -> MissingFieldSet {
    let mut missing: Vec<KycField> = KycField::ALWAYS_REQUIRED
        .into_iter()
        .filter(|&field| record.present(field).is_none())
        .collect();

    let Some(document_id) = record.present(KycField::DocumentId) else {
        return MissingFieldSet(missing);
    };

    if DocumentType::classify(document_id).requires_address()
        && record.present(KycField::Address).is_none()
    {
        missing.push(KycField::Address);
    }

    MissingFieldSet(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> ExtractionRecord {
        pairs.iter().copied().collect()
    }

    fn complete(document_id: &str, address: Option<&str>) -> ExtractionRecord {
        let mut rec = record(&[
            ("name", "Jane Doe"),
            ("dob", "01/02/1990"),
            ("document_id", document_id),
            ("expiry_date", "01/02/2030"),
            ("issuing_state", "CA"),
        ]);
        if let Some(a) = address {
            rec.insert("address", a);
        }
        rec
    }

    #[test]
    fn empty_record_reports_required_fields_only() {
        let missing = validate(&ExtractionRecord::new());
        assert_eq!(missing.fields(), &KycField::ALWAYS_REQUIRED);
        assert!(!missing.contains(KycField::Address));
    }

    #[test]
    fn missing_document_id_never_reports_address() {
        for doc_id in [None, Some(""), Some("NA"), Some(" na ")] {
            let mut rec = record(&[("name", "John Doe"), ("address", "NA")]);
            if let Some(d) = doc_id {
                rec.insert("document_id", d);
            }
            let missing = validate(&rec);
            assert!(missing.contains(KycField::DocumentId));
            assert!(!missing.contains(KycField::Address), "doc_id={doc_id:?}");
        }
    }

    #[test]
    fn passport_exemption() {
        for address in [None, Some("NA"), Some(""), Some("1 Elm St")] {
            assert!(
                validate(&complete("123456789", address)).is_empty(),
                "address={address:?}"
            );
        }
    }

    #[test]
    fn driving_license_requires_address() {
        for address in [None, Some("NA"), Some("na"), Some(" NA "), Some("")] {
            let missing = validate(&complete("DL123456", address));
            assert_eq!(missing.fields(), &[KycField::Address], "address={address:?}");
        }
        assert!(validate(&complete("DL123456", Some("123 Main St"))).is_empty());
    }

    #[test]
    fn sentinel_values_are_missing() {
        for v in ["NA", "na", " NA ", ""] {
            let mut rec = complete("123456789", None);
            rec.insert("name", v);
            assert_eq!(validate(&rec).fields(), &[KycField::Name], "value={v:?}");
        }
    }

    #[test]
    fn order_is_declaration_order_then_address() {
        let rec = record(&[
            ("document_id", "12345"),
            ("issuing_state", "NA"),
            ("name", ""),
        ]);
        let missing = validate(&rec);
        assert_eq!(
            missing.fields(),
            &[
                KycField::Name,
                KycField::Dob,
                KycField::ExpiryDate,
                KycField::IssuingState,
                KycField::Address,
            ]
        );
        assert_eq!(missing.joined(), "name, dob, expiry_date, issuing_state, address");
    }

    #[test]
    fn validation_is_deterministic() {
        let rec = complete("DL1", Some("NA"));
        assert_eq!(validate(&rec), validate(&rec));
    }
}
