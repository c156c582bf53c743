//! Prompts for the three model tiers.
//!
//! All prompt text lives here so the extraction rules can be tuned in one
//! place and inspected by unit tests without a live model.

use crate::validate::MissingFieldSet;

/// Instruction sent with the document image to the OCR tier.
pub const OCR_EXTRACTION_PROMPT: &str = r#"Extract the following KYC fields from the document in JSON format: name, dob, document_id, expiry_date, address, and issuing_state.
Rules:
1. Name must include valid first and last name (never NA).
2. The document is either a US State driving license or a US passport.
3. For driving licenses, the document will contain a US state name and an address.
4. For US passports, the document_id is nine digits and address should be returned as NA; issuing_state must be provided.
5. For driving licenses, document_id may be in various formats (e.g., 'DL 12345', 'DN 12345', 'DLN 12345') where only the numeric part is needed.
6. Date format is MM/DD/YYYY.
Respond with a single JSON object with exactly these keys: "name", "dob", "document_id", "expiry_date", "issuing_state", "address". Do not add commentary."#;

/// Instruction for the visual tier: read only the fields still missing.
pub fn visual_prompt(missing: &MissingFieldSet) -> String {
    format!(
        "Extract the following fields from the document: {}",
        missing.joined()
    )
}

/// Instruction for the reasoning tier: turn the visual tier's free text into
/// a JSON object holding only the missing fields.
pub fn reasoning_prompt(missing: &MissingFieldSet, visual_text: &str) -> String {
    let fields = missing.joined();
    format!(
        "Based on the following extracted text from the document:\n\
         {visual_text}\n\n\
         Extract the following missing fields in JSON format: {fields}.\n\
         Rules:\n\
         1. For 'name', ensure it includes both first and last name.\n\
         2. For 'address', provide the full address if available.\n\
         3. Use the date format MM/DD/YYYY for any dates.\n\
         4. If the value of the missing fields is Not available, then assign 'NA' to it.\n\
         Respond with a single JSON object whose keys are exactly: {fields}."
    )
}
