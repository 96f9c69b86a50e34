//! Local, synchronous validation of the editable licence fields. Cheap
//! enough to run on every keystroke; never touches the network.
//!
//! The postcode and licence-number patterns are heuristics carried over from
//! the recognition service, not authoritative UK formats.

use std::sync::OnceLock;

use chrono::{Local, NaiveDate};
use regex::Regex;

use crate::types::{BlockingError, EditableFields, FieldKey, ScanValidation};

const DATE_FORMAT: &str = "%d.%m.%Y";

fn postcode_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[A-Z]{1,2}\d[A-Z\d]? ?\d[A-Z]{2}\b").expect("postcode regex")
    })
}

fn licence_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Z]{5}\d{6}[A-Z]{2}\d[A-Z]{2}\d{0,2}$").expect("licence number regex")
    })
}

const REQUIRED_FIELDS: [FieldKey; 6] = [
    FieldKey::FirstName,
    FieldKey::LastName,
    FieldKey::DateOfBirth,
    FieldKey::AddressLine,
    FieldKey::LicenceNumber,
    FieldKey::ExpiryDate,
];

/// Validate the form locally. Always returns a result, even for an entirely
/// blank form.
pub fn validate_local(fields: &EditableFields) -> ScanValidation {
    validate_local_at(fields, Local::now().date_naive())
}

fn validate_local_at(fields: &EditableFields, today: NaiveDate) -> ScanValidation {
    let mut blocking_errors = Vec::new();
    let mut warnings = Vec::new();

    for key in REQUIRED_FIELDS {
        if fields.get(key).trim().is_empty() {
            blocking_errors.push(blocking(
                "MISSING_REQUIRED_FIELD",
                key,
                format!("Missing required field: {}", key.as_str()),
            ));
        }
    }

    let address_line = fields.address_line.trim();
    if !address_line.is_empty() && !postcode_pattern().is_match(address_line) {
        blocking_errors.push(blocking(
            "INVALID_POSTCODE",
            FieldKey::AddressLine,
            "Invalid UK postcode in addressLine.",
        ));
    }

    let licence_number = fields.licence_number.trim();
    if !licence_number.is_empty() {
        let normalized: String = licence_number
            .split_whitespace()
            .collect::<String>()
            .to_uppercase();
        if !licence_number_pattern().is_match(&normalized) {
            blocking_errors.push(blocking(
                "INVALID_LICENCE_NUMBER",
                FieldKey::LicenceNumber,
                "Invalid licence number.",
            ));
        }
    }

    // A malformed expiry string is only reported through the required-field
    // check; the past-date rule applies to real calendar dates alone.
    if let Some(expiry) = parse_date(&fields.expiry_date) {
        if expiry < today {
            blocking_errors.push(blocking(
                "EXPIRY_DATE_PAST",
                FieldKey::ExpiryDate,
                "Expiry date is in the past.",
            ));
        }
    }

    if let Some(date_of_birth) = parse_date(&fields.date_of_birth) {
        let outside = match today.years_since(date_of_birth) {
            Some(years) => !(21..=75).contains(&years),
            None => true,
        };
        if outside {
            warnings.push("Age outside 21-75".to_string());
        }
    }

    ScanValidation {
        blocking_errors,
        warnings,
    }
}

fn blocking(code: &str, field: FieldKey, message: impl Into<String>) -> BlockingError {
    BlockingError {
        code: code.to_string(),
        field: Some(field.as_str().to_string()),
        message: Some(message.into()),
    }
}

/// Strict `dd.mm.yyyy`; anything else is `None`.
fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 27).unwrap()
    }

    fn valid_fields() -> EditableFields {
        EditableFields {
            first_name: "JANE".into(),
            last_name: "MORGAN".into(),
            date_of_birth: "11.03.1976".into(),
            address_line: "122 BURNS CRESCENT, EDINBURGH, EH1 9GP".into(),
            licence_number: "MORGA753116SM9IJ".into(),
            expiry_date: "01.01.2031".into(),
            categories: "AM, A, B".into(),
        }
    }

    fn codes_for(result: &ScanValidation, field: &str) -> Vec<String> {
        result
            .blocking_errors
            .iter()
            .filter(|e| e.field.as_deref() == Some(field))
            .map(|e| e.code.clone())
            .collect()
    }

    #[test]
    fn blank_form_yields_one_error_per_required_field() {
        let result = validate_local_at(&EditableFields::default(), today());
        assert_eq!(result.blocking_errors.len(), 6);
        for key in REQUIRED_FIELDS {
            assert_eq!(codes_for(&result, key.as_str()), vec!["MISSING_REQUIRED_FIELD"]);
        }
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn well_formed_fields_pass() {
        let result = validate_local_at(&valid_fields(), today());
        assert!(result.blocking_errors.is_empty(), "{:?}", result.blocking_errors);
    }

    #[test]
    fn licence_number_shape_is_enforced() {
        let mut fields = valid_fields();
        fields.licence_number = "AAAAA999999AA9AA".into();
        let result = validate_local_at(&fields, today());
        assert!(codes_for(&result, "licenceNumber").is_empty());

        // One character short.
        fields.licence_number = "AAAAA999999AA9A".into();
        let result = validate_local_at(&fields, today());
        assert_eq!(codes_for(&result, "licenceNumber"), vec!["INVALID_LICENCE_NUMBER"]);
    }

    #[test]
    fn licence_number_is_normalized_before_matching() {
        let mut fields = valid_fields();
        fields.licence_number = " morga 753116 sm9ij ".into();
        let result = validate_local_at(&fields, today());
        assert!(codes_for(&result, "licenceNumber").is_empty());
    }

    #[test]
    fn address_must_contain_a_postcode() {
        let mut fields = valid_fields();
        fields.address_line = "122 BURNS CRESCENT, EDINBURGH".into();
        let result = validate_local_at(&fields, today());
        assert_eq!(codes_for(&result, "addressLine"), vec!["INVALID_POSTCODE"]);
    }

    #[test]
    fn blank_address_is_only_a_missing_field() {
        let mut fields = valid_fields();
        fields.address_line = "  ".into();
        let result = validate_local_at(&fields, today());
        assert_eq!(codes_for(&result, "addressLine"), vec!["MISSING_REQUIRED_FIELD"]);
    }

    #[test]
    fn expiry_yesterday_blocks_tomorrow_does_not() {
        let mut fields = valid_fields();
        let yesterday = today() - Duration::days(1);
        fields.expiry_date = yesterday.format(DATE_FORMAT).to_string();
        let result = validate_local_at(&fields, today());
        assert_eq!(codes_for(&result, "expiryDate"), vec!["EXPIRY_DATE_PAST"]);

        let tomorrow = today() + Duration::days(1);
        fields.expiry_date = tomorrow.format(DATE_FORMAT).to_string();
        let result = validate_local_at(&fields, today());
        assert!(codes_for(&result, "expiryDate").is_empty());
    }

    #[test]
    fn expiry_today_does_not_block() {
        let mut fields = valid_fields();
        fields.expiry_date = today().format(DATE_FORMAT).to_string();
        let result = validate_local_at(&fields, today());
        assert!(codes_for(&result, "expiryDate").is_empty());
    }

    #[test]
    fn unparseable_expiry_gets_no_date_error() {
        let mut fields = valid_fields();
        fields.expiry_date = "31.02.2031".into();
        let result = validate_local_at(&fields, today());
        assert!(codes_for(&result, "expiryDate").is_empty());

        fields.expiry_date = "2031-01-01".into();
        let result = validate_local_at(&fields, today());
        assert!(codes_for(&result, "expiryDate").is_empty());
    }

    #[test]
    fn age_outside_band_is_a_warning_only() {
        let mut fields = valid_fields();
        fields.date_of_birth = "11.03.2010".into();
        let result = validate_local_at(&fields, today());
        assert_eq!(result.warnings, vec!["Age outside 21-75"]);
        assert!(result.blocking_errors.is_empty());
    }
}
