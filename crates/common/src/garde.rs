//! Garde validation helpers shared by the request-facing services.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Run garde validation and fold the report into a single `DomainError`.
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_report(&report)))
}

/// `path: message` pairs joined by ", ", or just the message for root errors.
fn format_report(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{path}: {}", error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
