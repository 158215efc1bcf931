use chrono::NaiveDate;
use validator::{Validate, ValidationError};

use crate::errors::AppError;

pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(AppError::from)
}

/// A task window must not end before it starts.
pub fn validate_date_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), AppError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(AppError::BadRequest(
            "endDate must not be before startDate".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    }

    #[test]
    fn end_before_start_is_rejected() {
        assert!(validate_date_order(date("2024-03-10"), date("2024-03-01")).is_err());
        assert!(validate_date_order(date("2024-03-01"), date("2024-03-01")).is_ok());
        assert!(validate_date_order(None, date("2024-03-01")).is_ok());
    }

    #[test]
    fn whitespace_only_is_blank() {
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank(" x ").is_ok());
    }
}
