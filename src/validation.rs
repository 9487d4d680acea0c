use serde_json::Value;

use crate::error::ValidationError;
use crate::models::MarkerType;

/// Marker fields under validation, already reduced to the shapes the rules
/// inspect. `None` means the field was absent or of the wrong JSON type.
#[derive(Debug, Default, Clone, Copy)]
pub struct Candidate<'a> {
    pub kind: Option<&'a str>,
    pub description: Option<&'a str>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub user: Option<&'a str>,
}

/// Validator for marker data.
pub struct Validator;

impl Validator {
    /// Validate marker type. Matching is case-insensitive.
    pub fn validate_type(kind: Option<&str>) -> Result<(), ValidationError> {
        kind.and_then(MarkerType::parse)
            .map(|_| ())
            .ok_or(ValidationError::InvalidType)
    }

    pub fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
        match description {
            Some(d) if !d.trim().is_empty() => Ok(()),
            _ => Err(ValidationError::MissingDescription),
        }
    }

    /// Validate latitude value.
    pub fn validate_latitude(lat: Option<f64>) -> Result<(), ValidationError> {
        match lat {
            Some(lat) if lat.is_finite() && (-90.0..=90.0).contains(&lat) => Ok(()),
            _ => Err(ValidationError::InvalidLatitude),
        }
    }

    /// Validate longitude value.
    pub fn validate_longitude(lng: Option<f64>) -> Result<(), ValidationError> {
        match lng {
            Some(lng) if lng.is_finite() && (-180.0..=180.0).contains(&lng) => Ok(()),
            _ => Err(ValidationError::InvalidLongitude),
        }
    }

    pub fn validate_user(user: Option<&str>) -> Result<(), ValidationError> {
        match user {
            Some(u) if !u.trim().is_empty() => Ok(()),
            _ => Err(ValidationError::MissingUser),
        }
    }

    /// Run every rule and collect all violations in rule order.
    /// An empty result means the candidate is valid.
    pub fn validate(candidate: &Candidate<'_>) -> Vec<ValidationError> {
        [
            Self::validate_type(candidate.kind),
            Self::validate_description(candidate.description),
            Self::validate_latitude(candidate.lat),
            Self::validate_longitude(candidate.lng),
            Self::validate_user(candidate.user),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect()
    }
}

/// Text content of a JSON value, if it is a string.
pub fn as_text(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

/// Numeric content of a JSON value. Numbers pass through and strings holding
/// a decimal number are coerced.
pub fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
