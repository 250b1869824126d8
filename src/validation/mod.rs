use std::fmt;

pub const IDENTIFIER_MAX_LEN: usize = 64;
pub const MAX_AMOUNT: i64 = 250_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Identifiers end up inside payment references and callback paths, so they
/// are limited to ASCII letters, digits, `_` and `-`.
pub fn validate_identifier(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, IDENTIFIER_MAX_LEN)?;

    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(ValidationError::new(
            field,
            "must contain only letters, digits, '_' or '-'",
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: i64) -> ValidationResult {
    if amount <= 0 {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }
    if amount > MAX_AMOUNT {
        return Err(ValidationError::new(
            "amount",
            format!("must be at most {}", MAX_AMOUNT),
        ));
    }

    Ok(())
}

/// Normalizes a Kenyan mobile number to the `254XXXXXXXXX` form used by the
/// payment network. Accepts `07…`, `01…`, `7…`, `1…`, `2547…`, `2541…` and
/// the same with a leading `+`.
pub fn normalize_phone(phone: &str) -> Result<String, ValidationError> {
    let compact: String = phone
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .collect();
    validate_required("phone", &compact)?;

    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "must contain only digits"));
    }

    let subscriber = if let Some(rest) = digits.strip_prefix("254") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits
    };

    if subscriber.len() != 9 || !(subscriber.starts_with('7') || subscriber.starts_with('1')) {
        return Err(ValidationError::new(
            "phone",
            "must be a Kenyan mobile number such as 254712345678",
        ));
    }

    Ok(format!("254{}", subscriber))
}
