use std::fmt;

/// One violated invariant of a stored record. Entity validators collect
/// these instead of returning a bare boolean so callers can report which
/// fields are broken.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type ValidationResult = Result<(), Vec<FieldViolation>>;

pub fn violations_to_strings(violations: &[FieldViolation]) -> Vec<String> {
    violations.iter().map(|v| v.to_string()).collect()
}

/// Pushes a violation unless `value` is a finite number in `[min, max]`.
pub fn check_amount(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) {
    if !value.is_finite() {
        out.push(FieldViolation::new(field, "must be a finite number"));
    } else if value < min || value > max {
        out.push(FieldViolation::new(
            field,
            format!("must be between {min} and {max}"),
        ));
    }
}

pub fn check_non_negative(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: f64,
    max: f64,
) {
    check_amount(out, field, value, 0.0, max);
}

pub fn check_text_len(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.chars().count();
    if len < min || len > max {
        out.push(FieldViolation::new(
            field,
            format!("length must be between {min} and {max} characters"),
        ));
    }
}

pub fn check_not_empty(out: &mut Vec<FieldViolation>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        out.push(FieldViolation::new(field, "must not be empty"));
    }
}
