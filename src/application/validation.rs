//! Validation collaborator: handlers validate a model and render field errors.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Validation {
    errors: Vec<FieldError>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` against `field` unless `passed` holds.
    pub fn check(&mut self, passed: bool, field: &'static str, message: impl Into<String>) {
        if !passed {
            self.errors.push(FieldError {
                field,
                message: message.into(),
            });
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }
}

pub trait Validate {
    fn validate(&self) -> Validation;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_per_field_is_reported() {
        let mut validation = Validation::new();
        validation.check(true, "name", "unused");
        validation.check(false, "amount", "too small");
        validation.check(false, "amount", "not even");

        assert!(!validation.is_valid());
        assert_eq!(validation.errors().len(), 2);
        assert_eq!(validation.message_for("amount"), Some("too small"));
        assert_eq!(validation.message_for("name"), None);
    }
}
