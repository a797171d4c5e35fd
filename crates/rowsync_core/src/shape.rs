//! Payload shapes.
//!
//! A [`Shape`] lists the fields a payload may carry, their kinds and
//! whether they are required or nullable. Resources use one shape to
//! validate create payloads, one for update patches and one to project
//! outgoing rows.

use rowsync_sync_protocol::Row;
use serde_json::Value;
use std::fmt;

/// Kind of value a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// JSON string.
    Text,
    /// Integral JSON number.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// String holding a UUID.
    Uuid,
    /// Any JSON value.
    Json,
}

impl FieldKind {
    /// Returns true if a non-null value has this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            FieldKind::Json => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Uuid => "uuid",
            FieldKind::Json => "json",
        }
    }
}

/// One field of a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column name.
    pub name: String,
    /// Accepted kind.
    pub kind: FieldKind,
    /// Must be present in the payload.
    pub required: bool,
    /// May be null.
    pub nullable: bool,
}

impl FieldSpec {
    /// Creates a required, non-nullable field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            nullable: false,
        }
    }

    /// Makes the field optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Allows null values.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A payload failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending field, if the failure is field-specific.
    pub field: Option<String>,
    /// Description of the failure.
    pub message: String,
}

impl ValidationError {
    /// Creates an error not tied to a field.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// Creates an error for a field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(ref field) => write!(f, "field `{field}`: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Field list used to validate and project rows.
///
/// A shape without fields accepts any object and projects rows unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shape {
    fields: Vec<FieldSpec>,
    strict: bool,
}

impl Shape {
    /// Creates an empty, strict shape.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            strict: true,
        }
    }

    /// A shape that accepts any object.
    pub fn any() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    /// Adds a required, non-nullable field.
    #[must_use]
    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(FieldSpec::new(name, kind))
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(FieldSpec::new(name, kind).optional())
    }

    /// Sets whether unknown fields are rejected.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Derives a shape with every field optional.
    #[must_use]
    pub fn partial(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .cloned()
                .map(FieldSpec::optional)
                .collect(),
            strict: self.strict,
        }
    }

    /// Derives a shape without the named field.
    #[must_use]
    pub fn without(&self, name: &str) -> Self {
        Self {
            fields: self.fields.iter().filter(|f| f.name != name).cloned().collect(),
            strict: self.strict,
        }
    }

    /// Returns the field specs.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns the spec of a field.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the shape names the field.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Validates a payload and returns it as a row.
    pub fn validate(&self, payload: &Value) -> Result<Row, ValidationError> {
        let Value::Object(row) = payload else {
            return Err(ValidationError::new("payload must be a JSON object"));
        };

        if self.fields.is_empty() {
            return Ok(row.clone());
        }

        for spec in &self.fields {
            match row.get(&spec.name) {
                None if spec.required => {
                    return Err(ValidationError::field(&spec.name, "is required"));
                }
                None => {}
                Some(Value::Null) if spec.nullable => {}
                Some(Value::Null) => {
                    return Err(ValidationError::field(&spec.name, "must not be null"));
                }
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(ValidationError::field(
                        &spec.name,
                        format!("expected {}", spec.kind.name()),
                    ));
                }
                Some(_) => {}
            }
        }

        if self.strict {
            if let Some(unknown) = row.keys().find(|k| !self.contains(k)) {
                return Err(ValidationError::field(unknown, "is not a known field"));
            }
        }

        Ok(row.clone())
    }

    /// Keeps only the shape's fields of a row.
    pub fn project(&self, row: &Row) -> Row {
        if self.fields.is_empty() {
            return row.clone();
        }
        row.iter()
            .filter(|(k, _)| self.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn todo_shape() -> Shape {
        Shape::new()
            .required("text", FieldKind::Text)
            .optional("completed", FieldKind::Boolean)
            .field(FieldSpec::new("parent_id", FieldKind::Integer).optional().nullable())
    }

    #[test]
    fn accepts_valid_payload() {
        let row = todo_shape()
            .validate(&json!({"text": "buy milk", "completed": false}))
            .unwrap();
        assert_eq!(row["text"], "buy milk");
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = todo_shape().validate(&json!({"completed": true})).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("text"));
    }

    #[test]
    fn rejects_wrong_kind() {
        let err = todo_shape()
            .validate(&json!({"text": "x", "completed": "yes"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "field `completed`: expected boolean");
    }

    #[test]
    fn nullability() {
        assert!(todo_shape()
            .validate(&json!({"text": "x", "parent_id": null}))
            .is_ok());
        assert!(todo_shape().validate(&json!({"text": null})).is_err());
    }

    #[test]
    fn strict_shapes_reject_unknown_fields() {
        let err = todo_shape()
            .validate(&json!({"text": "x", "user_id": "mallory"}))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("user_id"));

        let lenient = todo_shape().strict(false);
        assert!(lenient.validate(&json!({"text": "x", "extra": 1})).is_ok());
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(Shape::any().validate(&json!([1, 2])).is_err());
        assert!(Shape::any().validate(&json!({"anything": 1})).is_ok());
    }

    #[test]
    fn partial_makes_everything_optional() {
        let partial = todo_shape().partial();
        assert!(partial.validate(&json!({})).is_ok());
        assert!(partial.validate(&json!({"completed": 1})).is_err());
    }

    #[test]
    fn uuid_fields() {
        let shape = Shape::new().required("id", FieldKind::Uuid);
        assert!(shape
            .validate(&json!({"id": "67e55044-10b1-426f-9247-bb680e5fe0c8"}))
            .is_ok());
        assert!(shape.validate(&json!({"id": "not-a-uuid"})).is_err());
    }

    #[test]
    fn project_keeps_known_fields() {
        let shape = Shape::new()
            .required("id", FieldKind::Integer)
            .required("text", FieldKind::Text);
        let row = json!({"id": 1, "text": "x", "secret": "s"})
            .as_object()
            .cloned()
            .unwrap();
        let projected = shape.project(&row);
        assert_eq!(projected.len(), 2);
        assert!(!projected.contains_key("secret"));
    }

    proptest! {
        #[test]
        fn integer_fields_reject_fractions(n in -1000i64..1000, frac in 1u32..100) {
            let shape = Shape::new().required("n", FieldKind::Integer);
            let whole = json!({"n": n});
            prop_assert!(shape.validate(&whole).is_ok());
            let fractional = n as f64 + f64::from(frac) / 100.0;
            let fractional = json!({"n": fractional});
            prop_assert!(shape.validate(&fractional).is_err());
        }
    }
}
