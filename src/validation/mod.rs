//! Set-request validator
//!
//! Checks the shape of a proposed defaults update before anything is
//! persisted and normalizes it into typed concern updates.
//! Uses the Chain of Responsibility pattern for validation rules.

use crate::core::{
    ReadConcern, ReadConcernLevel, Result, RwcError, WriteAcknowledgment, WriteConcern,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest numeric `w` accepted for a default write concern.
pub const MAX_WRITE_CONCERN_NODES: i64 = 50;

const READ_CONCERN_FIELD: &str = "defaultReadConcern";
const WRITE_CONCERN_FIELD: &str = "defaultWriteConcern";

/// Raw set-request payload, exactly as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDefaultsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_read_concern: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_write_concern: Option<Value>,
}

impl SetDefaultsRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_concern(mut self, value: Value) -> Self {
        self.default_read_concern = Some(value);
        self
    }

    pub fn write_concern(mut self, value: Value) -> Self {
        self.default_write_concern = Some(value);
        self
    }
}

/// A single concern change: replace the value, or clear it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcernUpdate<T> {
    Set(T),
    Unset,
}

/// Validated, typed form of a [`SetDefaultsRequest`].
///
/// `None` means the request did not touch that concern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedUpdate {
    pub read_concern: Option<ConcernUpdate<ReadConcern>>,
    pub write_concern: Option<ConcernUpdate<WriteConcern>>,
}

/// State the guarded-unset rule depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationContext {
    /// A non-empty write concern is currently persisted.
    pub explicit_write_concern_set: bool,
    /// The require-majority capability is active.
    pub require_majority: bool,
}

/// Trait for validation rules (Chain of Responsibility pattern)
pub trait ValidationRule: Send + Sync {
    fn validate(&self, request: &SetDefaultsRequest, context: &ValidationContext) -> Result<()>;
}

/// At least one of the two concerns must be supplied
#[derive(Debug, Clone, Default)]
pub struct RequireConcernRule;

impl ValidationRule for RequireConcernRule {
    fn validate(&self, request: &SetDefaultsRequest, _context: &ValidationContext) -> Result<()> {
        if request.default_read_concern.is_none() && request.default_write_concern.is_none() {
            return Err(RwcError::MissingArgument(format!(
                "At least one of '{}' or '{}' must be specified",
                READ_CONCERN_FIELD, WRITE_CONCERN_FIELD
            )));
        }
        Ok(())
    }
}

/// Checks the structure of `defaultWriteConcern`
#[derive(Debug, Clone, Default)]
pub struct WriteConcernShapeRule;

impl ValidationRule for WriteConcernShapeRule {
    fn validate(&self, request: &SetDefaultsRequest, _context: &ValidationContext) -> Result<()> {
        if let Some(value) = &request.default_write_concern {
            parse_write_concern(value)?;
        }
        Ok(())
    }
}

/// Rejects clearing a concrete write concern while require-majority is active
#[derive(Debug, Clone, Default)]
pub struct GuardedWriteConcernUnsetRule;

impl ValidationRule for GuardedWriteConcernUnsetRule {
    fn validate(&self, request: &SetDefaultsRequest, context: &ValidationContext) -> Result<()> {
        let Some(Value::Object(fields)) = &request.default_write_concern else {
            return Ok(());
        };
        if fields.is_empty() && context.require_majority && context.explicit_write_concern_set {
            return Err(RwcError::IllegalState(
                "The global default write concern cannot be unset once it is set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Checks the structure and level of `defaultReadConcern`
#[derive(Debug, Clone, Default)]
pub struct ReadConcernShapeRule;

impl ValidationRule for ReadConcernShapeRule {
    fn validate(&self, request: &SetDefaultsRequest, _context: &ValidationContext) -> Result<()> {
        if let Some(value) = &request.default_read_concern {
            parse_read_concern(value)?;
        }
        Ok(())
    }
}

/// Main set-request validator using Chain of Responsibility
pub struct ValidationEngine {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidationEngine {
    /// Create validator with default rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RequireConcernRule),
                Box::new(ReadConcernShapeRule),
                Box::new(WriteConcernShapeRule),
                Box::new(GuardedWriteConcernUnsetRule),
            ],
        }
    }

    /// Create validator with custom rules
    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Validate a request against all rules and normalize it.
    pub fn validate(
        &self,
        request: &SetDefaultsRequest,
        context: &ValidationContext,
    ) -> Result<NormalizedUpdate> {
        for rule in &self.rules {
            rule.validate(request, context)?;
        }

        let read_concern = request
            .default_read_concern
            .as_ref()
            .map(parse_read_concern)
            .transpose()?;
        let write_concern = request
            .default_write_concern
            .as_ref()
            .map(parse_write_concern)
            .transpose()?;

        Ok(NormalizedUpdate {
            read_concern,
            write_concern,
        })
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn as_object<'a>(field: &str, value: &'a Value) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        RwcError::TypeMismatch(format!(
            "'{}' must be an object, found {}",
            field,
            type_name(value)
        ))
    })
}

/// Parses a `defaultReadConcern` value; `{}` means unset.
pub fn parse_read_concern(value: &Value) -> Result<ConcernUpdate<ReadConcern>> {
    let fields = as_object(READ_CONCERN_FIELD, value)?;
    if fields.is_empty() {
        return Ok(ConcernUpdate::Unset);
    }

    if let Some(unexpected) = fields.keys().find(|key| key.as_str() != "level") {
        return Err(RwcError::InvalidValue(format!(
            "'{}' must contain only a 'level' field, found '{}'",
            READ_CONCERN_FIELD, unexpected
        )));
    }

    let level = match fields.get("level") {
        Some(Value::String(level)) => level,
        Some(other) => {
            return Err(RwcError::TypeMismatch(format!(
                "read concern level must be a string, found {}",
                type_name(other)
            )));
        }
        None => return Ok(ConcernUpdate::Unset),
    };

    let level = ReadConcernLevel::parse(level).ok_or_else(|| {
        RwcError::ParseError(format!("'{}' is not a valid read concern level", level))
    })?;
    if !level.is_default_eligible() {
        return Err(RwcError::InvalidValue(format!(
            "'{}' is not suitable for the default read concern",
            level
        )));
    }

    Ok(ConcernUpdate::Set(ReadConcern::new(level)))
}

/// Parses a `defaultWriteConcern` value; `{}` means unset.
pub fn parse_write_concern(value: &Value) -> Result<ConcernUpdate<WriteConcern>> {
    let fields = as_object(WRITE_CONCERN_FIELD, value)?;
    if fields.is_empty() {
        return Ok(ConcernUpdate::Unset);
    }

    let mut write_concern = WriteConcern {
        w: None,
        j: None,
        wtimeout: None,
    };
    for (key, field) in fields {
        match key.as_str() {
            "w" => write_concern.w = Some(parse_acknowledgment(field)?),
            "j" => match field {
                Value::Bool(j) => write_concern.j = Some(*j),
                other => {
                    return Err(RwcError::TypeMismatch(format!(
                        "write concern 'j' must be a boolean, found {}",
                        type_name(other)
                    )));
                }
            },
            "wtimeout" => write_concern.wtimeout = Some(parse_wtimeout(field)?),
            unexpected => {
                return Err(RwcError::InvalidValue(format!(
                    "unrecognized write concern field '{}'",
                    unexpected
                )));
            }
        }
    }

    Ok(ConcernUpdate::Set(write_concern))
}

fn parse_acknowledgment(value: &Value) -> Result<WriteAcknowledgment> {
    match value {
        Value::Number(number) => {
            let nodes = integral(number).ok_or_else(|| {
                RwcError::InvalidValue(format!("w must be an integer, found {}", number))
            })?;
            if nodes < 1 {
                return Err(RwcError::InvalidValue(format!(
                    "w must be at least 1 for a default write concern, found {}",
                    nodes
                )));
            }
            if nodes > MAX_WRITE_CONCERN_NODES {
                return Err(RwcError::InvalidValue(format!(
                    "w cannot be greater than {}, found {}",
                    MAX_WRITE_CONCERN_NODES, nodes
                )));
            }
            Ok(WriteAcknowledgment::Nodes(nodes as u32))
        }
        Value::String(mode) if mode == "majority" => Ok(WriteAcknowledgment::Majority),
        Value::String(mode) => Err(RwcError::InvalidValue(format!(
            "unrecognized write concern mode '{}'",
            mode
        ))),
        other => Err(RwcError::TypeMismatch(format!(
            "w must be a number or the string 'majority', found {}",
            type_name(other)
        ))),
    }
}

fn parse_wtimeout(value: &Value) -> Result<u64> {
    let Value::Number(number) = value else {
        return Err(RwcError::TypeMismatch(format!(
            "wtimeout must be a number, found {}",
            type_name(value)
        )));
    };
    match integral(number) {
        Some(ms) if ms >= 0 => Ok(ms as u64),
        _ => Err(RwcError::InvalidValue(format!(
            "wtimeout must be a non-negative integer, found {}",
            number
        ))),
    }
}

fn integral(number: &serde_json::Number) -> Option<i64> {
    if let Some(n) = number.as_i64() {
        return Some(n);
    }
    number
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(request: SetDefaultsRequest) -> Result<NormalizedUpdate> {
        ValidationEngine::new().validate(&request, &ValidationContext::default())
    }

    #[test]
    fn test_requires_some_concern() {
        let err = validate(SetDefaultsRequest::new()).unwrap_err();
        assert!(matches!(err, RwcError::MissingArgument(_)));
    }

    #[test]
    fn test_non_object_concerns_are_type_mismatches() {
        let err = validate(SetDefaultsRequest::new().write_concern(json!(1))).unwrap_err();
        assert!(matches!(err, RwcError::TypeMismatch(_)));

        let err = validate(SetDefaultsRequest::new().read_concern(json!(1))).unwrap_err();
        assert!(matches!(err, RwcError::TypeMismatch(_)));
    }

    #[test]
    fn test_write_concern_w_bounds() {
        for bad in [json!({"w": 0}), json!({"w": -1}), json!({"w": 51})] {
            let err = validate(SetDefaultsRequest::new().write_concern(bad)).unwrap_err();
            assert!(matches!(err, RwcError::InvalidValue(_)), "{}", err);
        }

        let update = validate(SetDefaultsRequest::new().write_concern(json!({"w": 1, "j": false})))
            .unwrap();
        assert_eq!(
            update.write_concern,
            Some(ConcernUpdate::Set(WriteConcern::nodes(1).journal(false)))
        );
        assert_eq!(update.read_concern, None);

        let update =
            validate(SetDefaultsRequest::new().write_concern(json!({"w": "majority"}))).unwrap();
        assert_eq!(
            update.write_concern,
            Some(ConcernUpdate::Set(WriteConcern::majority()))
        );
    }

    #[test]
    fn test_write_concern_field_types() {
        let err = validate(SetDefaultsRequest::new().write_concern(json!({"w": true}))).unwrap_err();
        assert!(matches!(err, RwcError::TypeMismatch(_)));

        let err =
            validate(SetDefaultsRequest::new().write_concern(json!({"w": 1, "j": "yes"})))
                .unwrap_err();
        assert!(matches!(err, RwcError::TypeMismatch(_)));

        let err =
            validate(SetDefaultsRequest::new().write_concern(json!({"w": "dc-tag"}))).unwrap_err();
        assert!(matches!(err, RwcError::InvalidValue(_)));

        let err = validate(SetDefaultsRequest::new().write_concern(json!({"w": 1, "fsync": true})))
            .unwrap_err();
        assert!(matches!(err, RwcError::InvalidValue(_)));

        let update = validate(
            SetDefaultsRequest::new().write_concern(json!({"w": 2, "wtimeout": 5000})),
        )
        .unwrap();
        let Some(ConcernUpdate::Set(wc)) = update.write_concern else {
            panic!("expected a write concern");
        };
        assert_eq!(wc.wtimeout, Some(5000));
    }

    #[test]
    fn test_empty_write_concern_is_unset_until_guarded() {
        let request = SetDefaultsRequest::new().write_concern(json!({}));
        let engine = ValidationEngine::new();

        let update = engine
            .validate(
                &request,
                &ValidationContext {
                    explicit_write_concern_set: false,
                    require_majority: true,
                },
            )
            .unwrap();
        assert_eq!(update.write_concern, Some(ConcernUpdate::Unset));

        let update = engine
            .validate(
                &request,
                &ValidationContext {
                    explicit_write_concern_set: true,
                    require_majority: false,
                },
            )
            .unwrap();
        assert_eq!(update.write_concern, Some(ConcernUpdate::Unset));

        let err = engine
            .validate(
                &request,
                &ValidationContext {
                    explicit_write_concern_set: true,
                    require_majority: true,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RwcError::IllegalState(_)));
    }

    #[test]
    fn test_read_concern_levels() {
        let err = validate(SetDefaultsRequest::new().read_concern(json!({"level": "dummy"})))
            .unwrap_err();
        assert!(matches!(err, RwcError::ParseError(_)));

        for level in ["linearizable", "snapshot"] {
            let err = validate(SetDefaultsRequest::new().read_concern(json!({"level": level})))
                .unwrap_err();
            assert!(matches!(err, RwcError::InvalidValue(_)), "{}", level);
        }

        let update =
            validate(SetDefaultsRequest::new().read_concern(json!({"level": "available"})))
                .unwrap();
        assert_eq!(
            update.read_concern,
            Some(ConcernUpdate::Set(ReadConcern::new(ReadConcernLevel::Available)))
        );
    }

    #[test]
    fn test_read_concern_rejects_extra_fields() {
        for bad in [
            json!({"level": "local", "afterClusterTime": {"t": 50, "i": 1}}),
            json!({"level": "snapshot", "atClusterTime": {"t": 50, "i": 1}}),
            json!({"level": "local", "afterOpTime": {"ts": {"t": 50, "i": 1}, "t": 1}}),
        ] {
            let err = validate(SetDefaultsRequest::new().read_concern(bad)).unwrap_err();
            assert!(matches!(err, RwcError::InvalidValue(_)), "{}", err);
        }
    }

    #[test]
    fn test_empty_read_concern_is_always_unset() {
        let update = ValidationEngine::new()
            .validate(
                &SetDefaultsRequest::new().read_concern(json!({})),
                &ValidationContext {
                    explicit_write_concern_set: true,
                    require_majority: true,
                },
            )
            .unwrap();
        assert_eq!(update.read_concern, Some(ConcernUpdate::Unset));
    }

    #[test]
    fn test_custom_rule_chain() {
        let engine = ValidationEngine::with_rules(vec![Box::new(ReadConcernShapeRule)]);
        let update = engine
            .validate(&SetDefaultsRequest::new(), &ValidationContext::default())
            .unwrap();
        assert_eq!(update, NormalizedUpdate::default());
    }
}
