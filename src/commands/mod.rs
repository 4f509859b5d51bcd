//! Logical command documents for the registry
//!
//! Parses `getDefaultRWConcern` / `setDefaultRWConcern` documents, runs them
//! against a [`RegistryService`] and renders the reply document.

use crate::core::{Result, RwcError};
use crate::registry::RegistryService;
use crate::validation::SetDefaultsRequest;
use log::debug;
use serde_json::{Map, Value, json};

pub const GET_DEFAULTS_COMMAND: &str = "getDefaultRWConcern";
pub const SET_DEFAULTS_COMMAND: &str = "setDefaultRWConcern";

// Fields every command may carry that the registry does not interpret.
const GENERIC_FIELDS: [&str; 4] = ["comment", "writeConcern", "maxTimeMS", "lsid"];

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCommand {
    GetDefaults { in_memory: bool },
    SetDefaults(SetDefaultsRequest),
}

impl RegistryCommand {
    /// Parse a command document such as `{"getDefaultRWConcern": 1, "inMemory": true}`.
    pub fn parse(document: &Value) -> Result<Self> {
        let fields = document.as_object().ok_or_else(|| {
            RwcError::TypeMismatch("command document must be an object".to_string())
        })?;

        let has_get = fields.contains_key(GET_DEFAULTS_COMMAND);
        let has_set = fields.contains_key(SET_DEFAULTS_COMMAND);
        match (has_get, has_set) {
            (true, true) => Err(RwcError::InvalidValue(format!(
                "'{}' and '{}' cannot be combined",
                GET_DEFAULTS_COMMAND, SET_DEFAULTS_COMMAND
            ))),
            (true, false) => Self::parse_get(fields),
            (false, true) => Self::parse_set(fields),
            (false, false) => Err(RwcError::CommandNotFound(
                fields
                    .keys()
                    .find(|key| !is_generic_field(key))
                    .cloned()
                    .unwrap_or_default(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetDefaults { .. } => GET_DEFAULTS_COMMAND,
            Self::SetDefaults(_) => SET_DEFAULTS_COMMAND,
        }
    }

    fn parse_get(fields: &Map<String, Value>) -> Result<Self> {
        let mut in_memory = false;
        for (key, value) in fields {
            match key.as_str() {
                GET_DEFAULTS_COMMAND => {}
                "inMemory" => {
                    in_memory = value.as_bool().ok_or_else(|| {
                        RwcError::TypeMismatch(format!(
                            "'inMemory' must be a boolean, found {}",
                            value
                        ))
                    })?;
                }
                other => reject_unknown_field(GET_DEFAULTS_COMMAND, other)?,
            }
        }
        Ok(Self::GetDefaults { in_memory })
    }

    fn parse_set(fields: &Map<String, Value>) -> Result<Self> {
        let mut request = SetDefaultsRequest::new();
        for (key, value) in fields {
            match key.as_str() {
                SET_DEFAULTS_COMMAND => {}
                "defaultReadConcern" => request.default_read_concern = Some(value.clone()),
                "defaultWriteConcern" => request.default_write_concern = Some(value.clone()),
                other => reject_unknown_field(SET_DEFAULTS_COMMAND, other)?,
            }
        }
        Ok(Self::SetDefaults(request))
    }
}

fn is_generic_field(key: &str) -> bool {
    key.starts_with('$') || GENERIC_FIELDS.contains(&key)
}

fn reject_unknown_field(command: &str, field: &str) -> Result<()> {
    if is_generic_field(field) {
        return Ok(());
    }
    Err(RwcError::InvalidValue(format!(
        "'{}' is an unknown field of '{}'",
        field, command
    )))
}

/// Run a parsed command, returning the reply fields without the `ok` marker.
pub async fn execute(service: &RegistryService, command: RegistryCommand) -> Result<Value> {
    let view = match command {
        RegistryCommand::GetDefaults { in_memory } => service.get_defaults(!in_memory).await?,
        RegistryCommand::SetDefaults(request) => service.set_defaults(request).await?,
    };
    Ok(view.to_json())
}

/// Run a command document and always produce a reply document.
pub async fn run_command(service: &RegistryService, document: &Value) -> Value {
    debug!("Registry command on '{}': {}", service.node_id(), document);
    let outcome = match RegistryCommand::parse(document) {
        Ok(command) => execute(service, command).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(reply) => ok_response(reply),
        Err(err) => {
            debug!("Registry command failed on '{}': {}", service.node_id(), err);
            error_response(&err)
        }
    }
}

pub fn ok_response(reply: Value) -> Value {
    let mut fields = match reply {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    fields.insert("ok".to_string(), json!(1));
    Value::Object(fields)
}

pub fn error_response(err: &RwcError) -> Value {
    json!({
        "ok": 0,
        "code": err.code(),
        "codeName": err.code_name(),
        "errmsg": err.to_string(),
    })
}
