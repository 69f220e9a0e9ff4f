//! Forwarded Data
//!
//! Tasks hand results to downstream tasks through declared fields. Writing
//! a field that was not declared is an error.

use crate::error::TaskError;
use crate::Task;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A field a task promises to forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardDecl {
    pub name: String,
    /// Description shown to downstream consumers
    pub help: String,
}

impl ForwardDecl {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
        }
    }
}

/// Forwarded payload of one task invocation
#[derive(Debug, Clone, Default)]
pub struct ForwardChannel {
    declared: Vec<ForwardDecl>,
    payload: BTreeMap<String, Value>,
}

impl ForwardChannel {
    pub fn new(declared: Vec<ForwardDecl>) -> Self {
        Self {
            declared,
            payload: BTreeMap::new(),
        }
    }

    /// Channel accepting the fields a task declares
    pub fn for_task(task: &dyn Task) -> Self {
        Self::new(task.forwards())
    }

    pub fn declared(&self) -> &[ForwardDecl] {
        &self.declared
    }

    /// Store a declared field
    pub fn forward(&mut self, name: &str, value: impl Into<Value>) -> Result<(), TaskError> {
        if !self.declared.iter().any(|d| d.name == name) {
            return Err(TaskError::Forward(name.to_string()));
        }
        self.payload.insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// String value of a field
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn payload(&self) -> &BTreeMap<String, Value> {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.payload.clone().into_iter().collect())
    }

    /// Payload as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.payload)
    }
}
