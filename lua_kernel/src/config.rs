//! Node attributes and the immutable per-kernel configuration read from them.

use std::collections::BTreeMap;

use crate::error::{KernelError, KernelResult};

/// Name of the attribute holding the Lua source.
pub const CODE_ATTRIBUTE: &str = "code";

/// Name of the optional attribute bounding script execution.
pub const STEP_LIMIT_ATTRIBUTE: &str = "step_limit";

/// A single node attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
}

impl AttributeValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

/// Attributes attached to an operator node, as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelInfo {
    attributes: BTreeMap<String, AttributeValue>,
}

impl KernelInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Read a required string attribute.
    pub fn string(&self, name: &str) -> KernelResult<&str> {
        match self.attribute(name) {
            Some(AttributeValue::String(s)) => Ok(s),
            Some(other) => Err(mistyped(name, "string", other)),
            None => Err(KernelError::Attribute {
                name: name.to_string(),
                detail: "missing".to_string(),
            }),
        }
    }

    /// Read an optional integer attribute.
    pub fn int(&self, name: &str) -> KernelResult<Option<i64>> {
        match self.attribute(name) {
            Some(AttributeValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(mistyped(name, "int", other)),
            None => Ok(None),
        }
    }
}

fn mistyped(name: &str, expected: &str, found: &AttributeValue) -> KernelError {
    KernelError::Attribute {
        name: name.to_string(),
        detail: format!("expected {expected}, found {}", found.type_name()),
    }
}

/// Configuration a kernel holds for its whole lifetime.
///
/// The source is kept as text and evaluated fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    code: String,
    step_limit: Option<u64>,
}

impl KernelConfig {
    pub fn new(code: impl Into<String>) -> Self {
        KernelConfig {
            code: code.into(),
            step_limit: None,
        }
    }

    /// Abort scripts after roughly `limit` VM instructions.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    /// Read `code` and the optional `step_limit` from node attributes.
    pub fn from_info(info: &KernelInfo) -> KernelResult<Self> {
        let mut config = KernelConfig::new(info.string(CODE_ATTRIBUTE)?);
        if let Some(limit) = info.int(STEP_LIMIT_ATTRIBUTE)? {
            let limit = u64::try_from(limit)
                .ok()
                .filter(|&l| l > 0)
                .ok_or_else(|| KernelError::Attribute {
                    name: STEP_LIMIT_ATTRIBUTE.to_string(),
                    detail: format!("must be positive, got {limit}"),
                })?;
            config = config.with_step_limit(limit);
        }
        Ok(config)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn step_limit(&self) -> Option<u64> {
        self.step_limit
    }
}
