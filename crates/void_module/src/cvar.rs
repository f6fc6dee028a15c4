//! Console variables
//!
//! Typed, named settings registered by modules during the `init_cvar` pass
//! and overridden from the `[cvars]` table of the runtime config.

use std::fmt;

use void_core::id64;
use void_structures::IdMap;

use crate::api::check_name_hash;
use crate::error::{ModuleError, Result};

/// Value of a console variable
#[derive(Clone, Debug, PartialEq)]
pub enum CVarValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl CVarValue {
    /// Name of the variant, for messages
    pub fn kind(&self) -> &'static str {
        match self {
            CVarValue::Int(_) => "int",
            CVarValue::Float(_) => "float",
            CVarValue::Str(_) => "string",
            CVarValue::Bool(_) => "bool",
        }
    }

    /// Convert `value` to the kind of `self`, widening ints to floats
    fn coerce(&self, value: CVarValue) -> Option<CVarValue> {
        match (self, value) {
            (CVarValue::Float(_), CVarValue::Int(i)) => Some(CVarValue::Float(i as f64)),
            (current, value) if current.kind() == value.kind() => Some(value),
            _ => None,
        }
    }

    /// Convert a TOML value; arrays and tables have no cvar form
    pub fn from_toml(value: &toml::Value) -> Option<CVarValue> {
        match value {
            toml::Value::Integer(i) => Some(CVarValue::Int(*i)),
            toml::Value::Float(f) => Some(CVarValue::Float(*f)),
            toml::Value::String(s) => Some(CVarValue::Str(s.clone())),
            toml::Value::Boolean(b) => Some(CVarValue::Bool(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for CVarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CVarValue::Int(v) => write!(f, "{}", v),
            CVarValue::Float(v) => write!(f, "{}", v),
            CVarValue::Str(v) => write!(f, "{:?}", v),
            CVarValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for CVarValue {
    fn from(v: i64) -> Self {
        CVarValue::Int(v)
    }
}

impl From<f64> for CVarValue {
    fn from(v: f64) -> Self {
        CVarValue::Float(v)
    }
}

impl From<&str> for CVarValue {
    fn from(v: &str) -> Self {
        CVarValue::Str(v.into())
    }
}

impl From<bool> for CVarValue {
    fn from(v: bool) -> Self {
        CVarValue::Bool(v)
    }
}

/// A registered console variable
#[derive(Clone, Debug)]
pub struct CVar {
    name: String,
    description: String,
    default: CVarValue,
    value: CVarValue,
}

impl CVar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_value(&self) -> &CVarValue {
        &self.default
    }

    pub fn value(&self) -> &CVarValue {
        &self.value
    }
}

/// Registry of console variables keyed by hashed name
#[derive(Debug, Default)]
pub struct CVarRegistry {
    vars: Vec<CVar>,
    index: IdMap,
}

impl CVarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.index.get(id64(name)).map(|idx| idx as usize)
    }

    /// Register a variable
    ///
    /// Registering an existing name keeps its current value, so modules can
    /// re-register after a reload without losing overrides.
    pub fn register(&mut self, name: &str, default: impl Into<CVarValue>, description: &str) -> Result<()> {
        let default = default.into();
        if let Some(idx) = self.find(name) {
            let var = &self.vars[idx];
            if var.default.kind() != default.kind() {
                return Err(ModuleError::cvar(
                    name,
                    format!("already registered as {}", var.default.kind()),
                ));
            }
            return Ok(());
        }

        let hash = id64(name);
        check_name_hash(hash)?;
        self.index.insert(hash, self.vars.len() as u64)?;
        self.vars.push(CVar {
            name: name.into(),
            description: description.into(),
            value: default.clone(),
            default,
        });
        Ok(())
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&CVar> {
        self.find(name).map(|idx| &self.vars[idx])
    }

    /// Current value
    pub fn value(&self, name: &str) -> Option<&CVarValue> {
        self.get(name).map(CVar::value)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.value(name)? {
            CVarValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.value(name)? {
            CVarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.value(name)? {
            CVarValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.value(name)? {
            CVarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Set a registered variable, keeping its type
    pub fn set(&mut self, name: &str, value: impl Into<CVarValue>) -> Result<()> {
        let idx = self
            .find(name)
            .ok_or_else(|| ModuleError::cvar(name, "not registered"))?;
        let value = value.into();
        let var = &mut self.vars[idx];
        let kind = value.kind();
        var.value = var
            .default
            .coerce(value)
            .ok_or_else(|| ModuleError::cvar(name, format!("expected {}, got {}", var.default.kind(), kind)))?;
        Ok(())
    }

    /// Restore a variable to its default
    pub fn reset(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(idx) => {
                let var = &mut self.vars[idx];
                var.value = var.default.clone();
                true
            }
            None => false,
        }
    }

    /// Apply `name = value` overrides, returning how many were applied
    ///
    /// Unknown names and mismatched types are logged and skipped.
    pub fn apply_overrides(&mut self, overrides: &toml::Table) -> usize {
        let mut applied = 0;
        for (name, value) in overrides {
            let Some(value) = CVarValue::from_toml(value) else {
                log::warn!("Ignoring cvar override '{}': unsupported value", name);
                continue;
            };
            let shown = value.to_string();
            match self.set(name, value) {
                Ok(()) => {
                    log::debug!("CVar {} = {}", name, shown);
                    applied += 1;
                }
                Err(e) => log::warn!("Ignoring cvar override: {}", e),
            }
        }
        applied
    }

    /// All variables in registration order
    pub fn iter(&self) -> impl Iterator<Item = &CVar> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
