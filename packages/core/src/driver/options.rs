//! Driver option bag and create flags
//!
//! Drivers publish the flags they understand; the caller seeds an
//! [`OptionBag`] from those flags (defaults, then environment, then explicit
//! `key=value` overrides) and hands it to `Driver::set_config_from_flags`.

use std::collections::{HashMap, HashSet};

use super::error::DriverError;

/// Read access to backend-specific options
///
/// Missing keys read as the zero value of the requested type.
pub trait DriverOptions: Send + Sync {
    fn string(&self, key: &str) -> String;
    fn int(&self, key: &str) -> i64;
    fn bool(&self, key: &str) -> bool;
    fn string_slice(&self, key: &str) -> Vec<String>;
}

/// Typed option value
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    String(String),
    Int(i64),
    Bool(bool),
    StringSlice(Vec<String>),
}

impl FlagValue {
    /// Parse `raw` into a value of the same kind as `self`
    pub fn parse_like(&self, raw: &str) -> Result<FlagValue, String> {
        match self {
            FlagValue::String(_) => Ok(FlagValue::String(raw.to_string())),
            FlagValue::Int(_) => raw
                .trim()
                .parse::<i64>()
                .map(FlagValue::Int)
                .map_err(|_| format!("expected an integer, got {raw:?}")),
            FlagValue::Bool(_) => match raw.trim().to_lowercase().as_str() {
                "" | "1" | "true" | "yes" => Ok(FlagValue::Bool(true)),
                "0" | "false" | "no" => Ok(FlagValue::Bool(false)),
                _ => Err(format!("expected true or false, got {raw:?}")),
            },
            FlagValue::StringSlice(_) => Ok(FlagValue::StringSlice(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
        }
    }

    /// Short type label for help output
    pub fn kind(&self) -> &'static str {
        match self {
            FlagValue::String(_) => "string",
            FlagValue::Int(_) => "int",
            FlagValue::Bool(_) => "bool",
            FlagValue::StringSlice(_) => "list",
        }
    }
}

impl std::fmt::Display for FlagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagValue::String(s) => write!(f, "{s}"),
            FlagValue::Int(i) => write!(f, "{i}"),
            FlagValue::Bool(b) => write!(f, "{b}"),
            FlagValue::StringSlice(v) => write!(f, "{}", v.join(",")),
        }
    }
}

/// A create flag published by a driver
#[derive(Debug, Clone, PartialEq)]
pub struct FlagSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub default: FlagValue,
    pub env_var: Option<&'static str>,
}

impl FlagSpec {
    pub fn string(name: &'static str, usage: &'static str, default: &str) -> Self {
        Self {
            name,
            usage,
            default: FlagValue::String(default.to_string()),
            env_var: None,
        }
    }

    pub fn int(name: &'static str, usage: &'static str, default: i64) -> Self {
        Self {
            name,
            usage,
            default: FlagValue::Int(default),
            env_var: None,
        }
    }

    pub fn bool(name: &'static str, usage: &'static str) -> Self {
        Self {
            name,
            usage,
            default: FlagValue::Bool(false),
            env_var: None,
        }
    }

    pub fn string_slice(name: &'static str, usage: &'static str) -> Self {
        Self {
            name,
            usage,
            default: FlagValue::StringSlice(Vec::new()),
            env_var: None,
        }
    }

    /// Builder pattern: read the value from an environment variable when set
    pub fn with_env(mut self, env_var: &'static str) -> Self {
        self.env_var = Some(env_var);
        self
    }
}

/// Map-backed [`DriverOptions`]
#[derive(Debug, Clone, Default)]
pub struct OptionBag {
    values: HashMap<String, FlagValue>,
    overridden: HashSet<String>,
}

impl OptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from flag defaults, overridden by the process environment
    pub fn from_flags(flags: &[FlagSpec]) -> Result<Self, DriverError> {
        Self::from_flags_with_env(flags, |key| std::env::var(key).ok())
    }

    /// Seed from flag defaults, overridden by `env`
    pub fn from_flags_with_env(
        flags: &[FlagSpec],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DriverError> {
        let mut bag = Self::new();
        for flag in flags {
            let value = match flag.env_var.and_then(&env) {
                Some(raw) => flag
                    .default
                    .parse_like(&raw)
                    .map_err(|message| DriverError::InvalidOption {
                        option: flag.name.to_string(),
                        message,
                    })?,
                None => flag.default.clone(),
            };
            bag.values.insert(flag.name.to_string(), value);
        }
        Ok(bag)
    }

    pub fn set(&mut self, key: impl Into<String>, value: FlagValue) {
        self.values.insert(key.into(), value);
    }

    /// Apply an explicit `key=value` override
    ///
    /// The value is parsed according to the matching flag's type. Repeated
    /// list overrides accumulate; the first one replaces the default.
    pub fn apply_override(
        &mut self,
        flags: &[FlagSpec],
        key: &str,
        raw: &str,
    ) -> Result<(), DriverError> {
        let flag = flags
            .iter()
            .find(|f| f.name == key)
            .ok_or_else(|| DriverError::InvalidOption {
                option: key.to_string(),
                message: "unknown option for this driver".to_string(),
            })?;

        let parsed = flag
            .default
            .parse_like(raw)
            .map_err(|message| DriverError::InvalidOption {
                option: key.to_string(),
                message,
            })?;

        let first = self.overridden.insert(key.to_string());

        if !first {
            if let (Some(FlagValue::StringSlice(existing)), FlagValue::StringSlice(items)) =
                (self.values.get_mut(key), &parsed)
            {
                existing.extend(items.iter().cloned());
                return Ok(());
            }
        }
        self.values.insert(key.to_string(), parsed);
        Ok(())
    }
}

impl DriverOptions for OptionBag {
    fn string(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(FlagValue::String(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(FlagValue::Int(i)) => *i,
            _ => 0,
        }
    }

    fn bool(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(FlagValue::Bool(true)))
    }

    fn string_slice(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(FlagValue::StringSlice(v)) => v.clone(),
            _ => Vec::new(),
        }
    }
}
