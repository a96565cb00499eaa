//! Configuration access for services, monitors and the table executor

use crate::error::{LvsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// One named configuration section, e.g. the options of a single LVS service.
///
/// Values keep their JSON type so that type mismatches (a number where a
/// string is required) are reported instead of coerced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSection {
    name: String,
    values: HashMap<String, Value>,
}

impl ConfigSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    pub fn from_map(name: impl Into<String>, values: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Load a section from a JSON file holding an object of sections
    pub fn from_file(path: impl AsRef<Path>, section: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut sections: HashMap<String, HashMap<String, Value>> =
            serde_json::from_str(&content).map_err(|e| LvsError::format(e.to_string()))?;

        let values = sections
            .remove(section)
            .ok_or_else(|| LvsError::MissingOption(format!("section {}", section)))?;

        tracing::debug!(
            path = %path.as_ref().display(),
            section,
            options = values.len(),
            "Loaded configuration section"
        );
        Ok(Self::from_map(section, values))
    }

    /// Builder-style setter, mostly for tests and programmatic setup
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_bool(&self, key: &str, default: Option<bool>) -> Result<bool> {
        match self.values.get(key) {
            None => default.ok_or_else(|| LvsError::MissingOption(key.to_string())),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(LvsError::format(format!("Value of {} is not a boolean", key))),
            },
            Some(Value::String(s)) => parse_bool(s)
                .ok_or_else(|| LvsError::format(format!("Value of {} is not a boolean", key))),
            Some(_) => Err(LvsError::format(format!("Value of {} is not a boolean", key))),
        }
    }

    pub fn get_int(&self, key: &str, default: Option<i64>) -> Result<i64> {
        match self.values.get(key) {
            None => default.ok_or_else(|| LvsError::MissingOption(key.to_string())),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| LvsError::format(format!("Value of {} is not an integer", key))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| LvsError::format(format!("Value of {} is not an integer", key))),
            Some(_) => Err(LvsError::format(format!("Value of {} is not an integer", key))),
        }
    }

    /// Like [`get_int`](Self::get_int) but absence is not an error
    pub fn get_opt_int(&self, key: &str) -> Result<Option<i64>> {
        if self.contains(key) {
            self.get_int(key, None).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn get_float(&self, key: &str, default: Option<f64>) -> Result<f64> {
        match self.values.get(key) {
            None => default.ok_or_else(|| LvsError::MissingOption(key.to_string())),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| LvsError::format(format!("Value of {} is not a number", key))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| LvsError::format(format!("Value of {} is not a number", key))),
            Some(_) => Err(LvsError::format(format!("Value of {} is not a number", key))),
        }
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        match self.values.get(key) {
            None => Err(LvsError::MissingOption(key.to_string())),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(LvsError::format(format!("Value of {} is not a string", key))),
        }
    }

    /// A single string or a non-empty list of strings, always returned as a list
    pub fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.values.get(key) {
            None => Err(LvsError::MissingOption(key.to_string())),
            Some(Value::String(s)) => parse_string_list(s),
            Some(Value::Array(items)) => {
                let list = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| not_a_string_list(key))?;
                if list.is_empty() {
                    return Err(not_a_string_list(key));
                }
                Ok(list)
            }
            Some(_) => Err(not_a_string_list(key)),
        }
    }

    /// Like [`get_string_list`](Self::get_string_list), but an absent key or
    /// an explicitly empty list (`[]`) gives an empty list
    pub fn get_optional_string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.values.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) if items.is_empty() => Ok(Vec::new()),
            Some(Value::String(s)) if is_empty_list(s) => Ok(Vec::new()),
            Some(_) => self.get_string_list(key),
        }
    }

    /// Scope this section to the options of one monitor
    pub fn monitor(&self, monitor_name: &str) -> MonitorConfig<'_> {
        MonitorConfig {
            section: self,
            prefix: monitor_name.to_lowercase(),
        }
    }
}

fn not_a_string_list(key: &str) -> LvsError {
    LvsError::format(format!("Value of {} is not a string or stringlist", key))
}

fn is_empty_list(text: &str) -> bool {
    text.trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map_or(false, |inner| inner.trim().is_empty())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a list-valued option without evaluating it.
///
/// Accepted forms, tried in order:
/// - `["a", 'b']` a bracketed list of quoted strings (trailing comma allowed)
/// - `"a"` or `'a', "b"` quoted strings without brackets
/// - `a` a bare single string
pub fn parse_string_list(text: &str) -> Result<Vec<String>> {
    let trimmed = text.trim();

    let items = if let Some(inner) = trimmed.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| LvsError::format(format!("unterminated list: {}", trimmed)))?;
        parse_quoted_items(inner)?
    } else if trimmed.starts_with('"') || trimmed.starts_with('\'') {
        parse_quoted_items(trimmed)?
    } else if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    };

    if items.is_empty() {
        return Err(LvsError::format(format!("empty string list: {}", text)));
    }
    Ok(items)
}

fn parse_quoted_items(text: &str) -> Result<Vec<String>> {
    let mut items = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        let quote = match chars.next() {
            None => break,
            Some(q @ ('"' | '\'')) => q,
            Some(other) => {
                return Err(LvsError::format(format!(
                    "list member starting with {:?} is not a quoted string",
                    other
                )))
            }
        };

        let mut item = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => item.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    closed = true;
                    break;
                }
                c => item.push(c),
            }
        }
        if !closed {
            return Err(LvsError::format(format!("unterminated string in {}", text)));
        }
        items.push(item);

        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(other) => {
                return Err(LvsError::format(format!(
                    "unexpected {:?} after list member",
                    other
                )))
            }
        }
    }

    Ok(items)
}

/// Options of one monitor, looked up as `"<monitor>.<option>"`
#[derive(Debug, Clone)]
pub struct MonitorConfig<'a> {
    section: &'a ConfigSection,
    prefix: String,
}

impl<'a> MonitorConfig<'a> {
    fn key(&self, option: &str) -> String {
        format!("{}.{}", self.prefix, option)
    }

    pub fn get_bool(&self, option: &str, default: Option<bool>) -> Result<bool> {
        self.section.get_bool(&self.key(option), default)
    }

    pub fn get_int(&self, option: &str, default: Option<i64>) -> Result<i64> {
        self.section.get_int(&self.key(option), default)
    }

    pub fn get_float(&self, option: &str, default: Option<f64>) -> Result<f64> {
        self.section.get_float(&self.key(option), default)
    }

    pub fn get_string(&self, option: &str) -> Result<String> {
        self.section.get_string(&self.key(option))
    }

    pub fn get_string_list(&self, option: &str) -> Result<Vec<String>> {
        self.section.get_string_list(&self.key(option))
    }

    pub fn get_optional_string_list(&self, option: &str) -> Result<Vec<String>> {
        self.section.get_optional_string_list(&self.key(option))
    }
}

/// Process-wide switches of the forwarding-table executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub ipvsadm_path: String,
    pub dry_run: bool,
    pub debug: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            ipvsadm_path: "/sbin/ipvsadm".to_string(),
            dry_run: true,
            debug: false,
        }
    }
}

impl ExecutorConfig {
    pub fn from_section(section: &ConfigSection) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            ipvsadm_path: match section.get_string("ipvsadm") {
                Ok(path) => path,
                Err(LvsError::MissingOption(_)) => defaults.ipvsadm_path,
                Err(e) => return Err(e),
            },
            dry_run: section.get_bool("dryrun", Some(false))?,
            debug: section.get_bool("debug", Some(false))?,
        })
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            ipvsadm_path: env::var("IPVSADM_PATH").unwrap_or(defaults.ipvsadm_path),
            dry_run: match env::var("LVS_DRYRUN") {
                Ok(v) => parse_bool(&v)
                    .ok_or_else(|| LvsError::format(format!("Invalid LVS_DRYRUN: {}", v)))?,
                Err(_) => defaults.dry_run,
            },
            debug: match env::var("LVS_DEBUG") {
                Ok(v) => parse_bool(&v)
                    .ok_or_else(|| LvsError::format(format!("Invalid LVS_DEBUG: {}", v)))?,
                Err(_) => defaults.debug,
            },
        })
    }
}
