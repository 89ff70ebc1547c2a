//! Display and output helpers shared by commands. Text output goes
//! through the `print_*` helpers, JSON output through [`JsonOutput`].

use serde::Serialize;
use std::collections::BTreeMap;

/// Minutes as `1h 05m` or `12.5 min`
pub fn format_minutes(minutes: f64) -> String {
    if minutes >= 60.0 {
        let whole = minutes.round() as u64;
        format!("{}h {:02}m", whole / 60, whole % 60)
    } else if minutes >= 1.0 {
        format!("{:.1} min", minutes)
    } else {
        format!("{:.1} s", minutes * 60.0)
    }
}

pub fn print_success(message: &str) {
    println!("[OK] {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {}", message);
}

pub fn print_info(message: &str) {
    println!("[INFO] {}", message);
}

pub fn print_warning(message: &str) {
    println!("[WARN] {}", message);
}

pub fn print_separator(width: usize) {
    println!("{}", "=".repeat(width));
}

pub fn print_header(title: &str) {
    println!("\n=== {} ===", title);
}

/// JSON object builder for structured CLI output
#[derive(Debug, Clone, Default)]
pub struct JsonOutput {
    fields: BTreeMap<String, serde_json::Value>,
}

impl JsonOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_str(&mut self, key: &str, value: &str) -> &mut Self {
        self.fields
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self
    }

    pub fn add_uint(&mut self, key: &str, value: u64) -> &mut Self {
        self.fields
            .insert(key.to_string(), serde_json::Value::Number(value.into()));
        self
    }

    pub fn add_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.fields
            .insert(key.to_string(), serde_json::Value::Bool(value));
        self
    }

    pub fn add_string_array(&mut self, key: &str, values: &[String]) -> &mut Self {
        let array = values
            .iter()
            .map(|s| serde_json::Value::String(s.clone()))
            .collect();
        self.fields
            .insert(key.to_string(), serde_json::Value::Array(array));
        self
    }

    /// Embed any serializable value; unserializable values become `null`
    pub fn add_value<T: Serialize>(&mut self, key: &str, value: &T) -> &mut Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Set the status field common to all responses
    pub fn status(&mut self, success: bool) -> &mut Self {
        self.add_str("status", if success { "success" } else { "error" })
    }

    pub fn error(&mut self, message: &str) -> &mut Self {
        self.add_str("status", "error");
        self.add_str("error", message)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn print(&self) {
        println!("{}", self.to_json());
    }
}

pub fn json_error(message: &str) -> JsonOutput {
    let mut output = JsonOutput::new();
    output.error(message);
    output
}
