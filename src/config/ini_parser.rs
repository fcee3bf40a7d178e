//! Simple INI file parser with zero dependencies
//! Supports sections, key-value pairs, comments, quoted values and size suffixes

use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct IniConfig {
    sections: HashMap<String, HashMap<String, String>>,
    global: HashMap<String, String>,
}

impl IniConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {e}"))?;
        Self::parse(&content)
    }

    /// Parse INI content from string
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut config = Self::new();
        let mut current_section = String::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            let line_number = line_num + 1;

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let Some(name) = header.strip_suffix(']') else {
                    return Err(format!("Unterminated section at line {line_number}: {line}"));
                };
                let name = name.trim();
                if name.is_empty() {
                    return Err(format!("Empty section name at line {line_number}"));
                }
                current_section = name.to_lowercase();
                config.sections.entry(current_section.clone()).or_default();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("Invalid syntax at line {line_number}: {line}"));
            };
            let key = key.trim().to_lowercase();
            if key.is_empty() {
                return Err(format!("Empty key at line {line_number}: {line}"));
            }
            let value = clean_value(value);

            if current_section.is_empty() {
                config.global.insert(key, value);
            } else {
                config
                    .sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(key, value);
            }
        }

        Ok(config)
    }

    /// Get string value; an empty section name reads the global keys
    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        if section.is_empty() {
            self.global.get(key).cloned()
        } else {
            self.sections.get(section)?.get(key).cloned()
        }
    }

    pub fn get_usize(&self, section: &str, key: &str) -> Option<usize> {
        self.get_string(section, key)?.parse().ok()
    }

    /// Get boolean value
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get_string(section, key)?.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }

    pub fn get_bool_or(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_bool(section, key).unwrap_or(default)
    }

    /// Get comma-separated list
    pub fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get_string(section, key)
            .map(|s| {
                s.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse a byte size (supports KB, MB, GB, TB suffixes)
    pub fn get_file_size(&self, section: &str, key: &str) -> Option<u64> {
        let value = self.get_string(section, key)?;
        parse_file_size(&value)
    }
}

/// Strip an inline comment, or the quotes around a quoted value
fn clean_value(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('"') {
        if let Some(end) = inner.find('"') {
            return inner[..end].to_string();
        }
    }

    let end = raw.find(['#', ';']).unwrap_or(raw.len());
    raw[..end].trim().to_string()
}

/// Helper function to parse sizes like "10GB", "500MB", etc.
fn parse_file_size(value: &str) -> Option<u64> {
    let value = value.trim().to_uppercase();

    if let Ok(num) = value.parse::<u64>() {
        return Some(num);
    }

    let (num_part, multiplier) = [
        ("TB", 1024u64 * 1024 * 1024 * 1024),
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("B", 1),
    ]
    .into_iter()
    .find_map(|(suffix, multiplier)| Some((value.strip_suffix(suffix)?, multiplier)))?;

    let num_str = num_part.trim();

    if let Ok(num) = num_str.parse::<u64>() {
        return num.checked_mul(multiplier);
    }

    // Decimal values like "1.5"
    if let Ok(num) = num_str.parse::<f64>() {
        if num >= 0.0 {
            return Some((num * multiplier as f64) as u64);
        }
    }

    None
}
