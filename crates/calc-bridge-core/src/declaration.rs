//! Module declarations: the rows of the dependency table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use calc_bridge_common::BridgeError;

/// Source of a module or package, as handed to the embedded runtime.
#[derive(Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// WebAssembly text format.
    Wat(String),
    /// WebAssembly binary.
    Binary(Vec<u8>),
}

impl ModuleSource {
    /// Size of the source payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Wat(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes of the payload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Wat(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Pick the source kind from a file name: `.wat` is text, anything else binary.
    pub fn from_file_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Self, BridgeError> {
        if file_name.ends_with(".wat") {
            String::from_utf8(bytes).map(Self::Wat).map_err(|e| {
                BridgeError::compilation_failed(format!("{file_name} is not valid UTF-8: {e}"))
            })
        } else {
            Ok(Self::Binary(bytes))
        }
    }
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wat(text) => write!(f, "Wat({} bytes)", text.len()),
            Self::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

/// Weight class of a module.
///
/// Informational only: it is logged and reported, but no scheduling decision
/// depends on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weight {
    #[default]
    Light,
    Heavy,
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weight::Light => write!(f, "light"),
            Weight::Heavy => write!(f, "heavy"),
        }
    }
}

impl FromStr for Weight {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Weight::Light),
            "heavy" => Ok(Weight::Heavy),
            other => Err(BridgeError::invalid_config(format!(
                "unknown module weight '{other}' (expected 'light' or 'heavy')"
            ))),
        }
    }
}

/// A module as declared in the dependency table.
#[derive(Debug, Clone)]
pub struct ModuleDeclaration {
    /// Unique module identifier.
    pub id: String,
    /// Packages that must be loaded before the source executes, in load order.
    pub required_packages: Vec<String>,
    /// Weight class.
    pub weight: Weight,
    /// Module source.
    pub source: ModuleSource,
}

impl ModuleDeclaration {
    /// Create a declaration with no package dependencies.
    pub fn new(id: impl Into<String>, source: ModuleSource) -> Self {
        Self {
            id: id.into(),
            required_packages: Vec::new(),
            weight: Weight::Light,
            source,
        }
    }

    /// Set the required packages.
    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Set the weight class.
    pub fn with_weight(mut self, weight: Weight) -> Self {
        self.weight = weight;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_parse() {
        assert_eq!("light".parse::<Weight>().unwrap(), Weight::Light);
        assert_eq!("Heavy".parse::<Weight>().unwrap(), Weight::Heavy);
        assert!("medium".parse::<Weight>().is_err());
    }

    #[test]
    fn test_source_from_file_bytes() {
        let wat = ModuleSource::from_file_bytes("m.wat", b"(module)".to_vec()).unwrap();
        assert!(matches!(wat, ModuleSource::Wat(ref s) if s == "(module)"));

        let bin = ModuleSource::from_file_bytes("m.wasm", vec![0, 97, 115, 109]).unwrap();
        assert!(matches!(bin, ModuleSource::Binary(_)));
        assert_eq!(bin.len(), 4);

        assert!(ModuleSource::from_file_bytes("m.wat", vec![0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_source_debug_hides_payload() {
        let source = ModuleSource::Wat("(module (func))".into());
        assert_eq!(format!("{source:?}"), "Wat(15 bytes)");
    }

    #[test]
    fn test_declaration_builder() {
        let decl = ModuleDeclaration::new("heavy-stats", ModuleSource::Wat("(module)".into()))
            .with_packages(["scientific-lib", "ml-lib"])
            .with_weight(Weight::Heavy);

        assert_eq!(decl.required_packages, vec!["scientific-lib", "ml-lib"]);
        assert_eq!(decl.weight, Weight::Heavy);
    }
}
