//! Module declarations from configuration entries.

use std::path::Path;

use calc_bridge_common::{BridgeError, ModuleEntry};
use calc_bridge_core::{ModuleDeclaration, ModuleSource, Weight};

/// Read the module files named by `entries`.
///
/// Relative paths resolve against `base_dir`. Module source is read once,
/// here; unlike packages it is not expected to appear later.
///
/// # Errors
///
/// Returns an error if a file cannot be read or a weight is not recognized.
pub fn module_declarations(
    entries: &[ModuleEntry],
    base_dir: &Path,
) -> Result<Vec<ModuleDeclaration>, BridgeError> {
    entries
        .iter()
        .map(|entry| module_declaration(entry, base_dir))
        .collect()
}

fn module_declaration(entry: &ModuleEntry, base_dir: &Path) -> Result<ModuleDeclaration, BridgeError> {
    let path = base_dir.join(&entry.path);
    let bytes = std::fs::read(&path).map_err(|e| {
        BridgeError::invalid_config(format!(
            "module '{}': cannot read {}: {e}",
            entry.id,
            path.display()
        ))
    })?;
    let source = ModuleSource::from_file_bytes(&entry.path, bytes)?;

    let weight = entry
        .weight
        .as_deref()
        .map(str::parse::<Weight>)
        .transpose()?
        .unwrap_or_default();

    Ok(ModuleDeclaration::new(&entry.id, source)
        .with_packages(entry.packages.iter().cloned())
        .with_weight(weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, weight: Option<&str>) -> ModuleEntry {
        ModuleEntry {
            id: "regression".into(),
            path: path.into(),
            packages: vec!["linalg-lib".into()],
            weight: weight.map(String::from),
        }
    }

    #[test]
    fn test_reads_module_file() {
        let dir = std::env::temp_dir().join(format!("calc-bridge-decl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("regression.wat"), "(module)").unwrap();

        let declarations =
            module_declarations(&[entry("regression.wat", Some("heavy"))], &dir).unwrap();

        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].id, "regression");
        assert_eq!(declarations[0].required_packages, vec!["linalg-lib"]);
        assert_eq!(declarations[0].weight, Weight::Heavy);
        assert_eq!(declarations[0].source, ModuleSource::Wat("(module)".into()));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = module_declarations(&[entry("missing.wat", None)], Path::new("/nonexistent"))
            .unwrap_err();

        assert!(matches!(err, BridgeError::InvalidConfig { .. }));
        assert!(err.to_string().contains("regression"));
    }

    #[test]
    fn test_bad_weight() {
        let dir = std::env::temp_dir().join(format!("calc-bridge-weight-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("regression.wat"), "(module)").unwrap();

        let err = module_declarations(&[entry("regression.wat", Some("huge"))], &dir).unwrap_err();

        assert!(err.to_string().contains("huge"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
