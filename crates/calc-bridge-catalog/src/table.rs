//! The dependency table and bundled package sources.

use calc_bridge_core::{ModuleDeclaration, ModuleSource, Weight};
use calc_bridge_host::StaticPackageSource;

/// One row of the dependency table.
#[derive(Debug, Clone, Copy)]
pub struct TableEntry {
    /// Module id.
    pub id: &'static str,
    /// Packages the module imports from, in load order.
    pub packages: &'static [&'static str],
    /// Weight class.
    pub weight: Weight,
    /// Module source (WAT).
    pub source: &'static str,
}

/// Modules shipped with the bridge.
pub static DEPENDENCY_TABLE: &[TableEntry] = &[
    TableEntry {
        id: "descriptive",
        packages: &[],
        weight: Weight::Light,
        source: include_str!("../wat/modules/descriptive.wat"),
    },
    TableEntry {
        id: "heavy-stats",
        packages: &["scientific-lib", "ml-lib"],
        weight: Weight::Heavy,
        source: include_str!("../wat/modules/heavy-stats.wat"),
    },
];

/// Packages shipped with the bridge, as `(name, source)`.
pub static BUNDLED_PACKAGES: &[(&str, &str)] = &[
    (
        "scientific-lib",
        include_str!("../wat/packages/scientific-lib.wat"),
    ),
    ("ml-lib", include_str!("../wat/packages/ml-lib.wat")),
];

impl TableEntry {
    /// The declaration handed to the module loader.
    pub fn declaration(&self) -> ModuleDeclaration {
        ModuleDeclaration::new(self.id, ModuleSource::Wat(self.source.to_string()))
            .with_packages(self.packages.iter().copied())
            .with_weight(self.weight)
    }
}

/// Declarations for every bundled module.
pub fn bundled_declarations() -> Vec<ModuleDeclaration> {
    DEPENDENCY_TABLE.iter().map(TableEntry::declaration).collect()
}

/// A package source serving every bundled package.
pub fn bundled_packages() -> StaticPackageSource {
    BUNDLED_PACKAGES
        .iter()
        .fold(StaticPackageSource::new(), |source, (name, wat)| {
            source.with(*name, ModuleSource::Wat((*wat).to_string()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<&str> = DEPENDENCY_TABLE.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), DEPENDENCY_TABLE.len());
    }

    #[test]
    fn test_every_package_is_bundled() {
        let bundled = bundled_packages();

        for entry in DEPENDENCY_TABLE {
            for package in entry.packages {
                assert!(
                    bundled.names().contains(package),
                    "{} needs unbundled package {package}",
                    entry.id
                );
            }
        }
    }

    #[test]
    fn test_heavy_stats_row() {
        let declaration = DEPENDENCY_TABLE
            .iter()
            .find(|e| e.id == "heavy-stats")
            .unwrap()
            .declaration();

        assert_eq!(declaration.required_packages, vec!["scientific-lib", "ml-lib"]);
        assert_eq!(declaration.weight, Weight::Heavy);
    }
}
