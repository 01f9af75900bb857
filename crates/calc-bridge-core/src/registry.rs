//! The method registry: every operation host code may call.
//!
//! A [`CallContract`] pairs an exposed operation name with the module function
//! that implements it. The registry is exhaustive and non-redundant: one
//! exposed name per function and one function per exposed name.
//!
//! The registry has no runtime behavior of its own beyond lookups. Two
//! verification passes check it against both sides of the boundary:
//!
//! - [`MethodRegistry::verify_exports`]: every contract targets a function the
//!   module source actually exports.
//! - [`MethodRegistry::verify_coverage`]: every host operation has exactly one
//!   contract, and every contract is used by some host operation.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use calc_bridge_common::{BridgeError, ContractEntry};

/// How arguments and results cross the boundary for a contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallAbi {
    /// Numbers passed as typed function parameters.
    #[default]
    Scalar,
    /// One `f64` array passed through guest memory.
    Vector,
}

impl fmt::Display for CallAbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallAbi::Scalar => write!(f, "scalar"),
            CallAbi::Vector => write!(f, "vector"),
        }
    }
}

impl FromStr for CallAbi {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scalar" => Ok(CallAbi::Scalar),
            "vector" => Ok(CallAbi::Vector),
            other => Err(BridgeError::invalid_config(format!(
                "unknown call abi '{other}' (expected 'scalar' or 'vector')"
            ))),
        }
    }
}

/// Immutable pairing of an exposed name with its implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContract {
    /// Name host code invokes.
    pub exposed_name: Cow<'static, str>,
    /// Module that implements the operation.
    pub module_id: Cow<'static, str>,
    /// Function exported by the module.
    pub function_name: Cow<'static, str>,
    /// Argument convention.
    pub abi: CallAbi,
}

impl CallContract {
    /// A contract for a static table.
    pub const fn new(
        exposed_name: &'static str,
        module_id: &'static str,
        function_name: &'static str,
        abi: CallAbi,
    ) -> Self {
        Self {
            exposed_name: Cow::Borrowed(exposed_name),
            module_id: Cow::Borrowed(module_id),
            function_name: Cow::Borrowed(function_name),
            abi,
        }
    }

    /// `module::function`, for messages.
    pub fn target(&self) -> String {
        format!("{}::{}", self.module_id, self.function_name)
    }
}

impl TryFrom<&ContractEntry> for CallContract {
    type Error = BridgeError;

    fn try_from(entry: &ContractEntry) -> Result<Self, Self::Error> {
        let abi = entry
            .abi
            .as_deref()
            .map(str::parse::<CallAbi>)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            exposed_name: Cow::Owned(entry.exposed_name.clone()),
            module_id: Cow::Owned(entry.module.clone()),
            function_name: Cow::Owned(entry.function.clone()),
            abi,
        })
    }
}

/// A disagreement between the registry and one side of the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryViolation {
    /// A contract names a module that is not declared.
    #[error("'{exposed_name}' targets undeclared module '{module_id}'")]
    UnknownModule {
        exposed_name: String,
        module_id: String,
    },

    /// A contract names a function the module does not export.
    #[error("'{exposed_name}' targets {module_id}::{function_name}, which the module does not export")]
    MissingExport {
        exposed_name: String,
        module_id: String,
        function_name: String,
    },

    /// Host code calls an operation with no contract.
    #[error("host operation '{operation}' has no call contract")]
    Unregistered { operation: String },

    /// Host code calls the same operation from more than one place.
    #[error("host operation '{operation}' is exposed {count} times")]
    DuplicateOperation { operation: String, count: usize },

    /// A contract is not used by any host operation.
    #[error("call contract '{exposed_name}' is not used by any host operation")]
    Unused { exposed_name: String },
}

/// The static table of call contracts.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    contracts: Vec<CallContract>,
    by_name: HashMap<String, usize>,
    by_target: HashMap<(String, String), usize>,
}

impl MethodRegistry {
    /// Build the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if an exposed name or a `(module, function)` target
    /// appears twice.
    pub fn new(contracts: impl IntoIterator<Item = CallContract>) -> Result<Self, BridgeError> {
        let mut registry = Self::default();
        for contract in contracts {
            registry.register(contract)?;
        }
        Ok(registry)
    }

    /// Add contracts on top of the existing ones, with the same checks as [`new`](Self::new).
    pub fn extend(
        &mut self,
        contracts: impl IntoIterator<Item = CallContract>,
    ) -> Result<(), BridgeError> {
        for contract in contracts {
            self.register(contract)?;
        }
        Ok(())
    }

    fn register(&mut self, contract: CallContract) -> Result<(), BridgeError> {
        let name = contract.exposed_name.to_string();
        let target = (
            contract.module_id.to_string(),
            contract.function_name.to_string(),
        );

        if self.by_name.contains_key(&name) {
            return Err(BridgeError::invalid_config(format!(
                "operation '{name}' is registered more than once"
            )));
        }
        if let Some(&existing) = self.by_target.get(&target) {
            return Err(BridgeError::invalid_config(format!(
                "{} is exposed as both '{}' and '{name}'",
                contract.target(),
                self.contracts[existing].exposed_name
            )));
        }

        let index = self.contracts.len();
        self.by_name.insert(name, index);
        self.by_target.insert(target, index);
        self.contracts.push(contract);
        Ok(())
    }

    /// Contract for an exposed name.
    pub fn get(&self, exposed_name: &str) -> Option<&CallContract> {
        self.by_name.get(exposed_name).map(|&i| &self.contracts[i])
    }

    /// Contract targeting `module_id::function_name`.
    pub fn resolve(&self, module_id: &str, function_name: &str) -> Option<&CallContract> {
        self.by_target
            .get(&(module_id.to_string(), function_name.to_string()))
            .map(|&i| &self.contracts[i])
    }

    /// All contracts in registration order.
    pub fn contracts(&self) -> &[CallContract] {
        &self.contracts
    }

    /// Number of contracts.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Returns `true` if no contracts are registered.
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Check every contract against the exports of its module.
    ///
    /// `exports` returns the exported function names of a declared module, or
    /// `None` for an undeclared one.
    pub fn verify_exports<F>(&self, exports: F) -> Vec<RegistryViolation>
    where
        F: Fn(&str) -> Option<Vec<String>>,
    {
        let mut cache: BTreeMap<&str, Option<Vec<String>>> = BTreeMap::new();
        let mut violations = Vec::new();

        for contract in &self.contracts {
            let module_exports = cache
                .entry(contract.module_id.as_ref())
                .or_insert_with(|| exports(contract.module_id.as_ref()));

            match module_exports {
                None => violations.push(RegistryViolation::UnknownModule {
                    exposed_name: contract.exposed_name.to_string(),
                    module_id: contract.module_id.to_string(),
                }),
                Some(names) if !names.iter().any(|n| n == contract.function_name.as_ref()) => {
                    violations.push(RegistryViolation::MissingExport {
                        exposed_name: contract.exposed_name.to_string(),
                        module_id: contract.module_id.to_string(),
                        function_name: contract.function_name.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        violations
    }

    /// Check the registry against the operation names host code invokes.
    ///
    /// `host_operations` lists one entry per call site.
    pub fn verify_coverage<S: AsRef<str>>(&self, host_operations: &[S]) -> Vec<RegistryViolation> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for operation in host_operations {
            *counts.entry(operation.as_ref()).or_default() += 1;
        }

        let mut violations = Vec::new();

        for (&operation, &count) in &counts {
            if self.get(operation).is_none() {
                violations.push(RegistryViolation::Unregistered {
                    operation: operation.to_string(),
                });
            } else if count > 1 {
                violations.push(RegistryViolation::DuplicateOperation {
                    operation: operation.to_string(),
                    count,
                });
            }
        }

        for contract in &self.contracts {
            if !counts.contains_key(contract.exposed_name.as_ref()) {
                violations.push(RegistryViolation::Unused {
                    exposed_name: contract.exposed_name.to_string(),
                });
            }
        }

        violations
    }
}
