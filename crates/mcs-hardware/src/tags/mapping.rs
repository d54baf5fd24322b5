//! Symbolic path ↔ native address mapping.
//!
//! Register-family tags (`plc_tag`) map 1:1. Variable-family tags (`ssh`)
//! list several controller variables that all resolve *forward* to the same
//! symbolic path, while the *reverse* lookup returns the last listed
//! variable only. Writes by symbolic name therefore always land on the last
//! variable of the list (the start/trigger variable in the feeder
//! configuration shape); [`TagMappingService::variables_for`] exposes the
//! full list for callers that need it.

use super::document::{self, Visit};
use mcs_core::{McsError, McsResult, Transport};
use parking_lot::RwLock;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Native binding declared by one mapped tag definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeBinding {
    Register(String),
    Variables(Vec<String>),
}

impl NativeBinding {
    pub fn transport(&self) -> Transport {
        match self {
            NativeBinding::Register(_) => Transport::Register,
            NativeBinding::Variables(_) => Transport::Variable,
        }
    }
}

/// Resolved mapping of one symbolic path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMapping {
    pub path: String,
    pub transport: Transport,
    /// Target of the reverse lookup.
    pub native: String,
    /// Every native address feeding this path, in declaration order.
    pub sources: Vec<String>,
}

#[derive(Debug, Default)]
struct MappingTables {
    by_path: HashMap<String, AddressMapping>,
    by_native: HashMap<String, String>,
}

impl MappingTables {
    fn build(document: &Value) -> McsResult<Self> {
        let bindings = document::walk(document, classify)?;

        let mut tables = MappingTables::default();
        for (path, binding) in bindings {
            let transport = binding.transport();
            let sources = match binding {
                NativeBinding::Register(address) => vec![address],
                NativeBinding::Variables(variables) => variables,
            };

            for native in &sources {
                if let Some(owner) = tables.by_native.get(native) {
                    if owner != &path {
                        return Err(McsError::Config(format!(
                            "native address {} is claimed by both {} and {}",
                            native, owner, path
                        )));
                    }
                }
                tables.by_native.insert(native.clone(), path.clone());
            }

            // Last listed variable wins the reverse direction.
            let Some(native) = sources.last().cloned() else {
                return Err(McsError::Config(format!("tag {}: no native address", path)));
            };
            tables.by_path.insert(
                path.clone(),
                AddressMapping {
                    path,
                    transport,
                    native,
                    sources,
                },
            );
        }
        Ok(tables)
    }
}

fn classify(_path: &str, node: &Mapping) -> Visit<NativeBinding> {
    match document::mapped_flag(node) {
        Ok(true) => {}
        Ok(false) => return Visit::Skip,
        Err(reason) => return Visit::Fatal(reason),
    }

    match (node.get("plc_tag"), node.get("ssh")) {
        (Some(_), Some(_)) => {
            Visit::Fatal("declares both 'plc_tag' and 'ssh' addresses".to_string())
        }
        (Some(Value::String(address)), None) if !address.trim().is_empty() => {
            Visit::Entry(NativeBinding::Register(address.trim().to_string()))
        }
        (Some(_), None) => Visit::Fatal("'plc_tag' must be a non-empty string".to_string()),
        (None, Some(ssh)) => match variable_list(ssh) {
            Ok(variables) => Visit::Entry(NativeBinding::Variables(variables)),
            Err(reason) => Visit::Fatal(reason),
        },
        (None, None) => {
            Visit::Fatal("mapped tag has neither a 'plc_tag' nor an 'ssh' address".to_string())
        }
    }
}

/// `ssh: {variables: [..]}`, or the record form `ssh: {freq_var: A, ...}`
/// whose values are taken in declaration order.
fn variable_list(ssh: &Value) -> Result<Vec<String>, String> {
    let Value::Mapping(ssh) = ssh else {
        return Err("'ssh' must be a mapping".to_string());
    };

    let raw: Vec<&Value> = match ssh.get("variables") {
        Some(Value::Sequence(items)) => items.iter().collect(),
        Some(_) => return Err("'ssh.variables' must be a list".to_string()),
        None => ssh.values().collect(),
    };

    let mut variables = Vec::with_capacity(raw.len());
    for item in raw {
        match item {
            Value::String(name) if !name.trim().is_empty() => {
                variables.push(name.trim().to_string())
            }
            _ => return Err("'ssh' variables must be non-empty strings".to_string()),
        }
    }

    if variables.is_empty() {
        return Err("'ssh' lists no variables".to_string());
    }
    Ok(variables)
}

/// Serves the symbolic ↔ native mapping between `start` and `stop`.
#[derive(Debug, Default)]
pub struct TagMappingService {
    tables: RwLock<MappingTables>,
    running: AtomicBool,
}

impl TagMappingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the mapping from a tag document and start serving lookups.
    ///
    /// A malformed definition aborts the build; the service then stays
    /// stopped and holds no mappings.
    pub fn start(&self, document: &Value) -> McsResult<()> {
        if self.is_running() {
            return Err(McsError::Service("tag mapping already running".to_string()));
        }

        let tables = MappingTables::build(document)?;
        let register = tables
            .by_path
            .values()
            .filter(|m| m.transport == Transport::Register)
            .count();
        info!(
            "Tag mapping built: {} register tags, {} variable tags, {} native addresses",
            register,
            tables.by_path.len() - register,
            tables.by_native.len()
        );

        *self.tables.write() = tables;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop(&self) {
        *self.tables.write() = MappingTables::default();
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("Tag mapping stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> McsResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(McsError::Service("tag mapping not running".to_string()))
        }
    }

    fn lookup<T>(&self, path: &str, f: impl FnOnce(&AddressMapping) -> T) -> McsResult<T> {
        self.ensure_running()?;
        self.tables
            .read()
            .by_path
            .get(path)
            .map(f)
            .ok_or_else(|| McsError::NotFound(format!("no native address for tag {}", path)))
    }

    pub fn to_symbolic_name(&self, native: &str) -> McsResult<String> {
        self.ensure_running()?;
        self.tables
            .read()
            .by_native
            .get(native)
            .cloned()
            .ok_or_else(|| McsError::NotFound(format!("no tag for native address {}", native)))
    }

    pub fn to_native_address(&self, path: &str) -> McsResult<String> {
        self.lookup(path, |m| m.native.clone())
    }

    pub fn is_register_tag(&self, path: &str) -> McsResult<bool> {
        self.lookup(path, |m| m.transport == Transport::Register)
    }

    pub fn is_variable_tag(&self, path: &str) -> McsResult<bool> {
        self.lookup(path, |m| m.transport == Transport::Variable)
    }

    pub fn transport_of(&self, path: &str) -> McsResult<Transport> {
        self.lookup(path, |m| m.transport)
    }

    /// Every native address feeding `path`, in declaration order.
    pub fn variables_for(&self, path: &str) -> McsResult<Vec<String>> {
        self.lookup(path, |m| m.sources.clone())
    }

    pub fn get(&self, path: &str) -> McsResult<AddressMapping> {
        self.lookup(path, Clone::clone)
    }

    /// All mappings sorted by path.
    pub fn mappings(&self) -> Vec<AddressMapping> {
        let mut all: Vec<_> = self.tables.read().by_path.values().cloned().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Number of mapped symbolic paths.
    pub fn len(&self) -> usize {
        self.tables.read().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
