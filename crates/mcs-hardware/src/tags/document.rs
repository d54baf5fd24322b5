//! Walking the nested tag document.
//!
//! A tag document is a tree of YAML mappings. Every mapping that carries at
//! least one of the [`DEFINITION_KEYS`] is a tag definition and ends the
//! descent; its symbolic path is the dot-joined chain of keys leading to it.
//! Every other mapping is a group. Scalars and sequences at group level are
//! ignored. The whole tree may optionally be wrapped in a `tag_groups` key.
//!
//! ```yaml
//! tag_groups:
//!   gas_control:
//!     main_flow:
//!       setpoint:              # -> gas_control.main_flow.setpoint
//!         type: float
//!         access: read-write
//!         range: [0.0, 100.0]
//!         mapped: true
//!         plc_tag: GAS_FLOW_SP
//! ```

use mcs_core::{McsError, McsResult};
use serde_yaml::{Mapping, Value};

/// Keys whose presence marks a mapping as a tag definition.
pub const DEFINITION_KEYS: [&str; 4] = ["type", "mapped", "plc_tag", "ssh"];

/// Optional wrapper key around the tag groups.
pub const ROOT_KEY: &str = "tag_groups";

/// What a visitor made of one tag definition.
#[derive(Debug)]
pub enum Visit<T> {
    /// Keep the definition.
    Entry(T),
    /// Not relevant to this visitor.
    Skip,
    /// The definition is malformed; the whole walk fails.
    Fatal(String),
}

pub fn is_definition(node: &Mapping) -> bool {
    DEFINITION_KEYS.iter().any(|key| node.contains_key(*key))
}

/// Visit every tag definition in document order.
///
/// Returns the kept entries keyed by symbolic path, or `McsError::Config`
/// naming the offending path on the first fatal definition.
pub fn walk<T, F>(document: &Value, mut visit: F) -> McsResult<Vec<(String, T)>>
where
    F: FnMut(&str, &Mapping) -> Visit<T>,
{
    let mut entries = Vec::new();
    let root = match document {
        Value::Null => return Ok(entries),
        Value::Mapping(root) => match root.get(ROOT_KEY) {
            Some(Value::Mapping(groups)) => groups,
            Some(Value::Null) => return Ok(entries),
            Some(_) => {
                return Err(McsError::Config(format!(
                    "'{}' must be a mapping of tag groups",
                    ROOT_KEY
                )))
            }
            None => root,
        },
        _ => {
            return Err(McsError::Config(
                "tag document must be a mapping of tag groups".to_string(),
            ))
        }
    };

    walk_group("", root, &mut visit, &mut entries)?;
    Ok(entries)
}

fn walk_group<T, F>(
    prefix: &str,
    group: &Mapping,
    visit: &mut F,
    entries: &mut Vec<(String, T)>,
) -> McsResult<()>
where
    F: FnMut(&str, &Mapping) -> Visit<T>,
{
    for (key, node) in group {
        let name = key_name(key).ok_or_else(|| {
            McsError::Config(format!("tag group '{}' has a non-scalar key", prefix))
        })?;
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{}.{}", prefix, name)
        };

        let Value::Mapping(node) = node else {
            tracing::trace!("Ignoring non-mapping value at {}", path);
            continue;
        };

        if is_definition(node) {
            match visit(&path, node) {
                Visit::Entry(entry) => entries.push((path, entry)),
                Visit::Skip => {}
                Visit::Fatal(reason) => {
                    return Err(McsError::Config(format!("tag {}: {}", path, reason)))
                }
            }
        } else {
            walk_group(&path, node, visit, entries)?;
        }
    }
    Ok(())
}

fn key_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `mapped` flag of a definition. Absent means false.
pub(crate) fn mapped_flag(node: &Mapping) -> Result<bool, String> {
    match node.get("mapped") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(mapped)) => Ok(*mapped),
        Some(_) => Err("'mapped' must be a boolean".to_string()),
    }
}

/// Optional string field.
pub(crate) fn str_field<'a>(node: &'a Mapping, key: &str) -> Result<Option<&'a str>, String> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(format!("'{}' must be a string", key)),
    }
}
