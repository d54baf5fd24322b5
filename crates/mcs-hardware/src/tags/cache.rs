//! The validated tag cache.
//!
//! Every tag definition in the document (mapped or not) becomes a
//! [`TagEntry`]. The cache is the only owner of tag values; every mutation
//! goes through [`TagMetadata::check`] first, and a rejected value leaves the
//! entry untouched.
//!
//! Two write paths exist:
//!
//! - [`TagCacheService::set`] records a value locally (derived/internal tags,
//!   readbacks).
//! - [`TagCacheService::write`] is the hardware path: validate, enforce
//!   access, resolve the native address, write through the transport client,
//!   then record the value.
//!
//! # Locking
//!
//! Entries live behind one `parking_lot::RwLock` that is never held across an
//! `.await`. Hardware writes to the same path are serialized by a per-path
//! `tokio::sync::Mutex`, so validate → client write → cache update cannot
//! interleave with another writer of that tag. Writers of different tags run
//! concurrently.

use super::document::{self, Visit};
use super::mapping::TagMappingService;
use chrono::Utc;
use mcs_core::{
    AccessMode, HardwareClient, HardwareError, HardwareErrorKind, McsError, McsResult, TagEntry,
    TagMetadata, TagRange, TagType, TagValue, Transport, ValidationError,
};
use parking_lot::RwLock;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Clients the cache talks to for mapped tags, one per transport.
#[derive(Clone)]
pub struct TransportClients {
    pub register: Arc<dyn HardwareClient>,
    pub variable: Arc<dyn HardwareClient>,
}

impl TransportClients {
    pub fn new(register: Arc<dyn HardwareClient>, variable: Arc<dyn HardwareClient>) -> Self {
        Self { register, variable }
    }

    pub fn get(&self, transport: Transport) -> &Arc<dyn HardwareClient> {
        match transport {
            Transport::Register => &self.register,
            Transport::Variable => &self.variable,
        }
    }
}

/// Query for [`TagCacheService::filter`]. `None` criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagFilter {
    pub groups: Option<Vec<String>>,
    pub types: Option<Vec<TagType>>,
    pub access: Option<Vec<AccessMode>>,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn types(mut self, types: impl IntoIterator<Item = TagType>) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    pub fn access(mut self, access: impl IntoIterator<Item = AccessMode>) -> Self {
        self.access = Some(access.into_iter().collect());
        self
    }

    /// A group matches its own path and everything below it, at segment
    /// boundaries: `gas` matches `gas.flow` but not `gasket.seal`.
    fn matches(&self, path: &str, metadata: &TagMetadata) -> bool {
        let in_group = self.groups.as_ref().map_or(true, |groups| {
            groups.iter().any(|group| {
                path == group
                    || path
                        .strip_prefix(group.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
        });
        let of_type = self
            .types
            .as_ref()
            .map_or(true, |types| types.contains(&metadata.tag_type));
        let with_access = self
            .access
            .as_ref()
            .map_or(true, |access| access.contains(&metadata.access));
        in_group && of_type && with_access
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, TagEntry>,
    write_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

/// Authoritative store of tag metadata and values.
pub struct TagCacheService {
    state: RwLock<CacheState>,
    mapping: Arc<TagMappingService>,
    clients: RwLock<Option<TransportClients>>,
    running: AtomicBool,
}

impl TagCacheService {
    pub fn new(mapping: Arc<TagMappingService>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            mapping,
            clients: RwLock::new(None),
            running: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Build every entry from the tag document and start serving.
    ///
    /// Any structurally invalid definition aborts the build and leaves the
    /// cache empty.
    pub fn start(&self, document: &Value) -> McsResult<()> {
        if self.is_running() {
            return Err(McsError::Service("tag cache already running".to_string()));
        }

        let built = document::walk(document, parse_definition)?;

        let mut state = CacheState::default();
        for (path, (metadata, value)) in built {
            state
                .write_locks
                .insert(path.clone(), Arc::new(tokio::sync::Mutex::new(())));
            state.entries.insert(path, TagEntry::new(metadata, value));
        }

        let mapped = state.entries.values().filter(|e| e.metadata.mapped).count();
        info!(
            "Tag cache built: {} tags ({} mapped, {} internal)",
            state.entries.len(),
            mapped,
            state.entries.len() - mapped
        );

        *self.state.write() = state;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Clear every entry and drop the attached clients.
    pub fn stop(&self) {
        *self.state.write() = CacheState::default();
        *self.clients.write() = None;
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("Tag cache stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Install the transport clients used by [`read`](Self::read) and
    /// [`write`](Self::write).
    pub fn attach_clients(&self, clients: TransportClients) {
        *self.clients.write() = Some(clients);
    }

    fn ensure_running(&self) -> McsResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(McsError::Service("tag cache not running".to_string()))
        }
    }

    // =========================================================================
    // Local access
    // =========================================================================

    pub fn get(&self, path: &str) -> McsResult<TagValue> {
        Ok(self.get_with_metadata(path)?.value)
    }

    pub fn get_with_metadata(&self, path: &str) -> McsResult<TagEntry> {
        self.ensure_running()?;
        self.state
            .read()
            .entries
            .get(path)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownTag(path.to_string()).into())
    }

    /// Check `value` against the tag's contract without touching the cache.
    pub fn validate(&self, path: &str, value: &TagValue) -> McsResult<()> {
        self.normalize(path, value).map(|_| ())
    }

    fn normalize(&self, path: &str, value: &TagValue) -> McsResult<TagValue> {
        self.ensure_running()?;
        let state = self.state.read();
        let entry = state
            .entries
            .get(path)
            .ok_or_else(|| ValidationError::UnknownTag(path.to_string()))?;
        Ok(entry.metadata.check(path, value)?)
    }

    /// Validate and record a value locally. No hardware I/O.
    pub fn set(&self, path: &str, value: impl Into<TagValue>) -> McsResult<()> {
        self.ensure_running()?;
        let value = value.into();
        let mut state = self.state.write();
        let entry = state
            .entries
            .get_mut(path)
            .ok_or_else(|| ValidationError::UnknownTag(path.to_string()))?;
        entry.value = entry.metadata.check(path, &value)?;
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Entries matching every supplied criterion, sorted by path.
    pub fn filter(&self, filter: &TagFilter) -> McsResult<Vec<(String, TagEntry)>> {
        self.ensure_running()?;
        let state = self.state.read();
        let mut matches: Vec<_> = state
            .entries
            .iter()
            .filter(|(path, entry)| filter.matches(path, &entry.metadata))
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches)
    }

    /// All tag paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.state.read().entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Hardware access
    // =========================================================================

    fn metadata(&self, path: &str) -> McsResult<TagMetadata> {
        self.ensure_running()?;
        self.state
            .read()
            .entries
            .get(path)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| ValidationError::UnknownTag(path.to_string()).into())
    }

    fn route(&self, path: &str) -> McsResult<(Arc<dyn HardwareClient>, String)> {
        let transport = self.mapping.transport_of(path)?;
        let native = self.mapping.to_native_address(path)?;
        let client = self
            .clients
            .read()
            .as_ref()
            .map(|clients| Arc::clone(clients.get(transport)))
            .ok_or_else(|| {
                McsError::Service(format!("no {} client attached to tag cache", transport))
            })?;
        Ok((client, native))
    }

    fn store(&self, path: &str, value: TagValue) {
        let mut state = self.state.write();
        if let Some(entry) = state.entries.get_mut(path) {
            entry.value = value;
            entry.updated_at = Utc::now();
        }
    }

    /// Current value of a tag. Mapped tags are read from hardware and the
    /// cache updated; internal tags return the cached value.
    pub async fn read(&self, path: &str) -> McsResult<TagValue> {
        let metadata = self.metadata(path)?;
        if !metadata.mapped {
            return self.get(path);
        }

        let (client, native) = self.route(path)?;
        let raw = client.read_address(&native).await?;
        let value = coerce_readback(path, &metadata, raw).map_err(|message| {
            HardwareError::new(client.transport(), HardwareErrorKind::Protocol, message)
        })?;
        self.store(path, value.clone());
        Ok(value)
    }

    /// Validate, write through to hardware (mapped tags), then record.
    pub async fn write(&self, path: &str, value: impl Into<TagValue>) -> McsResult<()> {
        let value = value.into();
        self.ensure_running()?;
        let lock = self
            .state
            .read()
            .write_locks
            .get(path)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownTag(path.to_string()))?;
        let _guard = lock.lock().await;

        let metadata = self.metadata(path)?;
        let value = metadata.check(path, &value)?;
        if !metadata.access.is_writable() {
            return Err(ValidationError::ReadOnly(path.to_string()).into());
        }

        if metadata.mapped {
            let (client, native) = self.route(path)?;
            client.write_address(&native, &value).await?;
            debug!("Wrote {} = {} via {} {}", path, value, client.transport(), native);
        }

        self.store(path, value);
        Ok(())
    }

    /// Read every mapped tag once. Returns how many were refreshed.
    pub async fn refresh(&self) -> McsResult<usize> {
        self.ensure_running()?;
        let mapped: Vec<String> = {
            let state = self.state.read();
            let mut mapped: Vec<_> = state
                .entries
                .iter()
                .filter(|(_, e)| e.metadata.mapped)
                .map(|(p, _)| p.clone())
                .collect();
            mapped.sort();
            mapped
        };

        for path in &mapped {
            self.read(path).await?;
        }
        Ok(mapped.len())
    }
}

/// Bring a raw hardware value into the tag's representation.
///
/// Hardware reports raw counts, so a readback outside the declared range is
/// stored as-is with a warning; only a value of the wrong kind is an error.
fn coerce_readback(path: &str, metadata: &TagMetadata, raw: TagValue) -> Result<TagValue, String> {
    let value = match (metadata.tag_type, &raw) {
        (TagType::Float, v) if v.is_numeric() => v.as_f64().map(TagValue::Float),
        (TagType::Float, TagValue::Bool(b)) => Some(TagValue::Float(f64::from(u8::from(*b)))),
        (TagType::Int, TagValue::Int(v)) => Some(TagValue::Int(*v)),
        (TagType::Int, TagValue::Float(v)) => TagValue::int_from_f64(v.round()).map(TagValue::Int),
        (TagType::Int, TagValue::Bool(b)) => Some(TagValue::Int(i64::from(*b))),
        (TagType::Bool, TagValue::Bool(b)) => Some(TagValue::Bool(*b)),
        (TagType::Bool, v) if v.is_numeric() => v.as_f64().map(|n| TagValue::Bool(n != 0.0)),
        (TagType::String, TagValue::String(s)) => Some(TagValue::String(s.clone())),
        (TagType::String, v) => Some(TagValue::String(v.to_string())),
        _ => None,
    }
    .ok_or_else(|| {
        format!(
            "tag {} expects a {} readback, got {}",
            path,
            metadata.tag_type,
            raw.type_name()
        )
    })?;

    if let Err(e) = metadata.check(path, &value) {
        warn!("Readback outside tag contract: {}", e);
    }
    Ok(value)
}

// =============================================================================
// Definition parsing
// =============================================================================

fn parse_definition(path: &str, node: &Mapping) -> Visit<(TagMetadata, TagValue)> {
    match metadata_from(path, node) {
        Ok(entry) => Visit::Entry(entry),
        Err(reason) => Visit::Fatal(reason),
    }
}

fn metadata_from(path: &str, node: &Mapping) -> Result<(TagMetadata, TagValue), String> {
    let tag_type: TagType = document::str_field(node, "type")?
        .ok_or("missing 'type'")?
        .parse()?;
    let access: AccessMode = match document::str_field(node, "access")? {
        Some(access) => access.parse()?,
        None => AccessMode::Read,
    };

    let mut metadata = TagMetadata::new(tag_type, access);
    if document::mapped_flag(node)? {
        metadata = metadata.mapped();
    }
    metadata.unit = document::str_field(node, "unit")?.map(str::to_string);
    metadata.description = document::str_field(node, "description")?.map(str::to_string);

    if let Some(range) = node.get("range") {
        if !tag_type.is_numeric() {
            return Err(format!("'range' is not allowed on a {} tag", tag_type));
        }
        metadata.range = Some(parse_range(range)?);
    }

    if let Some(options) = node.get("options") {
        if tag_type != TagType::String {
            return Err(format!("'options' is not allowed on a {} tag", tag_type));
        }
        metadata.options = Some(parse_options(options)?);
    }

    let value = match node.get("default") {
        None | Some(Value::Null) => metadata.initial_value(),
        Some(raw) => {
            let value = scalar(raw).ok_or("'default' must be a scalar")?;
            metadata
                .check(path, &value)
                .map_err(|e| format!("invalid 'default': {}", e))?
        }
    };

    Ok((metadata, value))
}

fn parse_range(range: &Value) -> Result<TagRange, String> {
    let bounds = match range {
        Value::Sequence(bounds) if bounds.len() == 2 => bounds,
        _ => return Err("'range' must be a [min, max] pair".to_string()),
    };
    let bound = |v: &Value| {
        v.as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| format!("'range' bound {:?} is not a number", v))
    };
    let (min, max) = (bound(&bounds[0])?, bound(&bounds[1])?);
    if min > max {
        return Err(format!("'range' minimum {} exceeds maximum {}", min, max));
    }
    Ok(TagRange::new(min, max))
}

fn parse_options(options: &Value) -> Result<Vec<String>, String> {
    let Value::Sequence(items) = options else {
        return Err("'options' must be a list".to_string());
    };
    let options = items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| "'options' must only contain strings".to_string())
        })
        .collect::<Result<Vec<_>, _>>()?;
    if options.is_empty() {
        return Err("'options' must not be empty".to_string());
    }
    Ok(options)
}

fn scalar(value: &Value) -> Option<TagValue> {
    match value {
        Value::Bool(b) => Some(TagValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(TagValue::Int)
            .or_else(|| n.as_f64().map(TagValue::Float)),
        Value::String(s) => Some(TagValue::String(s.clone())),
        _ => None,
    }
}
