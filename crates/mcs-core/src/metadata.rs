//! Tag metadata (the data contract of a tag) and cache entries.

use crate::error::ValidationError;
use crate::value::{AccessMode, TagType, TagValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Inclusive numeric bounds of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagRange {
    pub min: f64,
    pub max: f64,
}

impl TagRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Type, access and range contract of a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMetadata {
    pub tag_type: TagType,
    pub access: AccessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<TagRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Not backed by any hardware address.
    pub internal: bool,
    /// A native address exists for this tag.
    pub mapped: bool,
}

impl TagMetadata {
    pub fn new(tag_type: TagType, access: AccessMode) -> Self {
        Self {
            tag_type,
            access,
            range: None,
            options: None,
            unit: None,
            description: None,
            internal: true,
            mapped: false,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(TagRange::new(min, max));
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn mapped(mut self) -> Self {
        self.mapped = true;
        self.internal = false;
        self
    }

    /// Check `value` against this contract and return it in the tag's
    /// canonical representation.
    ///
    /// Float tags store `Float`, int tags store `Int` (integral floats are
    /// accepted), bool tags accept numeric 0/1.
    pub fn check(&self, path: &str, value: &TagValue) -> Result<TagValue, ValidationError> {
        let mismatch = || ValidationError::TypeMismatch {
            path: path.to_string(),
            expected: self.tag_type.to_string(),
            found: value.type_name().to_string(),
        };

        match self.tag_type {
            TagType::Float => {
                let number = value.as_f64().filter(|n| n.is_finite()).ok_or_else(mismatch)?;
                self.check_bounds(path, number, |bound| {
                    number.partial_cmp(&bound).unwrap_or(Ordering::Equal)
                })?;
                Ok(TagValue::Float(number))
            }
            TagType::Int => {
                let int = match value {
                    TagValue::Int(v) => *v,
                    TagValue::Float(v) => TagValue::int_from_f64(*v).ok_or_else(mismatch)?,
                    _ => return Err(mismatch()),
                };
                self.check_bounds(path, int as f64, |bound| compare_int(int, bound))?;
                Ok(TagValue::Int(int))
            }
            TagType::Bool => value.as_bool().map(TagValue::Bool).ok_or_else(mismatch),
            TagType::String => {
                let text = value.as_str().ok_or_else(mismatch)?;
                if let Some(options) = &self.options {
                    if !options.iter().any(|o| o == text) {
                        return Err(ValidationError::NotAnOption {
                            path: path.to_string(),
                            value: text.to_string(),
                            options: options.clone(),
                        });
                    }
                }
                Ok(TagValue::String(text.to_string()))
            }
        }
    }

    /// Range check; `compare` orders the value against a bound.
    fn check_bounds(
        &self,
        path: &str,
        shown: f64,
        compare: impl Fn(f64) -> Ordering,
    ) -> Result<(), ValidationError> {
        let Some(range) = self.range else {
            return Ok(());
        };
        if compare(range.min) == Ordering::Less {
            return Err(ValidationError::BelowMinimum {
                path: path.to_string(),
                value: shown,
                min: range.min,
            });
        }
        if compare(range.max) == Ordering::Greater {
            return Err(ValidationError::AboveMaximum {
                path: path.to_string(),
                value: shown,
                max: range.max,
            });
        }
        Ok(())
    }

    /// Value a freshly built cache holds before any read or write.
    pub fn initial_value(&self) -> TagValue {
        match self.tag_type {
            TagType::String => self
                .options
                .as_ref()
                .and_then(|o| o.first())
                .map(|o| TagValue::String(o.clone()))
                .unwrap_or_else(|| self.tag_type.zero()),
            TagType::Float | TagType::Int => match self.range {
                Some(range) if !range.contains(0.0) => {
                    if self.tag_type == TagType::Int {
                        TagValue::Int(range.min.ceil() as i64)
                    } else {
                        TagValue::Float(range.min)
                    }
                }
                _ => self.tag_type.zero(),
            },
            TagType::Bool => self.tag_type.zero(),
        }
    }
}

/// Orders an integer against a finite float bound without losing precision.
///
/// `v as f64` rounds monotonically, so only a tie needs a second look; a tie
/// means the bound is integral and fits `i128` exactly.
fn compare_int(v: i64, bound: f64) -> Ordering {
    match (v as f64).partial_cmp(&bound) {
        Some(Ordering::Equal) => i128::from(v).cmp(&(bound as i128)),
        Some(order) => order,
        None => Ordering::Equal,
    }
}

/// One cached tag: contract, current value and when it last changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub metadata: TagMetadata,
    pub value: TagValue,
    pub updated_at: DateTime<Utc>,
}

impl TagEntry {
    pub fn new(metadata: TagMetadata, value: TagValue) -> Self {
        Self {
            metadata,
            value,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> TagMetadata {
        TagMetadata::new(TagType::Float, AccessMode::ReadWrite).with_range(0.0, 100.0)
    }

    #[test]
    fn float_tags_normalize_ints() {
        assert_eq!(flow().check("f", &TagValue::Int(5)), Ok(TagValue::Float(5.0)));
    }

    #[test]
    fn range_is_inclusive() {
        assert!(flow().check("f", &TagValue::Float(0.0)).is_ok());
        assert!(flow().check("f", &TagValue::Float(100.0)).is_ok());
        assert!(matches!(
            flow().check("f", &TagValue::Float(-0.001)),
            Err(ValidationError::BelowMinimum { .. })
        ));
        assert!(matches!(
            flow().check("f", &TagValue::Float(100.001)),
            Err(ValidationError::AboveMaximum { .. })
        ));
    }

    #[test]
    fn nan_is_not_numeric() {
        assert!(matches!(
            flow().check("f", &TagValue::Float(f64::NAN)),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn int_tags_reject_fractions() {
        let meta = TagMetadata::new(TagType::Int, AccessMode::ReadWrite);
        assert_eq!(meta.check("i", &TagValue::Float(3.0)), Ok(TagValue::Int(3)));
        assert!(meta.check("i", &TagValue::Float(3.5)).is_err());
        assert!(matches!(
            meta.check("i", &TagValue::Float(1e30)),
            Err(ValidationError::TypeMismatch { .. })
        ));
        assert!(matches!(
            meta.check("i", &TagValue::Float(-1e30)),
            Err(ValidationError::TypeMismatch { .. })
        ));
        assert_eq!(
            meta.check("i", &TagValue::Float(-9223372036854775808.0)),
            Ok(TagValue::Int(i64::MIN))
        );

        let wide = meta.clone().with_range(0.0, 9007199254740992.0);
        assert_eq!(
            wide.check("i", &TagValue::Int(9007199254740992)),
            Ok(TagValue::Int(9007199254740992))
        );
        assert!(matches!(
            wide.check("i", &TagValue::Int(9007199254740993)),
            Err(ValidationError::AboveMaximum { .. })
        ));
        assert_eq!(wide.check("i", &TagValue::Int(0)), Ok(TagValue::Int(0)));
        assert!(matches!(
            wide.check("i", &TagValue::Int(-1)),
            Err(ValidationError::BelowMinimum { .. })
        ));
    }

    #[test]
    fn string_options_are_enforced() {
        let meta = TagMetadata::new(TagType::String, AccessMode::Read)
            .with_options(["IDLE", "RUNNING"]);
        assert!(meta.check("s", &"IDLE".into()).is_ok());
        let err = meta.check("s", &"BROKEN".into()).unwrap_err();
        assert!(err.to_string().contains("RUNNING"));
        assert_eq!(meta.initial_value(), TagValue::String("IDLE".into()));
    }

    #[test]
    fn initial_value_respects_range() {
        let meta = TagMetadata::new(TagType::Float, AccessMode::Read).with_range(10.0, 20.0);
        assert_eq!(meta.initial_value(), TagValue::Float(10.0));
        assert_eq!(flow().initial_value(), TagValue::Float(0.0));
    }
}
