//! Feature Registry
//!
//! Declarative catalog of every derived feature, loaded once per run from a
//! JSON or YAML document:
//!
//! ```yaml
//! sources:
//!   transactions: { available_from: 2015-01-01, lag_days: 1 }
//! features:
//!   - name: tx_count_30d
//!     source: transactions
//!     window: 30d
//!     aggregation: count()
//!     null_policy: fill_zero
//!     dtype: int
//!     fill_value: 0
//!     description: Transactions in the 30 days before the cutoff
//! ```
//!
//! `name`, `source`, `window`, `aggregation`, `null_policy`, `dtype` and
//! `fill_value` are required; `description` and `ratio_default` are optional.
//! Windows are kept verbatim here and resolved per subject at extraction.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use asof_data::{EventStore, EventStream, Timestamp};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregation::Aggregation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    #[serde(alias = "zero")]
    FillZero,
    #[serde(alias = "median")]
    FillMedian,
    #[serde(alias = "constant")]
    FillConstant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    Float,
    Int,
    Bool,
}

impl Dtype {
    #[must_use]
    pub fn cast(self, value: f64) -> f64 {
        match self {
            Self::Float => value,
            Self::Int => value.round(),
            Self::Bool => {
                if value == 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub source: String,
    pub window: String,
    pub aggregation: Aggregation,
    pub null_policy: NullPolicy,
    pub dtype: Dtype,
    pub fill_value: f64,
    /// Value of a ratio whose denominator sums to zero; `fill_value` if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio_default: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeatureSpec {
    #[must_use]
    pub fn ratio_default(&self) -> f64 {
        self.ratio_default.unwrap_or(self.fill_value)
    }
}

/// When a source stream starts being populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_from: Option<Timestamp>,
    /// Delay between an event happening and it landing in the stream.
    #[serde(default)]
    pub lag_days: u32,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RegistryError {
    #[display("feature #{index} ({name}): missing required field `{field}`")]
    Schema {
        index: usize,
        name: String,
        field: &'static str,
    },
    #[display("feature #{index} ({name}): invalid `{field}`: {reason}")]
    InvalidField {
        index: usize,
        name: String,
        field: &'static str,
        reason: String,
    },
    #[display("duplicate feature name {name:?} at #{first} and #{second}")]
    DuplicateName {
        name: String,
        first: usize,
        second: usize,
    },
    #[display("feature {feature}: source {source_name:?} is not available as of {as_of}")]
    UnavailableSource {
        feature: String,
        source_name: String,
        as_of: Timestamp,
    },
    #[display("failed to parse {format} registry: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
    #[display("failed to read registry {}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Untyped mirror of the document, so a missing field is reported by name
/// rather than as a generic parse failure.
#[derive(Debug, Default, Deserialize)]
struct RawRegistry {
    #[serde(default)]
    sources: BTreeMap<String, SourceInfo>,
    #[serde(default)]
    features: Vec<RawFeatureSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFeatureSpec {
    name: Option<String>,
    source: Option<String>,
    window: Option<String>,
    aggregation: Option<String>,
    null_policy: Option<NullPolicy>,
    dtype: Option<Dtype>,
    fill_value: Option<f64>,
    ratio_default: Option<f64>,
    description: Option<String>,
}

impl RawFeatureSpec {
    fn validate(self, index: usize) -> Result<FeatureSpec, RegistryError> {
        let name = self.name.clone().unwrap_or_else(|| "<unnamed>".to_owned());
        let missing = |field| RegistryError::Schema {
            index,
            name: name.clone(),
            field,
        };
        let spec_name = self.name.ok_or_else(|| missing("name"))?;
        let source = self.source.ok_or_else(|| missing("source"))?;
        let window = self.window.ok_or_else(|| missing("window"))?;
        let aggregation = self.aggregation.ok_or_else(|| missing("aggregation"))?;
        let null_policy = self.null_policy.ok_or_else(|| missing("null_policy"))?;
        let dtype = self.dtype.ok_or_else(|| missing("dtype"))?;
        let fill_value = self.fill_value.ok_or_else(|| missing("fill_value"))?;

        let invalid = |field, reason: String| RegistryError::InvalidField {
            index,
            name: name.clone(),
            field,
            reason,
        };
        if spec_name.trim().is_empty() {
            return Err(invalid("name", "must not be empty".to_owned()));
        }
        let aggregation = aggregation
            .parse::<Aggregation>()
            .map_err(|e| invalid("aggregation", e.to_string()))?;
        if !fill_value.is_finite() {
            return Err(invalid("fill_value", "must be finite".to_owned()));
        }
        if null_policy == NullPolicy::FillZero && fill_value.abs() > 0.0 {
            return Err(invalid(
                "fill_value",
                format!("must be 0 with fill_zero, got {fill_value}"),
            ));
        }
        if self.ratio_default.is_some_and(|v| !v.is_finite()) {
            return Err(invalid("ratio_default", "must be finite".to_owned()));
        }

        Ok(FeatureSpec {
            name: spec_name,
            source,
            window,
            aggregation,
            null_policy,
            dtype,
            fill_value,
            ratio_default: self.ratio_default,
            description: self.description,
        })
    }
}

/// Validated, read-only feature catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Registry {
    sources: BTreeMap<String, SourceInfo>,
    features: Vec<FeatureSpec>,
}

impl Registry {
    fn from_raw(raw: RawRegistry) -> Result<Self, RegistryError> {
        let mut features = Vec::with_capacity(raw.features.len());
        let mut seen = BTreeMap::<String, usize>::new();
        for (index, raw_spec) in raw.features.into_iter().enumerate() {
            let spec = raw_spec.validate(index)?;
            if let Some(&first) = seen.get(&spec.name) {
                return Err(RegistryError::DuplicateName {
                    name: spec.name,
                    first,
                    second: index,
                });
            }
            seen.insert(spec.name.clone(), index);
            features.push(spec);
        }
        Ok(Self {
            sources: raw.sources,
            features,
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self, RegistryError> {
        let raw = serde_json::from_str(s).map_err(|e| RegistryError::Parse {
            format: "JSON",
            message: e.to_string(),
        })?;
        Self::from_raw(raw)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, RegistryError> {
        let raw = serde_yaml::from_str(s).map_err(|e| RegistryError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?;
        Self::from_raw(raw)
    }

    /// Builds a registry from already-typed specs, applying the same
    /// uniqueness check as loading.
    pub fn new(
        sources: BTreeMap<String, SourceInfo>,
        features: Vec<FeatureSpec>,
    ) -> Result<Self, RegistryError> {
        let mut seen = BTreeMap::<&str, usize>::new();
        for (index, spec) in features.iter().enumerate() {
            if let Some(&first) = seen.get(spec.name.as_str()) {
                return Err(RegistryError::DuplicateName {
                    name: spec.name.clone(),
                    first,
                    second: index,
                });
            }
            seen.insert(&spec.name, index);
        }
        Ok(Self { sources, features })
    }

    #[must_use]
    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    #[must_use]
    pub fn source_info(&self, source: &str) -> Option<SourceInfo> {
        self.sources.get(source).copied()
    }

    /// Streams referenced by at least one feature.
    #[must_use]
    pub fn referenced_sources(&self) -> BTreeSet<&str> {
        self.features.iter().map(|f| f.source.as_str()).collect()
    }

    /// Whether `spec`'s source is guaranteed to be populated at `as_of`:
    /// it has a known start and `available_from + lag_days <= as_of`.
    ///
    /// A source with no declared or observed start is never available.
    #[must_use]
    pub fn validate_availability(&self, spec: &FeatureSpec, as_of: Timestamp) -> bool {
        let Some(info) = self.sources.get(&spec.source) else {
            return false;
        };
        let Some(from) = info.available_from else {
            return false;
        };
        from.checked_add(TimeDelta::days(i64::from(info.lag_days)))
            .is_some_and(|ready| ready <= as_of)
    }

    /// Fails on the first feature whose source is not available at `as_of`.
    pub fn require_available(&self, as_of: Timestamp) -> Result<(), RegistryError> {
        for spec in &self.features {
            if !self.validate_availability(spec, as_of) {
                warn!(feature = %spec.name, source = %spec.source, %as_of, "source not available");
                return Err(RegistryError::UnavailableSource {
                    feature: spec.name.clone(),
                    source_name: spec.source.clone(),
                    as_of,
                });
            }
        }
        Ok(())
    }

    /// Fills in `available_from` for referenced sources that declare none,
    /// using the earliest event observed in `store`.
    #[must_use]
    pub fn with_observed_sources(mut self, store: &EventStore) -> Self {
        let referenced = self
            .referenced_sources()
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        for source in referenced {
            let info = self.sources.get(&source).copied().unwrap_or_default();
            if info.available_from.is_some() {
                continue;
            }
            if let Some((first, _)) = store.stream(&source).and_then(EventStream::ts_range) {
                debug!(%source, available_from = %first, "observed source start");
                self.sources.insert(
                    source,
                    SourceInfo {
                        available_from: Some(first),
                        ..info
                    },
                );
            }
        }
        self
    }
}

/// Loads a registry file, choosing YAML for `.yaml`/`.yml` and JSON otherwise.
pub fn load_registry(path: &Path) -> Result<Registry, RegistryError> {
    debug!(path = %path.display(), "loading feature registry");
    let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_owned(),
        source,
    })?;
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let registry = if is_yaml {
        Registry::from_yaml_str(&content)?
    } else {
        Registry::from_json_str(&content)?
    };
    info!(
        path = %path.display(),
        features = registry.features.len(),
        sources = registry.sources.len(),
        "loaded feature registry"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use asof_data::RawEvent;

    use super::*;

    const YAML: &str = r"
sources:
  transactions: { available_from: 2015-01-01, lag_days: 1 }
features:
  - name: tx_count_30d
    source: transactions
    window: 30d
    aggregation: count()
    null_policy: fill_zero
    dtype: int
    fill_value: 0
  - name: cancel_rate
    source: transactions
    window: up_to_cutoff
    aggregation: ratio(is_cancel, one)
    null_policy: fill_constant
    dtype: float
    fill_value: -1
    ratio_default: 0
    description: Share of cancelled transactions
";

    fn spec_json(name: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "source": "user_logs",
            "window": "7d",
            "aggregation": "sum(total_secs)",
            "null_policy": "fill_median",
            "dtype": "float",
            "fill_value": 0.0,
        })
    }

    #[test]
    fn test_yaml_registry_loads() {
        let registry = Registry::from_yaml_str(YAML).unwrap();
        assert_eq!(registry.names(), ["tx_count_30d", "cancel_rate"]);
        let rate = registry.feature("cancel_rate").unwrap();
        assert_eq!(rate.null_policy, NullPolicy::FillConstant);
        assert_eq!(rate.ratio_default(), 0.0);
        assert_eq!(registry.feature("tx_count_30d").unwrap().ratio_default(), 0.0);
        assert_eq!(registry.source_info("transactions").unwrap().lag_days, 1);
    }

    #[test]
    fn test_every_required_field_is_checked() {
        for field in [
            "name",
            "source",
            "window",
            "aggregation",
            "null_policy",
            "dtype",
            "fill_value",
        ] {
            let mut spec = spec_json("f");
            spec.as_object_mut().unwrap().remove(field);
            let doc = serde_json::json!({ "features": [spec] }).to_string();
            match Registry::from_json_str(&doc) {
                Err(RegistryError::Schema { index: 0, field: f, .. }) => assert_eq!(f, field),
                other => panic!("missing {field}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_description_is_optional() {
        let doc = serde_json::json!({ "features": [spec_json("f")] }).to_string();
        let registry = Registry::from_json_str(&doc).unwrap();
        assert_eq!(registry.features()[0].description, None);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let doc = serde_json::json!({
            "features": [spec_json("a"), spec_json("b"), spec_json("a")]
        })
        .to_string();
        match Registry::from_json_str(&doc) {
            Err(RegistryError::DuplicateName {
                name,
                first,
                second,
            }) => {
                assert_eq!(name, "a");
                assert_eq!((first, second), (0, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_aggregation_rejected() {
        let mut spec = spec_json("f");
        spec["aggregation"] = "median(total_secs)".into();
        let doc = serde_json::json!({ "features": [spec] }).to_string();
        assert!(matches!(
            Registry::from_json_str(&doc),
            Err(RegistryError::InvalidField {
                field: "aggregation",
                ..
            })
        ));
    }

    #[test]
    fn test_fill_zero_requires_zero_fill_value() {
        let mut spec = spec_json("f");
        spec["null_policy"] = "fill_zero".into();
        spec["fill_value"] = 5.0.into();
        let doc = serde_json::json!({ "features": [spec.clone()] }).to_string();
        match Registry::from_json_str(&doc) {
            Err(RegistryError::InvalidField {
                field: "fill_value",
                reason,
                ..
            }) => assert!(reason.contains("fill_zero"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }

        spec["fill_value"] = 0.0.into();
        let doc = serde_json::json!({ "features": [spec] }).to_string();
        assert!(Registry::from_json_str(&doc).is_ok());
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        assert!(matches!(
            Registry::from_json_str("{ not json"),
            Err(RegistryError::Parse { format: "JSON", .. })
        ));
    }

    #[test]
    fn test_availability_respects_lag() {
        let registry = Registry::from_yaml_str(YAML).unwrap();
        let spec = registry.feature("tx_count_30d").unwrap();
        assert!(!registry.validate_availability(spec, "2015-01-01".parse().unwrap()));
        assert!(registry.validate_availability(spec, "2015-01-02".parse().unwrap()));
        assert!(registry.require_available("2017-01-01".parse().unwrap()).is_ok());
        assert!(matches!(
            registry.require_available("2014-12-31".parse().unwrap()),
            Err(RegistryError::UnavailableSource { .. })
        ));
    }

    #[test]
    fn test_unknown_source_is_unavailable_until_observed() {
        let doc = serde_json::json!({ "features": [spec_json("f")] }).to_string();
        let registry = Registry::from_json_str(&doc).unwrap();
        let as_of = "2017-01-01".parse().unwrap();
        assert!(!registry.validate_availability(&registry.features()[0], as_of));

        let mut store = EventStore::new();
        store
            .insert(EventStream::from_events(
                "user_logs",
                [RawEvent {
                    subject_id: "u1".to_owned(),
                    event_ts: "2016-05-01".parse().unwrap(),
                    event_type: "log".to_owned(),
                    payload: BTreeMap::new(),
                }],
            ))
            .unwrap();
        let registry = registry.with_observed_sources(&store);
        assert!(registry.validate_availability(&registry.features()[0], as_of));
        assert!(!registry.validate_availability(
            &registry.features()[0],
            "2016-04-30".parse().unwrap()
        ));
    }

    #[test]
    fn test_load_registry_by_extension() {
        let mut yaml = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        yaml.write_all(YAML.as_bytes()).unwrap();
        assert_eq!(load_registry(yaml.path()).unwrap().features().len(), 2);

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let doc = serde_json::json!({ "features": [spec_json("f")] }).to_string();
        json.write_all(doc.as_bytes()).unwrap();
        assert_eq!(load_registry(json.path()).unwrap().features().len(), 1);

        assert!(matches!(
            load_registry(Path::new("/nonexistent/registry.json")),
            Err(RegistryError::Io { .. })
        ));
    }

    #[test]
    fn test_dtype_cast() {
        assert_eq!(Dtype::Int.cast(2.5), 3.0);
        assert_eq!(Dtype::Int.cast(-0.4), -0.0);
        assert_eq!(Dtype::Bool.cast(-3.0), 1.0);
        assert_eq!(Dtype::Bool.cast(0.0), 0.0);
        assert_eq!(Dtype::Float.cast(0.25), 0.25);
    }
}
