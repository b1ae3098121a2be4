//! Input documents: the configuration (parameter values) and the master
//! specification (generation targets, layers and scans).

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use studygen::ParamValue;

use crate::error::DocumentError;

// ---------------------------------------------------------------------------
// Master specification
// ---------------------------------------------------------------------------

/// The master specification: optional layers plus every generation target.
#[derive(Debug, Clone, Default)]
pub struct MasterSpec {
    /// Ordered layers forming the output directory tree. Empty when the
    /// document has no `structure` key.
    pub structure: IndexMap<String, LayerSpec>,
    /// Generation targets, keyed by name, in declaration order.
    pub targets: IndexMap<String, TargetSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    #[serde(default, deserialize_with = "names::list")]
    pub generations: Vec<String>,
    #[serde(default)]
    pub scans: IndexMap<String, ScanSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Script key → call-site binding. A key `name__suffix` invokes `name`.
    #[serde(default, alias = "blocks")]
    pub script: IndexMap<String, Option<Invocation>>,
    #[serde(default)]
    pub new_blocks: IndexMap<String, NewBlockSpec>,
    /// Outputs of the generated `main`. Absent means none.
    #[serde(default, alias = "outputs", deserialize_with = "names::optional")]
    pub output: Option<Vec<String>>,
    #[serde(default)]
    pub scans: IndexMap<String, ScanSpec>,
}

/// Binding of one script entry. `None` keeps the block's current names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Invocation {
    #[serde(default, deserialize_with = "names::optional")]
    pub args: Option<Vec<String>>,
    #[serde(default, alias = "outputs", deserialize_with = "names::optional")]
    pub output: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewBlockSpec {
    #[serde(default, alias = "blocks")]
    pub script: IndexMap<String, Option<Invocation>>,
    #[serde(default, alias = "outputs", deserialize_with = "names::optional")]
    pub output: Option<Vec<String>>,
    /// Expected parameter names of the merged block, in the wanted order.
    #[serde(default, deserialize_with = "names::optional")]
    pub params: Option<Vec<String>>,
    #[serde(default)]
    pub docstring: Option<String>,
}

/// One scan axis as written: exactly one of `list` or `linspace`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanSpec {
    #[serde(default)]
    pub list: Option<Vec<Value>>,
    #[serde(default)]
    pub linspace: Option<Vec<Value>>,
    #[serde(default)]
    pub for_each_beam: bool,
    #[serde(default)]
    pub twins: Option<Vec<String>>,
}

/// The base block name of a script key: `power__2` invokes `power`.
pub fn script_block_name(key: &str) -> &str {
    match key.split_once("__") {
        Some((base, _)) if !base.is_empty() => base,
        _ => key,
    }
}

impl MasterSpec {
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = read(path)?;
        Self::from_yaml(&text, path)
    }

    /// Parse the master document. Duplicate keys anywhere in the document
    /// are rejected before any typed interpretation.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, DocumentError> {
        let mapping = parse_mapping(text, path)?;

        let mut master = MasterSpec::default();
        for (key, value) in mapping {
            let key = key_string(&key);
            if key == "structure" {
                master.structure = serde_yaml::from_value(value).map_err(|err| {
                    shape(path, format!("in 'structure': {}", err))
                })?;
                continue;
            }
            let target: TargetSpec = match value {
                Value::Null => TargetSpec::default(),
                value => serde_yaml::from_value(value)
                    .map_err(|err| shape(path, format!("in target '{}': {}", key, err)))?,
            };
            master.targets.insert(key, target);
        }

        for (layer, spec) in &master.structure {
            for generation in &spec.generations {
                if !master.targets.contains_key(generation) {
                    return Err(shape(
                        path,
                        format!(
                            "layer '{}' generates '{}', which is not defined",
                            layer, generation
                        ),
                    ));
                }
            }
        }

        Ok(master)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Nested parameter values, searched by name.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    root: Mapping,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = read(path)?;
        Self::from_yaml(&text, path)
    }

    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, DocumentError> {
        Ok(Configuration {
            root: parse_mapping(text, path)?,
        })
    }

    /// Depth-first lookup: keys of a mapping are checked before its nested
    /// mappings are entered. A null value counts as absent.
    pub fn lookup(&self, name: &str) -> Option<ParamValue> {
        find(&self.root, name).map(to_param_value)
    }
}

fn find<'a>(mapping: &'a Mapping, name: &str) -> Option<&'a Value> {
    if let Some(value) = mapping.get(name) {
        if !value.is_null() {
            return Some(value);
        }
    }
    mapping.values().find_map(|value| match untag(value) {
        Value::Mapping(nested) => find(nested, name),
        _ => None,
    })
}

/// Convert a YAML value to a parameter literal.
pub fn to_param_value(value: &Value) -> ParamValue {
    match untag(value) {
        Value::Null => ParamValue::None,
        Value::Bool(b) => ParamValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ParamValue::Int(i),
            None => ParamValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => ParamValue::Str(s.clone()),
        Value::Sequence(items) => ParamValue::List(items.iter().map(to_param_value).collect()),
        Value::Mapping(entries) => ParamValue::Map(
            entries
                .iter()
                .map(|(k, v)| (key_string(k), to_param_value(v)))
                .collect(),
        ),
        Value::Tagged(_) => ParamValue::None,
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn key_string(key: &Value) -> String {
    match untag(key) {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => to_param_value(other).literal(),
    }
}

// ---------------------------------------------------------------------------
// Loading helpers
// ---------------------------------------------------------------------------

fn read(path: &Path) -> Result<String, DocumentError> {
    fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_mapping(text: &str, path: &Path) -> Result<Mapping, DocumentError> {
    let value: Value =
        serde_yaml::from_str(text).map_err(|err| DocumentError::from_yaml(path.to_path_buf(), err))?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(shape(path, "the document must be a mapping")),
    }
}

fn shape(path: &Path, message: impl Into<String>) -> DocumentError {
    DocumentError::Shape {
        path: PathBuf::from(path),
        message: message.into(),
    }
}

/// Name lists written as a sequence, a single name, a comma-separated
/// string, or null.
mod names {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawNames {
        Many(Vec<String>),
        One(String),
    }

    fn normalize(raw: Option<RawNames>) -> Vec<String> {
        let names: Vec<String> = match raw {
            None => Vec::new(),
            Some(RawNames::Many(names)) => names,
            Some(RawNames::One(joined)) => joined.split(',').map(str::to_string).collect(),
        };
        names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Option::<RawNames>::deserialize(deserializer).map(normalize)
    }

    pub fn optional<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<String>>, D::Error> {
        list(deserializer).map(Some)
    }
}
