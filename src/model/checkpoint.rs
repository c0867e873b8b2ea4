use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use log::warn;
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ForensicsError, Result};

/// Keys a training script may nest the tensor mapping under.
const NESTED_KEYS: [&str; 2] = ["state_dict", "network"];
/// Prefixes added by distributed-training and backbone wrappers.
const STRIPPED_PREFIXES: [&str; 2] = ["module.", "backbone."];

#[derive(Deserialize)]
struct TensorEntry {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Named parameter tensors read from a JSON checkpoint.
#[derive(Debug, Clone, Default)]
pub struct StateDict {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub shape_mismatch: Vec<(String, Vec<usize>, Vec<usize>)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.shape_mismatch.is_empty()
    }

    pub fn log_warnings(&self) {
        if !self.missing.is_empty() {
            warn!("Missing keys when loading weights: {:?}", self.missing);
        }
        if !self.unexpected.is_empty() {
            warn!("Unexpected keys when loading weights: {:?}", self.unexpected);
        }
        for (key, found, expected) in &self.shape_mismatch {
            warn!("Shape mismatch for {}: checkpoint {:?}, model {:?}", key, found, expected);
        }
    }
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let value: Value = serde_json::from_reader(BufReader::new(file))?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        let mapping = Self::locate_mapping(value)?;
        let mut state = Self::new();

        for (raw_key, entry) in mapping {
            let key = strip_prefixes(&raw_key);

            let tensor = serde_json::from_value::<TensorEntry>(entry)
                .map_err(|e| e.to_string())
                .and_then(|t| ArrayD::from_shape_vec(IxDyn(&t.shape), t.data).map_err(|e| e.to_string()));

            match tensor {
                Ok(tensor) => {
                    if state.tensors.insert(key.clone(), tensor).is_some() {
                        warn!("Checkpoint entry {} overwrites an earlier entry for {}", raw_key, key);
                    }
                }
                Err(e) => warn!("Skipping unreadable checkpoint entry {}: {}", key, e),
            }
        }

        Ok(state)
    }

    fn locate_mapping(value: Value) -> Result<Map<String, Value>> {
        let Value::Object(mut root) = value else {
            return Err(ForensicsError::Checkpoint("checkpoint root must be a JSON object".into()));
        };

        for key in NESTED_KEYS {
            if let Some(Value::Object(_)) = root.get(key) {
                if let Some(Value::Object(inner)) = root.remove(key) {
                    return Ok(inner);
                }
            }
        }

        let nested_model = matches!(
            root.get("model").and_then(|m| m.get("state_dict")),
            Some(Value::Object(_))
        );
        if nested_model {
            if let Some(Value::Object(inner)) = root.remove("model").and_then(|mut m| m.get_mut("state_dict").map(Value::take)) {
                return Ok(inner);
            }
        }

        Ok(root)
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(key.into(), tensor);
    }

    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Picks the tensors matching `expected` by name and shape. Anything else
    /// is recorded in the report rather than treated as an error.
    pub fn match_parameters(&self, expected: &[(String, Vec<usize>)]) -> (BTreeMap<String, ArrayD<f32>>, LoadReport) {
        let mut matched = BTreeMap::new();
        let mut report = LoadReport::default();

        for (name, shape) in expected {
            match self.tensors.get(name) {
                Some(tensor) if tensor.shape() == shape.as_slice() => {
                    matched.insert(name.clone(), tensor.clone());
                    report.loaded.push(name.clone());
                }
                Some(tensor) => {
                    report.shape_mismatch.push((name.clone(), tensor.shape().to_vec(), shape.clone()));
                }
                None => report.missing.push(name.clone()),
            }
        }

        report.unexpected = self
            .tensors
            .keys()
            .filter(|key| !expected.iter().any(|(name, _)| name == *key))
            .cloned()
            .collect();

        (matched, report)
    }
}

fn strip_prefixes(key: &str) -> String {
    let mut key = key;
    while let Some(rest) = STRIPPED_PREFIXES.iter().find_map(|p| key.strip_prefix(p)) {
        key = rest;
    }
    key.to_string()
}
