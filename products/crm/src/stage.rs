use std::{collections::HashSet, fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, UnknownStageError};

/// Key of a pipeline stage, matching `Deal::stage`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    #[serde(default)]
    pub name: String,
    pub order: i32,
    #[serde(alias = "defaultProbability")]
    pub default_probability: u8,
}

impl Stage {
    pub fn new(id: impl Into<StageId>, name: impl Into<String>, order: i32, probability: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order,
            default_probability: probability,
        }
    }

    /// Won (100) or lost (0). Deals can still be dragged out of these columns.
    pub fn is_terminal(&self) -> bool {
        self.default_probability == 0 || self.default_probability == 100
    }
}

const DEFAULT_STAGES: [(&str, i32, u8); 7] = [
    ("Prospecting", 10, 10),
    ("Qualification", 20, 10),
    ("Needs Analysis", 30, 20),
    ("Value Proposition", 40, 50),
    ("Negotiation", 50, 80),
    ("Closed Won", 60, 100),
    ("Closed Lost", 70, 0),
];

/// Ordered, validated set of pipeline stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageRegistry {
    stages: Vec<Stage>,
}

impl StageRegistry {
    /// Validates and orders `stages` by `order`; equal orders keep their
    /// declaration order.
    pub fn new(stages: Vec<Stage>) -> Result<Self, RegistryError> {
        if stages.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut seen = HashSet::new();
        let mut stages = stages;
        for stage in stages.iter_mut() {
            if stage.id.as_str().trim().is_empty() {
                return Err(RegistryError::BlankId);
            }
            if stage.default_probability > 100 {
                return Err(RegistryError::ProbabilityOutOfRange {
                    stage: stage.id.clone(),
                    probability: stage.default_probability,
                });
            }
            if !seen.insert(stage.id.clone()) {
                return Err(RegistryError::DuplicateStage(stage.id.clone()));
            }
            if stage.name.trim().is_empty() {
                stage.name = stage.id.to_string();
            }
        }
        stages.sort_by_key(|stage| stage.order);
        Ok(Self { stages })
    }

    /// Parses a JSON array of stage definitions.
    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        let stages: Vec<Stage> = serde_json::from_str(raw)?;
        Self::new(stages)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn stage_by_id(&self, id: &StageId) -> Result<&Stage, UnknownStageError> {
        self.stages
            .iter()
            .find(|stage| &stage.id == id)
            .ok_or_else(|| UnknownStageError { stage: id.clone() })
    }

    pub fn ordered_stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn contains(&self, id: &StageId) -> bool {
        self.stages.iter().any(|stage| &stage.id == id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        let stages = DEFAULT_STAGES
            .iter()
            .map(|(key, order, probability)| Stage::new(*key, *key, *order, *probability))
            .collect();
        Self { stages }
    }
}
