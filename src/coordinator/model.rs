//! Collection data model
//!
//! - `CollectionDefinition`: immutable schema of a collection, as sent on the wire
//! - `CollectionRecord`: mutable lifecycle state (status, size, placements)
//! - Wire enumerations: `Distance`, `Quantization`, `StorageType`

use crate::common::error::{Error, ErrorCode, ShardError};
use crate::common::utils::validate_name;
use crate::common::wire::wire_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

wire_enum! {
    /// Distance metric of a collection.
    pub enum Distance {
        L2sq = (0, "L2sq"),
        Ip = (1, "Ip"),
        Cosine = (2, "Cosine"),
        Haversine = (3, "Haversine"),
        Divergence = (4, "Divergence"),
        Pearson = (5, "Pearson"),
        Hamming = (6, "Hamming"),
        Tanimoto = (7, "Tanimoto"),
        Sorensen = (8, "Sorensen"),
        Unknown = (-1, "Unknown"),
    }
    fallback = Unknown;
}

wire_enum! {
    /// Encoding of vector components.
    pub enum Quantization {
        None = (0, "None"),
        BF16 = (1, "BF16"),
        F16 = (2, "F16"),
        F32 = (3, "F32"),
        F64 = (4, "F64"),
        I8 = (5, "I8"),
        B1 = (6, "B1"),
        Unknown = (-1, "Unknown"),
    }
    fallback = Unknown;
}

wire_enum! {
    /// Where a collection's data primarily lives.
    pub enum StorageType {
        HighspeedMemory = (0, "highspeed_memory"),
        StableDisk = (1, "stable_disk"),
        Unknown = (-1, "Unknown"),
    }
    fallback = Unknown;
}

impl Quantization {
    /// Bits per stored vector component. Unquantized vectors are f32.
    pub fn bits(&self) -> u64 {
        match self {
            Quantization::None | Quantization::F32 | Quantization::Unknown => 32,
            Quantization::BF16 | Quantization::F16 => 16,
            Quantization::F64 => 64,
            Quantization::I8 => 8,
            Quantization::B1 => 1,
        }
    }
}

/// Immutable schema of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    #[serde(rename = "collection_name")]
    pub name: String,
    pub distance: Distance,
    pub quantization: Quantization,
    pub dim: u32,
    pub connectivity: u32,
    pub expansion_add: u32,
    pub expansion_search: u32,
    #[serde(default)]
    pub multi: bool,
    pub storage: StorageType,
}

impl CollectionDefinition {
    /// A definition with the index defaults used by most callers.
    pub fn new(name: impl Into<String>, dim: u32, distance: Distance) -> Self {
        Self {
            name: name.into(),
            distance,
            quantization: Quantization::None,
            dim,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
            storage: StorageType::HighspeedMemory,
        }
    }

    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn with_storage(mut self, storage: StorageType) -> Self {
        self.storage = storage;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        validate_name(&self.name)?;

        if !self.distance.is_known() {
            return Err(Error::InvalidDefinition("unknown distance metric".into()));
        }
        if !self.quantization.is_known() {
            return Err(Error::InvalidDefinition("unknown quantization".into()));
        }
        if !self.storage.is_known() {
            return Err(Error::InvalidDefinition("unknown storage type".into()));
        }

        for (field, value) in [
            ("dim", self.dim),
            ("connectivity", self.connectivity),
            ("expansion_add", self.expansion_add),
            ("expansion_search", self.expansion_search),
        ] {
            if value == 0 {
                return Err(Error::InvalidDefinition(format!(
                    "{} must be positive",
                    field
                )));
            }
        }

        Ok(())
    }

    /// Bytes needed to hold `elements` vectors of this collection.
    pub fn estimated_footprint(&self, elements: u64) -> u64 {
        let bytes_per_vector = (self.dim as u64 * self.quantization.bits()).div_ceil(8);
        bytes_per_vector.saturating_mul(elements)
    }
}

/// Lifecycle status of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Creating,
    Created,
    Loading,
    Loaded,
    Releasing,
    Deleting,
    Failed,
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectionStatus::Creating => "creating",
            CollectionStatus::Created => "created",
            CollectionStatus::Loading => "loading",
            CollectionStatus::Loaded => "loaded",
            CollectionStatus::Releasing => "releasing",
            CollectionStatus::Deleting => "deleting",
            CollectionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of one shard of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    Pending,
    Created,
    Loaded,
    Failed,
}

/// Error attached to a record or returned in a response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(rename = "error_message")]
    pub message: String,
    #[serde(rename = "error_code")]
    pub code: ErrorCode,
}

impl OperationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl From<&Error> for OperationError {
    fn from(e: &Error) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<&ShardError> for OperationError {
    fn from(e: &ShardError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

/// One shard of a collection on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlacement {
    pub status: ShardStatus,
    pub size: u64,
    pub memory: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<OperationError>,
}

impl ShardPlacement {
    pub fn pending() -> Self {
        Self {
            status: ShardStatus::Pending,
            size: 0,
            memory: 0,
            last_error: None,
        }
    }
}

/// Mutable lifecycle state of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub definition: CollectionDefinition,
    pub status: CollectionStatus,
    /// Every shard was created at least once; gates Load from `Failed`.
    pub provisioned: bool,
    pub size: u64,
    pub memory: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<OperationError>,
    /// node id -> shard state
    pub placements: BTreeMap<String, ShardPlacement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionRecord {
    pub fn new(definition: CollectionDefinition) -> Self {
        let now = Utc::now();
        Self {
            definition,
            status: CollectionStatus::Creating,
            provisioned: false,
            size: 0,
            memory: 0,
            last_error: None,
            placements: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.placements.keys().cloned().collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Size is the largest replica; memory is the sum over replicas.
    pub fn recompute_totals(&mut self) {
        self.size = self.placements.values().map(|p| p.size).max().unwrap_or(0);
        self.memory = self.placements.values().map(|p| p.memory).sum();
    }

    /// Status and shard placements agree.
    pub fn is_consistent(&self) -> bool {
        let all = |s: ShardStatus| self.placements.values().all(|p| p.status == s);
        match self.status {
            CollectionStatus::Loaded => !self.placements.is_empty() && all(ShardStatus::Loaded),
            CollectionStatus::Created => !self.placements.is_empty() && all(ShardStatus::Created),
            CollectionStatus::Failed => {
                self.last_error.is_some()
                    || self
                        .placements
                        .values()
                        .any(|p| p.status == ShardStatus::Failed)
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(status: ShardStatus, size: u64, memory: u64) -> ShardPlacement {
        ShardPlacement {
            status,
            size,
            memory,
            last_error: None,
        }
    }

    #[test]
    fn test_definition_wire_format() {
        let def = CollectionDefinition::new("docs", 128, Distance::Cosine)
            .with_quantization(Quantization::F32);
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["collection_name"], "docs");
        assert_eq!(json["distance"], "Cosine");
        assert_eq!(json["quantization"], "F32");
        assert_eq!(json["storage"], "highspeed_memory");

        let back: CollectionDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn test_definition_accepts_numeric_enums() {
        let json = r#"{
            "collection_name": "img",
            "distance": 6,
            "quantization": 6,
            "dim": 256,
            "connectivity": 8,
            "expansion_add": 40,
            "expansion_search": 16,
            "storage": 1
        }"#;
        let def: CollectionDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.distance, Distance::Hamming);
        assert_eq!(def.quantization, Quantization::B1);
        assert_eq!(def.storage, StorageType::StableDisk);
        assert!(!def.multi);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_definitions() {
        let good = CollectionDefinition::new("docs", 128, Distance::Cosine);
        assert!(good.validate().is_ok());

        let mut def = good.clone();
        def.dim = 0;
        assert!(matches!(def.validate(), Err(Error::InvalidDefinition(_))));

        let mut def = good.clone();
        def.distance = Distance::Unknown;
        assert!(def.validate().is_err());

        let mut def = good.clone();
        def.name = String::new();
        assert!(matches!(def.validate(), Err(Error::InvalidName(_))));

        let mut def = good;
        def.expansion_search = 0;
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_estimated_footprint() {
        let def = CollectionDefinition::new("docs", 128, Distance::Cosine)
            .with_quantization(Quantization::F32);
        assert_eq!(def.estimated_footprint(1_000), 128 * 4 * 1_000);

        let def = def.with_quantization(Quantization::B1);
        assert_eq!(def.estimated_footprint(10), 16 * 10);

        let mut odd = CollectionDefinition::new("odd", 3, Distance::Hamming)
            .with_quantization(Quantization::B1);
        assert_eq!(odd.estimated_footprint(1), 1);
        odd.dim = 9;
        assert_eq!(odd.estimated_footprint(2), 4);
    }

    #[test]
    fn test_totals_and_consistency() {
        let mut record =
            CollectionRecord::new(CollectionDefinition::new("docs", 4, Distance::L2sq));
        record
            .placements
            .insert("node-a".into(), placement(ShardStatus::Loaded, 10, 100));
        record
            .placements
            .insert("node-b".into(), placement(ShardStatus::Loaded, 12, 120));
        record.recompute_totals();
        assert_eq!(record.size, 12);
        assert_eq!(record.memory, 220);

        record.status = CollectionStatus::Loaded;
        assert!(record.is_consistent());

        record.placements.get_mut("node-b").unwrap().status = ShardStatus::Failed;
        assert!(!record.is_consistent());

        record.status = CollectionStatus::Failed;
        assert!(record.is_consistent());
    }

    #[test]
    fn test_operation_error_wire_names() {
        let err = OperationError::new(ErrorCode::MarshalError, "bad payload");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error_message"], "bad payload");
        assert_eq!(json["error_code"], "MARSHAL_ERROR");
    }
}
