use serde::{Deserialize, Serialize};

use crate::capture::CaptureRecord;
use crate::config::DeformConfig;

/// Capture records stay valid only while every part of this key is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinitKey {
    pub config: String,
    pub rest_generation: u64,
    pub mesh_generation: u64,
}

impl ReinitKey {
    pub fn new(config: &DeformConfig, rest_generation: u64, mesh_generation: u64) -> Self {
        Self {
            config: config.signature(),
            rest_generation,
            mesh_generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureState {
    pub key: ReinitKey,
    pub records: Vec<Option<CaptureRecord>>,
}

impl CaptureState {
    pub fn is_valid_for(&self, key: &ReinitKey, point_count: usize) -> bool {
        self.key == *key && self.records.len() == point_count
    }

    pub fn has_rotations(&self) -> bool {
        self.records
            .iter()
            .flatten()
            .all(|record| record.rotation.is_some())
    }

    pub fn captured_count(&self) -> usize {
        self.records.iter().filter(|record| record.is_some()).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureHit;

    fn sample_state() -> CaptureState {
        CaptureState {
            key: ReinitKey::new(&DeformConfig::default(), 3, 7),
            records: vec![
                Some(CaptureRecord {
                    rest_local: [0.0, 0.0, 0.1],
                    hits: vec![CaptureHit {
                        prim: 4,
                        u: 0.25,
                        v: 0.5,
                        weight: 1.0,
                    }],
                    rotation: None,
                }),
                None,
            ],
        }
    }

    #[test]
    fn key_changes_with_generations_and_config() {
        let config = DeformConfig::default();
        let key = ReinitKey::new(&config, 1, 1);
        assert_eq!(key, ReinitKey::new(&config, 1, 1));
        assert_ne!(key, ReinitKey::new(&config, 2, 1));
        assert_ne!(key, ReinitKey::new(&config, 1, 2));

        let grouped = DeformConfig {
            group: "tips".to_string(),
            ..DeformConfig::default()
        };
        assert_ne!(key, ReinitKey::new(&grouped, 1, 1));
    }

    #[test]
    fn validity_requires_matching_point_count() {
        let state = sample_state();
        assert!(state.is_valid_for(&state.key.clone(), 2));
        assert!(!state.is_valid_for(&state.key.clone(), 3));
        assert_eq!(state.captured_count(), 1);
        assert!(!state.has_rotations());
    }

    #[test]
    fn survives_json_persistence() {
        let state = sample_state();
        let text = state.to_json().expect("json");
        assert!(!text.contains("rotation"));
        assert_eq!(CaptureState::from_json(&text).expect("parse"), state);
    }
}
