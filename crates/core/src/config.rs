use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformConfig {
    pub group: String,
    pub use_multiple_samples: bool,
    pub min_distance_threshold: f32,
    pub sample_ray_scale: f32,
    pub piece_attribute: Option<String>,
    pub drive_by_attributes: bool,
    pub normal_attribute: String,
    pub up_attribute: String,
    pub rigid_projection: bool,
    pub attributes_to_transport: String,
}

impl Default for DeformConfig {
    fn default() -> Self {
        Self {
            group: String::new(),
            use_multiple_samples: false,
            min_distance_threshold: 0.001,
            sample_ray_scale: 10.0,
            piece_attribute: None,
            drive_by_attributes: false,
            normal_attribute: "N".to_string(),
            up_attribute: "up".to_string(),
            rigid_projection: false,
            attributes_to_transport: "*".to_string(),
        }
    }
}

impl DeformConfig {
    /// Stable text form of every setting; part of the reinitialization key.
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    pub fn multi_sample_enabled(&self) -> bool {
        self.use_multiple_samples && !self.drive_by_attributes
    }

    pub fn piece_attribute(&self) -> Option<&str> {
        self.piece_attribute
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: DeformConfig =
            serde_json::from_str(r#"{"use_multiple_samples": true, "piece_attribute": "name"}"#)
                .expect("config");
        assert!(config.use_multiple_samples);
        assert_eq!(config.piece_attribute(), Some("name"));
        assert_eq!(config.normal_attribute, "N");
        assert_eq!(config.sample_ray_scale, 10.0);
        assert_eq!(config.attributes_to_transport, "*");
    }

    #[test]
    fn driving_by_attributes_disables_multi_sample() {
        let config = DeformConfig {
            use_multiple_samples: true,
            drive_by_attributes: true,
            ..DeformConfig::default()
        };
        assert!(!config.multi_sample_enabled());
    }

    #[test]
    fn signature_tracks_every_field() {
        let base = DeformConfig::default();
        let changed = DeformConfig {
            rigid_projection: true,
            ..DeformConfig::default()
        };
        assert_eq!(base.signature(), DeformConfig::default().signature());
        assert_ne!(base.signature(), changed.signature());
    }

    #[test]
    fn blank_piece_attribute_is_ignored() {
        let config = DeformConfig {
            piece_attribute: Some("  ".to_string()),
            ..DeformConfig::default()
        };
        assert_eq!(config.piece_attribute(), None);
    }
}
