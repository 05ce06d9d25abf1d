//! Attach-preset catalog.
//!
//! Maps product identifiers to [`AttachPreset`]s and carries the per-class
//! anchor tuning. The default catalog is embedded at compile time from
//! `contrib/presets.toml`; a replacement file can be loaded at runtime.

use crate::anchor::AnchorTuning;
use crate::types::AttachPreset;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

const EMBEDDED_CATALOG: &str = include_str!("../../../contrib/presets.toml");

static CATALOG: OnceLock<Catalog> = OnceLock::new();

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("bad catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("default preset '{0}' is not defined in the catalog")]
    MissingDefault(String),
    #[error("invalid catalog value {field}: {reason}")]
    Invalid { field: String, reason: &'static str },
}

/// Top-level catalog file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    /// Product id used when a lookup misses.
    #[serde(default = "default_preset_id")]
    pub default_preset: String,
    #[serde(default)]
    pub tuning: AnchorTuning,
    #[serde(default)]
    pub presets: BTreeMap<String, AttachPreset>,
}

fn default_preset_id() -> String {
    "necklace".to_string()
}

impl Catalog {
    pub fn from_toml(src: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = toml::from_str(src)?;
        if !catalog.presets.contains_key(&catalog.default_preset) {
            return Err(CatalogError::MissingDefault(catalog.default_preset));
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reject tuning and presets that would produce non-finite or inverted
    /// anchor targets.
    fn validate(&self) -> Result<(), CatalogError> {
        let t = &self.tuning;
        for (name, class) in [("ear", &t.ear), ("neck", &t.neck), ("nose", &t.nose)] {
            let field = |f: &str| format!("tuning.{name}.{f}");
            positive(&field("baseline"), class.baseline)?;
            finite(&field("min_scale"), class.min_scale)?;
            positive(&field("max_scale"), class.max_scale)?;
            if class.min_scale < 0.0 {
                return Err(invalid(field("min_scale"), "must not be negative"));
            }
            if class.min_scale > class.max_scale {
                return Err(invalid(field("min_scale"), "exceeds max_scale"));
            }
        }
        finite("tuning.ear_inward_bias", t.ear_inward_bias)?;
        finite("tuning.neck_chin_bias", t.neck_chin_bias)?;
        finite("tuning.nose_lateral_shift", t.nose_lateral_shift)?;

        for (id, p) in &self.presets {
            positive(&format!("presets.{id}.scale"), p.scale)?;
            if !p.offset.is_finite() {
                return Err(invalid(format!("presets.{id}.offset"), "must be finite"));
            }
            if let Some(r) = p.rotation_offset {
                if ![r.x, r.y, r.z].iter().all(|v| v.is_finite()) {
                    return Err(invalid(format!("presets.{id}.rotation_offset"), "must be finite"));
                }
            }
        }
        Ok(())
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&src)
    }

    /// Preset for `product_id`, or the default (neck-class) preset.
    pub fn lookup(&self, product_id: &str) -> AttachPreset {
        match self.presets.get(product_id) {
            Some(p) => p.clone(),
            None => {
                tracing::debug!(product = product_id, fallback = %self.default_preset, "no preset; using default");
                self.presets
                    .get(&self.default_preset)
                    .cloned()
                    .unwrap_or_default()
            }
        }
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.presets.contains_key(product_id)
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}

fn invalid(field: String, reason: &'static str) -> CatalogError {
    CatalogError::Invalid { field, reason }
}

fn finite(field: &str, value: f32) -> Result<(), CatalogError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field.to_string(), "must be finite"))
    }
}

fn positive(field: &str, value: f32) -> Result<(), CatalogError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field.to_string(), "must be positive"))
    }
}

/// The embedded catalog, parsed once.
pub fn catalog() -> &'static Catalog {
    CATALOG.get_or_init(|| match Catalog::from_toml(EMBEDDED_CATALOG) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "embedded preset catalog is invalid; using built-in default only");
            let mut presets = BTreeMap::new();
            presets.insert(default_preset_id(), AttachPreset::default());
            Catalog {
                default_preset: default_preset_id(),
                tuning: AnchorTuning::default(),
                presets,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttachClass;
    use glam::Vec3;

    #[test]
    fn test_embedded_catalog_parses() {
        let c = Catalog::from_toml(EMBEDDED_CATALOG).unwrap();
        for id in ["ring", "necklace", "pendant", "earrings-l1", "earrings-l2", "necklace-l3"] {
            assert!(c.contains(id), "missing {id}");
        }
        assert_eq!(c.tuning, AnchorTuning::default());
    }

    #[test]
    fn test_necklace_preset_values() {
        let p = catalog().lookup("necklace");
        assert_eq!(p.attach, AttachClass::Neck);
        assert_eq!(p.offset, Vec3::new(0.0, -0.22, 0.0));
        assert!((p.scale - 1.2).abs() < 1e-6);
        assert_eq!(p.camera.map(|c| c.fov), Some(48.0));
    }

    #[test]
    fn test_missing_product_falls_back_to_neck() {
        let p = catalog().lookup("tiara-unknown");
        assert_eq!(p, catalog().lookup("necklace"));
        assert_eq!(p.attach, AttachClass::Neck);
    }

    #[test]
    fn test_rotation_offset_parsed() {
        let p = catalog().lookup("nose-stud");
        assert_eq!(p.attach, AttachClass::Nose);
        assert_eq!(p.rotation_offset.map(|r| r.z), Some(90.0));
    }

    #[test]
    fn test_missing_default_rejected() {
        let src = r#"
default_preset = "crown"
[presets.ring]
attach = "ear"
"#;
        assert!(matches!(
            Catalog::from_toml(src),
            Err(CatalogError::MissingDefault(id)) if id == "crown"
        ));
    }

    #[test]
    fn test_partial_tuning_uses_defaults() {
        let src = r#"
[tuning]
neck_chin_bias = 0.5
[presets.necklace]
attach = "neck"
"#;
        let c = Catalog::from_toml(src).unwrap();
        assert_eq!(c.tuning.neck_chin_bias, 0.5);
        assert_eq!(c.tuning.ear, AnchorTuning::default().ear);
    }

    fn rejected_field(src: &str) -> String {
        match Catalog::from_toml(src) {
            Err(CatalogError::Invalid { field, .. }) => field,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_inverted_scale_range_rejected() {
        let src = r#"
[tuning.neck]
baseline = 1.75
min_scale = 3.0
max_scale = 0.4
[presets.necklace]
attach = "neck"
"#;
        assert_eq!(rejected_field(src), "tuning.neck.min_scale");
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let nan_scale = r#"
[presets.necklace]
attach = "neck"
scale = nan
"#;
        assert_eq!(rejected_field(nan_scale), "presets.necklace.scale");

        let inf_offset = r#"
[presets.necklace]
attach = "neck"
offset = [0.0, inf, 0.0]
"#;
        assert_eq!(rejected_field(inf_offset), "presets.necklace.offset");

        let nan_bias = r#"
[tuning]
neck_chin_bias = nan
[presets.necklace]
attach = "neck"
"#;
        assert_eq!(rejected_field(nan_bias), "tuning.neck_chin_bias");
    }

    #[test]
    fn test_non_positive_scale_rejected() {
        let src = r#"
[presets.necklace]
attach = "neck"
[presets.ring]
attach = "ear"
scale = 0.0
"#;
        assert_eq!(rejected_field(src), "presets.ring.scale");

        let zero_baseline = r#"
[tuning.ear]
baseline = 0.0
min_scale = 0.1
max_scale = 1.0
[presets.necklace]
attach = "neck"
"#;
        assert_eq!(rejected_field(zero_baseline), "tuning.ear.baseline");
    }
}
