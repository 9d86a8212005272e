//! The threshold profile: the only mutable state of the engine.
//!
//! A profile maps threshold names to numeric cutoffs. The name set is fixed by
//! the built-in defaults; updates may change values of known names but never
//! introduce new ones — unknown names are rejected per key with a diagnostic
//! while the rest of the batch still applies.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Named numeric cutoffs parameterizing every rule predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdProfile {
    values: BTreeMap<String, f64>,
}

/// Outcome of a partial threshold update: which keys applied and which were
/// rejected, each rejection with a human-readable diagnostic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    pub applied: Vec<String>,
    pub rejected: Vec<String>,
}

impl ThresholdUpdate {
    pub fn all_applied(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        for (name, value) in DEFAULT_THRESHOLDS {
            values.insert((*name).to_string(), *value);
        }
        Self { values }
    }
}

impl ThresholdProfile {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate thresholds in stable (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Apply a batch of named updates. Known names are updated; unknown names
    /// are rejected individually and logged, never silently added.
    pub fn apply(&mut self, updates: &[(String, f64)]) -> ThresholdUpdate {
        let mut outcome = ThresholdUpdate::default();
        for (name, value) in updates {
            match self.values.get_mut(name) {
                Some(slot) => {
                    log::debug!("threshold '{name}' changed: {} -> {value}", *slot);
                    *slot = *value;
                    outcome.applied.push(name.clone());
                }
                None => {
                    log::warn!("unknown threshold '{name}' rejected (value {value})");
                    outcome.rejected.push(name.clone());
                }
            }
        }
        outcome
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read threshold profile: {}", path.display()))?;
        let profile: ThresholdProfile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse threshold profile: {}", path.display()))?;
        Ok(profile)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write threshold profile: {}", path.display()))?;
        Ok(())
    }
}

/// Built-in default cutoffs. Full-indicating cutoffs are deliberately strict
/// and empty-indicating cutoffs permissive; the imbalance compensates for how
/// often cluttered scenes trip the full-side rules.
const DEFAULT_THRESHOLDS: &[(&str, f64)] = &[
    ("area_ratio_high", 0.70),
    ("area_ratio_low", 0.55),
    ("hue_std_high", 70.0),
    ("hue_std_low", 60.0),
    ("contrast_iqr_high", 90.0),
    ("contrast_iqr_low", 80.0),
    ("edge_density_high", 0.08),
    ("edge_density_low", 0.05),
    ("mean_brightness_high", 120.0),
    ("mean_brightness_low", 100.0),
    ("texture_entropy_high", 8.5),
    ("texture_entropy_low", 5.0),
    ("color_complexity_high", 0.30),
    ("color_complexity_low", 0.04),
    ("brightness_variance_high", 1800.0),
    ("brightness_variance_low", 600.0),
    ("spatial_frequency_high", 35.0),
    ("spatial_frequency_low", 15.0),
    ("spatial_frequency_very_low", 10.0),
    ("fill_ratio_advanced_high", 0.65),
    ("fill_ratio_advanced_low", 0.35),
    ("file_size_high", 0.45),
    ("file_size_low", 0.15),
    ("edge_coherence_high", 0.80),
    ("edge_coherence_low", 0.30),
    ("red_blue_ratio_high", 1.55),
    ("saturation_high", 0.55),
    ("corner_variance_high", 0.50),
    ("corner_variance_low", 0.15),
    ("vertical_fill_high", 0.85),
    ("vertical_fill_low", 0.45),
    ("irregular_shapes_high", 0.75),
    ("symmetry_high", 0.65),
    ("background_uniformity_high", 0.55),
    ("center_emptiness_high", 0.65),
    ("perspective_strength", 0.45),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_complete() {
        let profile = ThresholdProfile::default();
        assert_eq!(profile.len(), DEFAULT_THRESHOLDS.len());
        assert_eq!(profile.get("area_ratio_high"), Some(0.70));
        assert_eq!(profile.get("center_emptiness_high"), Some(0.65));
    }

    #[test]
    fn apply_updates_known_keys() {
        let mut profile = ThresholdProfile::default();
        let outcome = profile.apply(&[("hue_std_high".to_string(), 75.0)]);
        assert!(outcome.all_applied());
        assert_eq!(profile.get("hue_std_high"), Some(75.0));
    }

    #[test]
    fn unknown_keys_are_rejected_but_valid_keys_still_apply() {
        let mut profile = ThresholdProfile::default();
        let before = profile.clone();
        let outcome = profile.apply(&[
            ("no_such_threshold".to_string(), 1.0),
            ("file_size_low".to_string(), 0.2),
        ]);
        assert_eq!(outcome.rejected, vec!["no_such_threshold".to_string()]);
        assert_eq!(outcome.applied, vec!["file_size_low".to_string()]);
        assert_eq!(profile.get("file_size_low"), Some(0.2));
        assert!(!profile.contains("no_such_threshold"));
        // Everything else untouched.
        let mut reverted = profile.clone();
        reverted.apply(&[("file_size_low".to_string(), 0.15)]);
        assert_eq!(reverted, before);
    }

    #[test]
    fn yaml_round_trip_preserves_values() {
        let profile = ThresholdProfile::default();
        let yaml = serde_yaml::to_string(&profile).unwrap();
        let back: ThresholdProfile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, profile);
    }
}
