//! Weighted rule bank and scoring engine.
//!
//! Rules are data, not code: each one names a feature, a comparator and a
//! threshold from the profile, plus a hand-tuned signed weight. Positive
//! weights vote "full", negative weights vote "empty"; a rule never serves
//! both families. The engine compiles the catalog against the current profile
//! into an immutable [`RuleBank`] and publishes it behind a single reference,
//! so reconfiguration swaps whole banks and an in-flight evaluation always
//! sees either the old bank or the new one.

use crate::features::{FeatureKey, FeatureVector};
use crate::profile::{ThresholdProfile, ThresholdUpdate};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    GreaterThan,
    LessThan,
}

impl Comparator {
    fn test(self, value: f64, cutoff: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > cutoff,
            Comparator::LessThan => value < cutoff,
        }
    }
}

/// Serializable description of one rule: which feature it tests, how, against
/// which named threshold, and how strongly it votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub feature: FeatureKey,
    pub comparator: Comparator,
    pub threshold: String,
    pub weight: f64,
}

impl RuleSpec {
    pub fn new(
        name: &str,
        feature: FeatureKey,
        comparator: Comparator,
        threshold: &str,
        weight: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            feature,
            comparator,
            threshold: threshold.to_string(),
            weight,
        }
    }
}

/// One rule with its threshold name resolved to a numeric cutoff.
#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    feature: FeatureKey,
    comparator: Comparator,
    cutoff: f64,
    weight: f64,
}

impl CompiledRule {
    fn fires(&self, features: &FeatureVector) -> bool {
        self.comparator.test(features.get(self.feature), self.cutoff)
    }
}

/// Immutable compiled rule set. Rebuilt as a whole on every profile change.
#[derive(Debug)]
pub struct RuleBank {
    rules: Vec<CompiledRule>,
}

impl RuleBank {
    /// Resolve every catalog entry against the profile. A rule referencing a
    /// threshold the profile does not carry is skipped with a warning rather
    /// than failing the whole rebuild.
    fn compile(catalog: &[RuleSpec], profile: &ThresholdProfile) -> Self {
        let mut rules = Vec::with_capacity(catalog.len());
        for spec in catalog {
            match profile.get(&spec.threshold) {
                Some(cutoff) => rules.push(CompiledRule {
                    name: spec.name.clone(),
                    feature: spec.feature,
                    comparator: spec.comparator,
                    cutoff,
                    weight: spec.weight,
                }),
                None => {
                    log::warn!(
                        "rule '{}' skipped: threshold '{}' not in profile",
                        spec.name,
                        spec.threshold
                    );
                }
            }
        }
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Outcome of scoring one feature vector against the bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Normalized signed score in [-1, 1]; 0 exactly when no rule fired.
    pub score: f64,
    /// Raw signed sum of active rule weights.
    pub raw_score: f64,
    /// Sum of absolute weights of active rules.
    pub total_weight: f64,
    /// Names of the rules that fired, in catalog order.
    pub active_rules: Vec<String>,
    /// Number of active rules.
    pub rules_count: usize,
    /// Active rules with positive weight (full-indicating).
    pub positive_count: usize,
    /// Active rules with negative weight (empty-indicating).
    pub negative_count: usize,
}

/// Per-rule breakdown for error analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDetail {
    pub name: String,
    pub weight: f64,
    pub fired: bool,
    /// Effective contribution: the weight when fired, 0 otherwise.
    pub score: f64,
}

struct EngineState {
    profile: ThresholdProfile,
    catalog: Vec<RuleSpec>,
    bank: Arc<RuleBank>,
}

impl EngineState {
    fn rebuild(&mut self) {
        self.bank = Arc::new(RuleBank::compile(&self.catalog, &self.profile));
    }
}

/// Owns the rule catalog and threshold profile; scores feature vectors.
///
/// Evaluation clones the current bank's `Arc` under a read lock and runs
/// outside it, so concurrent classifications never block each other and
/// reconfiguration is atomic from their perspective.
pub struct RulesEngine {
    state: RwLock<EngineState>,
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesEngine {
    pub fn new() -> Self {
        Self::with_profile(ThresholdProfile::default())
    }

    pub fn with_profile(profile: ThresholdProfile) -> Self {
        let catalog = default_catalog();
        let bank = Arc::new(RuleBank::compile(&catalog, &profile));
        Self {
            state: RwLock::new(EngineState {
                profile,
                catalog,
                bank,
            }),
        }
    }

    fn snapshot(&self) -> Arc<RuleBank> {
        match self.state.read() {
            Ok(state) => Arc::clone(&state.bank),
            // A poisoned lock still holds a coherent bank; evaluation is
            // read-only, so keep serving it.
            Err(poisoned) => Arc::clone(&poisoned.into_inner().bank),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> T {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    /// Score a feature vector against every rule in the current bank.
    pub fn evaluate(&self, features: &FeatureVector) -> EvaluationResult {
        let bank = self.snapshot();
        let mut raw_score = 0.0;
        let mut total_weight = 0.0;
        let mut active_rules = Vec::new();
        let mut positive_count = 0usize;
        let mut negative_count = 0usize;

        for rule in &bank.rules {
            if rule.fires(features) {
                raw_score += rule.weight;
                total_weight += rule.weight.abs();
                active_rules.push(rule.name.clone());
                if rule.weight > 0.0 {
                    positive_count += 1;
                } else {
                    negative_count += 1;
                }
            }
        }

        // No active rule means a neutral outcome, not an error.
        let score = if total_weight > 0.0 {
            raw_score / total_weight
        } else {
            0.0
        };

        log::debug!(
            "evaluated {} rules: score {score:+.3} ({} active, {positive_count}+/{negative_count}-)",
            bank.len(),
            active_rules.len()
        );

        EvaluationResult {
            score,
            raw_score,
            total_weight,
            rules_count: active_rules.len(),
            positive_count,
            negative_count,
            active_rules,
        }
    }

    /// Per-rule fired/weight breakdown against the current bank.
    pub fn rule_details(&self, features: &FeatureVector) -> Vec<RuleDetail> {
        let bank = self.snapshot();
        bank.rules
            .iter()
            .map(|rule| {
                let fired = rule.fires(features);
                RuleDetail {
                    name: rule.name.clone(),
                    weight: rule.weight,
                    fired,
                    score: if fired { rule.weight } else { 0.0 },
                }
            })
            .collect()
    }

    /// Apply a batch of threshold updates. Unknown names are rejected per key
    /// (see [`ThresholdUpdate`]); the bank is rebuilt and swapped atomically.
    pub fn set_thresholds(&self, updates: &[(String, f64)]) -> ThresholdUpdate {
        self.with_state(|state| {
            let outcome = state.profile.apply(updates);
            if !outcome.applied.is_empty() {
                state.rebuild();
                log::info!(
                    "rule bank rebuilt after {} threshold update(s)",
                    outcome.applied.len()
                );
            }
            outcome
        })
    }

    /// Snapshot of the current threshold profile.
    pub fn thresholds(&self) -> ThresholdProfile {
        self.with_state(|state| state.profile.clone())
    }

    /// Restore the built-in default profile and rebuild the bank.
    pub fn reset_thresholds(&self) {
        self.with_state(|state| {
            state.profile = ThresholdProfile::default();
            state.rebuild();
        });
        log::info!("thresholds reset to built-in defaults");
    }

    /// Register an experimental rule. Rejects duplicate names, zero weights
    /// and threshold names the profile does not carry.
    pub fn add_rule(&self, spec: RuleSpec) -> Result<()> {
        self.with_state(|state| {
            if state.catalog.iter().any(|r| r.name == spec.name) {
                bail!("rule '{}' already exists", spec.name);
            }
            if spec.weight == 0.0 {
                bail!("rule '{}' must carry a nonzero weight", spec.name);
            }
            if !state.profile.contains(&spec.threshold) {
                bail!(
                    "rule '{}' references unknown threshold '{}'",
                    spec.name,
                    spec.threshold
                );
            }
            state.catalog.push(spec);
            state.rebuild();
            Ok(())
        })
    }

    /// Remove a rule by name. Removing a rule that does not exist is a no-op.
    pub fn remove_rule(&self, name: &str) {
        self.with_state(|state| {
            let before = state.catalog.len();
            state.catalog.retain(|r| r.name != name);
            if state.catalog.len() != before {
                state.rebuild();
            } else {
                log::debug!("remove_rule('{name}'): no such rule, ignoring");
            }
        });
    }

    /// The current rule catalog, in evaluation order.
    pub fn catalog(&self) -> Vec<RuleSpec> {
        self.with_state(|state| state.catalog.clone())
    }
}

/// The built-in catalog: 15 full-indicating and 20 empty-indicating rules
/// ported with their hand-tuned weights. Weight magnitudes encode how
/// discriminating each signal proved in practice, e.g. windowed fill ratio
/// and center emptiness dominate their families.
pub fn default_catalog() -> Vec<RuleSpec> {
    use Comparator::{GreaterThan as Gt, LessThan as Lt};
    type F = FeatureKey;
    let specs: &[(&str, FeatureKey, Comparator, &str, f64)] = &[
        // Full-indicating (positive weights).
        ("area_ratio_high", F::AreaRatio, Gt, "area_ratio_high", 1.5),
        ("hue_std_high", F::HueStd, Gt, "hue_std_high", 1.0),
        ("contrast_iqr_high", F::ContrastIqr, Gt, "contrast_iqr_high", 1.0),
        ("mean_brightness_low", F::MeanBrightness, Lt, "mean_brightness_low", 0.75),
        ("texture_entropy_high", F::TextureEntropy, Gt, "texture_entropy_high", 1.5),
        ("color_complexity_high", F::ColorComplexity, Gt, "color_complexity_high", 1.0),
        ("brightness_variance_high", F::BrightnessVariance, Gt, "brightness_variance_high", 0.6),
        ("fill_ratio_advanced_high", F::FillRatioAdvanced, Gt, "fill_ratio_advanced_high", 2.5),
        ("spatial_frequency_high", F::SpatialFrequency, Gt, "spatial_frequency_high", 0.3),
        ("file_size_high", F::FileSizeMb, Gt, "file_size_high", 0.8),
        ("edge_coherence_low", F::EdgeCoherence, Lt, "edge_coherence_low", 0.9),
        ("red_blue_ratio_high", F::RedBlueRatio, Gt, "red_blue_ratio_high", 0.9),
        ("saturation_high", F::SaturationMean, Gt, "saturation_high", 1.0),
        ("vertical_fill_high", F::VerticalFillRatio, Gt, "vertical_fill_high", 0.7),
        ("irregular_shapes_high", F::IrregularShapes, Gt, "irregular_shapes_high", 0.4),
        // Empty-indicating (negative weights).
        ("area_ratio_low", F::AreaRatio, Lt, "area_ratio_low", -2.5),
        ("hue_std_low", F::HueStd, Lt, "hue_std_low", -1.5),
        ("contrast_iqr_low", F::ContrastIqr, Lt, "contrast_iqr_low", -1.5),
        ("edge_density_low", F::EdgeDensity, Lt, "edge_density_low", -1.0),
        ("edge_density_high", F::EdgeDensity, Gt, "edge_density_high", -1.0),
        ("mean_brightness_high", F::MeanBrightness, Gt, "mean_brightness_high", -1.0),
        ("texture_entropy_low", F::TextureEntropy, Lt, "texture_entropy_low", -3.0),
        ("color_complexity_low", F::ColorComplexity, Lt, "color_complexity_low", -1.2),
        ("brightness_variance_low", F::BrightnessVariance, Lt, "brightness_variance_low", -2.8),
        ("spatial_frequency_low", F::SpatialFrequency, Lt, "spatial_frequency_low", -2.0),
        ("spatial_frequency_very_low", F::SpatialFrequency, Lt, "spatial_frequency_very_low", -2.2),
        ("fill_ratio_advanced_low", F::FillRatioAdvanced, Lt, "fill_ratio_advanced_low", -3.5),
        ("file_size_low", F::FileSizeMb, Lt, "file_size_low", -0.7),
        ("edge_coherence_high", F::EdgeCoherence, Gt, "edge_coherence_high", -1.8),
        ("corner_variance_low", F::CornerVariance, Lt, "corner_variance_low", -1.5),
        ("symmetry_high", F::Symmetry, Gt, "symmetry_high", -2.5),
        ("background_uniformity_high", F::BackgroundUniformity, Gt, "background_uniformity_high", -3.0),
        ("center_emptiness_high", F::CenterEmptiness, Gt, "center_emptiness_high", -3.2),
        ("vertical_fill_low", F::VerticalFillRatio, Lt, "vertical_fill_low", -2.8),
        ("perspective_lines_visible", F::PerspectiveStrength, Gt, "perspective_strength", -1.5),
    ];
    specs
        .iter()
        .map(|(name, feature, comparator, threshold, weight)| {
            RuleSpec::new(name, *feature, *comparator, threshold, *weight)
        })
        .collect()
}
