//! Binary decision layer on top of the rules engine.
//!
//! The decision itself is deliberately simple: normalized score >= 0 means
//! "full", otherwise "empty" — always a firm answer, never "unknown". The
//! work is in the confidence model, which starts from score magnitude and is
//! then adjusted by how the active rules agree with each other: same-side
//! ratios, the presence of strongly diagnostic "critical" rules, opposing
//! "contradictory" rules, and how sparse the evidence is overall.

use crate::features::FeatureVector;
use crate::rules::{EvaluationResult, RulesEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Full,
    Empty,
}

/// Tunable constants of the confidence formula. The defaults are the
/// hand-calibrated historical values; treat them as configuration, not
/// specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceModel {
    /// Multiplier on |score| for the base confidence.
    pub base_scale: f64,
    /// Confidence floor once any decision is made.
    pub base_floor: f64,
    /// Divisor turning the positive/negative rule ratio into a bonus.
    pub ratio_bonus_divisor: f64,
    pub ratio_bonus_cap: f64,
    /// Divisor turning the negative-rule count into a bonus.
    pub negative_bonus_divisor: f64,
    pub negative_bonus_cap: f64,
    /// Cap of the additive bonus for active critical rules.
    pub critical_bonus_cap: f64,
    /// Multiplicative discount when no critical rule backs the label.
    pub missing_critical_discount: f64,
    /// Per-rule multiplicative discount for active contradictory rules.
    pub contradiction_discount_step: f64,
    /// Extra damping applied with the sparsity penalty.
    pub sparsity_discount: f64,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self {
            base_scale: 1.5,
            base_floor: 0.3,
            ratio_bonus_divisor: 4.0,
            ratio_bonus_cap: 0.3,
            negative_bonus_divisor: 5.0,
            negative_bonus_cap: 0.3,
            critical_bonus_cap: 0.3,
            missing_critical_discount: 0.7,
            contradiction_discount_step: 0.2,
            sparsity_discount: 0.9,
        }
    }
}

/// Decision thresholds, switchable between a default and a stricter
/// high-precision calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Score above which a "full" call counts as well-supported.
    pub full_min: f64,
    /// Score below which an "empty" call counts as well-supported.
    pub empty_max: f64,
    /// Advisory floor consumers may filter on; the decision itself stays firm.
    pub confidence_min: f64,
    /// Active-rule count below which confidence is penalized.
    pub rules_count_min: usize,
    /// Negative-rule count required before the empty-side bonus applies.
    pub negative_rules_min: usize,
    pub confidence: ConfidenceModel,
}

impl ClassifierConfig {
    pub fn standard() -> Self {
        Self {
            full_min: 0.15,
            empty_max: -0.15,
            confidence_min: 0.12,
            rules_count_min: 4,
            negative_rules_min: 2,
            confidence: ConfidenceModel::default(),
        }
    }

    pub fn high_precision() -> Self {
        Self {
            full_min: 0.20,
            empty_max: -0.20,
            confidence_min: 0.15,
            rules_count_min: 5,
            negative_rules_min: 3,
            confidence: ConfidenceModel::default(),
        }
    }
}

/// Rule names whose interactions adjust confidence beyond the raw score.
///
/// "Advanced" rules gate the adjustment pass: score-only evidence (the basic
/// brightness/contrast rules) neither earns critical bonuses nor pays the
/// missing-critical discount. Critical rules are strongly diagnostic for
/// their label; contradictory rules are diagnostic for the opposite one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInteractions {
    pub advanced: Vec<String>,
    pub critical_full: Vec<String>,
    pub contradictory_full: Vec<String>,
    pub critical_empty: Vec<String>,
}

impl Default for RuleInteractions {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        Self {
            advanced: owned(&[
                "texture_entropy_high",
                "texture_entropy_low",
                "color_complexity_high",
                "color_complexity_low",
                "brightness_variance_high",
                "brightness_variance_low",
                "spatial_frequency_high",
                "spatial_frequency_low",
                "fill_ratio_advanced_high",
                "fill_ratio_advanced_low",
                "red_blue_ratio_high",
                "saturation_high",
                "corner_variance_low",
                "vertical_fill_high",
                "irregular_shapes_high",
                "symmetry_high",
                "background_uniformity_high",
                "center_emptiness_high",
                "vertical_fill_low",
                "perspective_lines_visible",
            ]),
            critical_full: owned(&[
                "fill_ratio_advanced_high",
                "vertical_fill_high",
                "irregular_shapes_high",
            ]),
            contradictory_full: owned(&[
                "symmetry_high",
                "background_uniformity_high",
                "center_emptiness_high",
            ]),
            critical_empty: owned(&[
                "symmetry_high",
                "background_uniformity_high",
                "center_emptiness_high",
                "vertical_fill_low",
            ]),
        }
    }
}

/// Terminal output of the core: the decision plus everything needed to
/// explain it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    pub confidence: f64,
    pub score: f64,
    pub positive_rules_count: usize,
    pub negative_rules_count: usize,
    /// Advanced rules that were active, for error analysis.
    pub advanced_rules: Vec<String>,
    pub evaluation: EvaluationResult,
}

/// Single-shot deterministic decision function over the injected engine.
pub struct Classifier {
    engine: Arc<RulesEngine>,
    config: ClassifierConfig,
    interactions: RuleInteractions,
}

impl Classifier {
    pub fn new(engine: Arc<RulesEngine>) -> Self {
        Self::with_config(engine, ClassifierConfig::standard())
    }

    pub fn with_config(engine: Arc<RulesEngine>, config: ClassifierConfig) -> Self {
        Self {
            engine,
            config,
            interactions: RuleInteractions::default(),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Swap the whole threshold set between calibrations at once.
    pub fn set_high_precision(&mut self, enabled: bool) {
        self.config = if enabled {
            ClassifierConfig::high_precision()
        } else {
            ClassifierConfig::standard()
        };
        log::info!(
            "classifier mode: {}",
            if enabled { "high precision" } else { "standard" }
        );
    }

    pub fn engine(&self) -> &Arc<RulesEngine> {
        &self.engine
    }

    pub fn classify(&self, features: &FeatureVector) -> ClassificationResult {
        let evaluation = self.engine.evaluate(features);
        let score = evaluation.score;
        let label = if score >= 0.0 { Label::Full } else { Label::Empty };

        let cm = &self.config.confidence;
        let pos = evaluation.positive_count;
        let neg = evaluation.negative_count;

        let mut confidence = (score.abs() * cm.base_scale + cm.base_floor).min(1.0);

        // Same-side agreement bonus.
        match label {
            Label::Full => {
                let ratio = pos as f64 / (neg.max(1)) as f64;
                if ratio >= 1.0 {
                    let bonus = (ratio / cm.ratio_bonus_divisor).min(cm.ratio_bonus_cap);
                    confidence = (confidence + bonus).min(1.0);
                }
            }
            Label::Empty => {
                if neg >= self.config.negative_rules_min {
                    let bonus =
                        (neg as f64 / cm.negative_bonus_divisor).min(cm.negative_bonus_cap);
                    confidence = (confidence + bonus).min(1.0);
                }
            }
        }

        // Critical / contradictory adjustments, gated on advanced evidence.
        let advanced_rules: Vec<String> = evaluation
            .active_rules
            .iter()
            .filter(|name| self.interactions.advanced.contains(name))
            .cloned()
            .collect();
        if !advanced_rules.is_empty() {
            let count_in = |set: &[String]| {
                advanced_rules
                    .iter()
                    .filter(|name| set.contains(name))
                    .count()
            };
            match label {
                Label::Full => {
                    let critical = count_in(&self.interactions.critical_full);
                    if critical > 0 {
                        let share =
                            critical as f64 / self.interactions.critical_full.len() as f64;
                        let bonus = share.min(1.0) * cm.critical_bonus_cap;
                        confidence = (confidence + bonus).min(1.0);
                    } else {
                        confidence *= cm.missing_critical_discount;
                    }
                    let contradictory = count_in(&self.interactions.contradictory_full);
                    if contradictory > 0 {
                        let discount =
                            1.0 - contradictory as f64 * cm.contradiction_discount_step;
                        confidence *= discount.max(0.0);
                    }
                }
                Label::Empty => {
                    let critical = count_in(&self.interactions.critical_empty);
                    if critical > 0 {
                        let share =
                            critical as f64 / self.interactions.critical_empty.len() as f64;
                        let bonus = share.min(1.0) * cm.critical_bonus_cap;
                        confidence = (confidence + bonus).min(1.0);
                    } else {
                        confidence *= cm.missing_critical_discount;
                    }
                }
            }
        }

        // Sparse evidence penalty. Zero active rules is the documented neutral
        // outcome and keeps the base floor untouched.
        let min_rules = self.config.rules_count_min;
        if evaluation.rules_count > 0 && evaluation.rules_count < min_rules {
            confidence *=
                evaluation.rules_count as f64 / min_rules as f64 * cm.sparsity_discount;
        }

        let confidence = confidence.clamp(0.0, 1.0);
        log::debug!(
            "classified {label:?} (score {score:+.3}, confidence {confidence:.3}, {pos}+/{neg}-)"
        );

        ClassificationResult {
            label,
            confidence,
            score,
            positive_rules_count: pos,
            negative_rules_count: neg,
            advanced_rules,
            evaluation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(Arc::new(RulesEngine::new()))
    }

    #[test]
    fn clearly_full_scene_is_confidently_full() {
        // All three basic full thresholds exceeded, no empty rule satisfied.
        let features = FeatureVector {
            area_ratio: 0.9,
            hue_std: 80.0,
            contrast_iqr: 95.0,
            ..FeatureVector::default()
        };
        let result = classifier().classify(&features);
        assert_eq!(result.label, Label::Full);
        assert!(result.confidence >= 0.6, "confidence {}", result.confidence);
        assert_eq!(result.positive_rules_count, 3);
        assert_eq!(result.negative_rules_count, 0);
    }

    #[test]
    fn clearly_empty_scene_is_confidently_empty() {
        let features = FeatureVector {
            area_ratio: 0.1,
            texture_entropy: 3.0,
            color_complexity: 0.01,
            fill_ratio_advanced: 0.1,
            ..FeatureVector::default()
        };
        let result = classifier().classify(&features);
        assert_eq!(result.label, Label::Empty);
        assert!(result.confidence >= 0.6, "confidence {}", result.confidence);
        assert!(result.score < 0.0);
    }

    #[test]
    fn neutral_vector_yields_full_at_the_base_floor() {
        let result = classifier().classify(&FeatureVector::default());
        assert_eq!(result.label, Label::Full);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.confidence, 0.3);
        assert_eq!(result.evaluation.rules_count, 0);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        let features = FeatureVector {
            area_ratio: 0.9,
            symmetry: 0.7,
            fill_ratio_advanced: 0.7,
            ..FeatureVector::default()
        };
        let a = c.classify(&features);
        let b = c.classify(&features);
        assert_eq!(a.label, b.label);
        assert_eq!(a.score.to_bits(), b.score.to_bits());
        assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
        assert_eq!(a.evaluation.active_rules, b.evaluation.active_rules);
    }

    #[test]
    fn confidence_stays_bounded_everywhere() {
        let c = classifier();
        let vectors = [
            FeatureVector::default(),
            FeatureVector {
                area_ratio: 1.0,
                hue_std: 200.0,
                contrast_iqr: 250.0,
                texture_entropy: 9.0,
                color_complexity: 0.9,
                fill_ratio_advanced: 0.9,
                saturation_mean: 0.9,
                vertical_fill_ratio: 0.95,
                irregular_shapes: 0.9,
                red_blue_ratio: 2.0,
                file_size_mb: 1.0,
                ..FeatureVector::default()
            },
            FeatureVector {
                area_ratio: 0.0,
                hue_std: 0.0,
                contrast_iqr: 0.0,
                texture_entropy: 0.0,
                color_complexity: 0.0,
                brightness_variance: 0.0,
                spatial_frequency: 0.0,
                fill_ratio_advanced: 0.0,
                symmetry: 1.0,
                background_uniformity: 1.0,
                center_emptiness: 1.0,
                vertical_fill_ratio: 0.0,
                perspective_strength: 0.9,
                edge_coherence: 0.9,
                corner_variance: 0.0,
                mean_brightness: 200.0,
                file_size_mb: 0.01,
                edge_density: 0.2,
                ..FeatureVector::default()
            },
        ];
        for features in &vectors {
            let result = c.classify(features);
            assert!((0.0..=1.0).contains(&result.confidence));
            assert!((-1.0..=1.0).contains(&result.score));
        }
    }

    #[test]
    fn critical_empty_rules_raise_confidence() {
        // Empty evidence without any critical empty rule.
        let plain = FeatureVector {
            texture_entropy: 3.0,
            color_complexity: 0.01,
            fill_ratio_advanced: 0.1,
            area_ratio: 0.1,
            ..FeatureVector::default()
        };
        // Same weight of evidence, but carried by critical empty rules.
        let critical = FeatureVector {
            symmetry: 0.9,
            background_uniformity: 0.9,
            center_emptiness: 0.9,
            vertical_fill_ratio: 0.1,
            ..FeatureVector::default()
        };
        let c = classifier();
        let plain_result = c.classify(&plain);
        let critical_result = c.classify(&critical);
        assert_eq!(plain_result.label, Label::Empty);
        assert_eq!(critical_result.label, Label::Empty);
        assert!(critical_result.confidence > plain_result.confidence);
    }

    #[test]
    fn contradictory_rules_discount_a_full_call() {
        let agreeing = FeatureVector {
            area_ratio: 0.9,
            hue_std: 80.0,
            contrast_iqr: 95.0,
            fill_ratio_advanced: 0.7,
            ..FeatureVector::default()
        };
        let contradicted = FeatureVector {
            symmetry: 0.7, // empty-diagnostic rule fires against the full call
            ..agreeing.clone()
        };
        let c = classifier();
        let clean = c.classify(&agreeing);
        let muddied = c.classify(&contradicted);
        assert_eq!(clean.label, Label::Full);
        assert_eq!(muddied.label, Label::Full);
        assert!(muddied.confidence < clean.confidence);
    }

    #[test]
    fn sparse_evidence_is_penalized() {
        // One weak full rule only.
        let features = FeatureVector {
            file_size_mb: 0.5,
            ..FeatureVector::default()
        };
        let result = classifier().classify(&features);
        assert_eq!(result.label, Label::Full);
        assert_eq!(result.evaluation.rules_count, 1);
        // Base would be 1.0 * 1.5 + 0.3 capped at 1.0 plus ratio bonus; the
        // sparsity penalty must pull it well below that.
        assert!(result.confidence < 0.5, "confidence {}", result.confidence);
    }

    #[test]
    fn high_precision_mode_swaps_the_whole_config() {
        let mut c = classifier();
        assert_eq!(c.config(), &ClassifierConfig::standard());
        c.set_high_precision(true);
        assert_eq!(c.config(), &ClassifierConfig::high_precision());
        assert_eq!(c.config().rules_count_min, 5);
        c.set_high_precision(false);
        assert_eq!(c.config(), &ClassifierConfig::standard());
    }

    #[test]
    fn result_serializes_flat_for_api_embedding() {
        let result = classifier().classify(&FeatureVector::default());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["label"], "full");
        assert_eq!(json["score"], 0.0);
        assert!(json["evaluation"]["active_rules"].as_array().unwrap().is_empty());
    }
}
