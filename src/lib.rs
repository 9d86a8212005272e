pub mod classifier;
pub mod features;
pub mod image;
pub mod profile;
pub mod rules;

pub use classifier::{
    ClassificationResult, Classifier, ClassifierConfig, ConfidenceModel, Label, RuleInteractions,
};
pub use features::{FeatureExtractor, FeatureKey, FeatureVector, ImageMetadata};
pub use image::PixelBuffer;
pub use profile::{ThresholdProfile, ThresholdUpdate};
pub use rules::{Comparator, EvaluationResult, RuleDetail, RuleSpec, RulesEngine};
