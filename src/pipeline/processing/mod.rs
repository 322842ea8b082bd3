// Processing stages: normalize, metadata, rating prediction, correction, masking

pub mod correction;
pub mod masking;
pub mod metadata;
pub mod normalize;
pub mod rating;

pub use correction::{AgentParams, CorrectionAgent, ValueTable};
pub use masking::TextMasker;
pub use normalize::RecordNormalizer;
pub use rating::RatingPredictor;
