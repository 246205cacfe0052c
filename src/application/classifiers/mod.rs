// Regime classification: deterministic rules plus an optional model stage.
pub mod features;
pub mod model;
pub mod rule;

pub use model::ModelClassifier;
pub use rule::RuleClassifier;
