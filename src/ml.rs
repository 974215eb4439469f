pub mod boosting;
pub mod evaluator;
pub mod featurizer;
pub mod features;
pub mod gbdt;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod reduction;
