pub mod ml_model;
pub mod training;
pub mod inference;

pub use ml_model::{ModelConfig, Normalization, WildfireRegressor, NORMALIZATION_EPSILON};
pub use training::{train_and_save, train_model, evaluate, EvaluationMetrics, TrainingReport, WildfireDataset};
pub use inference::Predictor;
