//! Training, evaluation and hyperparameter search

mod data;
mod metrics;
mod split;
mod train;
mod tuning;

pub use data::{PreparedData, SplitSummary};
pub use metrics::regression_metrics;
pub use split::{k_fold, train_test_split, SplitIndices, DEFAULT_TEST_FRACTION, MIN_HOLDOUT_SAMPLES};
pub use train::{
    best_model, collect_results, fit_and_evaluate, train_all, TrainingReport, TrainingSummary,
};
pub use tuning::{
    tune_hyperparameters, ModelTuning, TuningConfig, TuningReport, DEFAULT_CV_FOLDS,
    DEFAULT_MAX_COMBINATIONS,
};
