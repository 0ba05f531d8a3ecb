//! Feature engineering for model training and prediction

mod builder;
mod encoder;
mod scaler;

pub use builder::{DerivedFeatures, FeatureBuilder, FeatureMatrix, FEATURE_NAMES, NUM_FEATURES};
pub use encoder::LabelEncoder;
pub use scaler::StandardScaler;
