pub mod env;
pub mod predictor_config;
