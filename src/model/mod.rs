//! Model specification and the engine seam

pub mod engine;
pub mod spec;

pub use engine::TrainedModel;
pub use spec::{
    specify, Algorithm, EngineOptions, Hyperparameter, Importance, Mode, ModelSpec, ParamRange,
    ParamSet, ParamValue,
};
