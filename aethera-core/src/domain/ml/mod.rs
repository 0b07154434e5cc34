// aethera-core/src/domain/ml/mod.rs

pub mod ahsm;
pub mod biodiversity;
pub mod cim;
pub mod ensemble;
pub mod learner;
pub mod resm;
pub mod synthetic;

pub use ensemble::{
    CategoryBins, EnsembleModel, EnsembleSpec, LearnerPlan, ModelRun, Prediction, TrainingOrigin,
};
pub use learner::{Learner, TrainingSet};
