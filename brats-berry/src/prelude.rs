//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;
pub use crate::{CascadeError, CascadeResult};

pub use crate::data::{
    concat_with_bounds, home_dataset_dir_with, Cohort, DataProvider, FeatureVariant, LoadSpec, NpzProvider,
    PatientBatch, PatientBounds, PhantomProvider,
};

pub use crate::model::{Classifier, ForestConfig, ModelStore, PassiveAggressive, RandomForest, Stage};

pub use crate::cascade::{CascadeParams, Regularizer, TwoStagePredictor};
pub use crate::post_proc::PotentialMatrix;

pub use crate::calibrate::Calibrated;
pub use crate::config::{ExperimentConfig, RegularizerKind};
pub use crate::experiment::{run_online, run_single_stage, run_two_stage, Outcome};

pub use crate::metric::{DiceScores, OverlapMetric, OverlapScores};
pub use crate::report::{Plotter, Reporter};

pub use crate::consts::label::{BACKGROUND, EDEMA, ENHANCING, NECROSIS, NON_ENHANCING};
pub use crate::consts::{MIN_TUMOR_VOXELS, SEED};
