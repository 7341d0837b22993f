use super::{evaluate_single_model, Outcome};
use crate::config::ExperimentConfig;
use crate::consts::label::ALL_LABELS;
use crate::data::DataProvider;
use crate::model::PassiveAggressive;
use crate::report::Reporter;
use crate::{CascadeError, CascadeResult};
use log::info;
use std::time::Instant;

/// 在线学习对照实验.
///
/// 逐个读取训练患者 (每患者最多 `online_voxel_cap` 个体素): 第一个患者完整
/// 训练, 之后每个患者做一次增量更新. 不做级联与平滑.
pub fn run_online(
    provider: &dyn DataProvider,
    config: &ExperimentConfig,
    reporter: &mut Reporter,
) -> CascadeResult<Outcome> {
    config.validate()?;
    let spec = config.online_spec();
    let mut model: Option<PassiveAggressive> = None;
    for (i, &id) in config.train_ids.iter().enumerate() {
        info!("Train patient number {} (#{id})", i + 1);
        let batch = provider.load_patient(id, &spec)?;
        let t0 = Instant::now();
        match model.as_mut() {
            Some(m) => m.partial_fit(batch.features.view(), &batch.labels)?,
            None => {
                let mut m = PassiveAggressive::new(&ALL_LABELS, batch.n_features());
                m.fit(batch.features.view(), &batch.labels)?;
                model = Some(m);
            }
        }
        info!("Training took {:.2} seconds", t0.elapsed().as_secs_f64());
    }
    info!("{}", "-".repeat(34));

    let model = model.ok_or(CascadeError::EmptyTrainingSet)?;
    evaluate_single_model(&model, provider, config, reporter, "online")
}
