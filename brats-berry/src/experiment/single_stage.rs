use super::{class_frequencies, evaluate_single_model, load_cached, train_cached, Outcome};
use crate::config::ExperimentConfig;
use crate::consts::label::ALL_LABELS;
use crate::data::DataProvider;
use crate::model::{ClassFrequencies, ModelStore, Stage};
use crate::report::Reporter;
use crate::CascadeResult;
use log::info;

/// 单阶段五分类森林对照实验.
///
/// 每个测试患者取最大概率类别, 再逐标签闭运算; 汇总得分分别记录两者.
pub fn run_single_stage(
    provider: &dyn DataProvider,
    config: &ExperimentConfig,
    reporter: &mut Reporter,
) -> CascadeResult<Outcome> {
    config.validate()?;
    let store = ModelStore::new(&config.model_dir);
    let key = config.model_key(Stage::SingleStage);
    let model = match load_cached(&store, &key, config.fresh_models) {
        Some(m) => m,
        None => {
            let cohort = provider.load_patients(&config.train_ids, &config.train_spec())?;
            let groups = ClassFrequencies::single_stage_groups();
            let freqs = if config.stratified {
                Some(class_frequencies(provider, config)?)
            } else {
                None
            };
            train_cached(
                config,
                &store,
                &key,
                cohort.features.view(),
                &cohort.labels,
                &ALL_LABELS,
                freqs
                    .as_ref()
                    .map(|f| (f, cohort.labels.as_slice(), groups.as_slice())),
            )?
        }
    };
    info!("{}", "-".repeat(34));
    evaluate_single_model(&model, provider, config, reporter, "RF")
}
