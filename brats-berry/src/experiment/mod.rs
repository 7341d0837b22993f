//! 端到端实验: 两阶段级联、单阶段森林对照与在线学习对照.
//!
//! 每个实验依次训练 (或从缓存读取) 模型, 逐个测试患者预测并记录结果,
//! 最后把全部测试患者的汇总得分写入汇报者的结果流.

mod online;
mod single_stage;
mod two_stage;

pub use online::run_online;
pub use single_stage::run_single_stage;
pub use two_stage::{calibrate_params, run_two_stage};

use crate::cascade::CascadeParams;
use crate::config::ExperimentConfig;
use crate::consts::DEFAULT_RADIUS;
use crate::data::{concat_with_bounds, DataProvider, PatientBatch};
use crate::metric::OverlapScores;
use crate::model::{train, ClassFrequencies, Classifier, ModelKey, ModelStore, RandomForest, TrainOptions};
use crate::post_proc::close_labels;
use crate::report::Reporter;
use crate::CascadeResult;
use log::info;
use ndarray::ArrayView2;
use std::time::Instant;

/// 一次实验的汇总结果.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// 方法名.
    pub method: &'static str,

    /// 未后处理 (或未正则化) 的测试集得分.
    pub raw: OverlapScores,

    /// 最终测试集得分.
    pub refined: OverlapScores,

    /// 两阶段实验实际使用的超参数.
    pub params: Option<CascadeParams>,
}

/// 从缓存读取模型; 没有可用缓存或 `fresh` 为真时返回 `None`.
fn load_cached(store: &ModelStore, key: &ModelKey, fresh: bool) -> Option<RandomForest> {
    if fresh {
        return None;
    }
    let t0 = Instant::now();
    let model = store.load::<RandomForest>(key)?;
    info!(
        "Loaded {} ({} trees), took {:.2} seconds",
        key.stage.name(),
        model.n_trees(),
        t0.elapsed().as_secs_f64()
    );
    Some(model)
}

/// 训练并缓存一个森林; 训练集分层采样时使用类别平衡权重.
fn train_cached(
    config: &ExperimentConfig,
    store: &ModelStore,
    key: &ModelKey,
    x: ArrayView2<'_, f32>,
    y: &[u8],
    classes: &[u8],
    balance: Option<(&ClassFrequencies, &[u8], &[Vec<u8>])>,
) -> CascadeResult<RandomForest> {
    let weights = balance.map(|(freqs, labels, groups)| freqs.weights(labels, groups));
    let forest = config.forest_config();
    let opts = TrainOptions::new(&forest)
        .with_weights(weights.as_deref())
        .with_cache(store, key);
    train(x, y, classes, opts)
}

/// 整个数据集的类别频率: 配置中给出时直接使用, 否则统计训练集.
fn class_frequencies(provider: &dyn DataProvider, config: &ExperimentConfig) -> CascadeResult<ClassFrequencies> {
    let counts = match config.class_counts {
        Some(c) => c,
        None => provider.class_counts(&config.train_ids)?,
    };
    info!("Class counts: {counts:?}");
    Ok(ClassFrequencies::from_counts(counts))
}

/// 单个多类模型在一个测试患者上的预测与评价. 返回 (原始预测, 闭运算后的预测).
fn evaluate_patient(
    model: &dyn Classifier,
    batch: &PatientBatch,
    radius: usize,
    reporter: &Reporter,
    method: &str,
) -> CascadeResult<(Vec<u8>, Vec<u8>)> {
    let raw = model.predict(batch.features.view());
    reporter.confusion("Confusion matrix", &batch.labels, &raw)?;
    reporter.accuracy(&batch.labels, &raw)?;
    reporter.patient_scores("Dice scores:", &batch.labels, &raw)?;

    let closed = close_labels(&batch.coords, batch.dims, &raw, radius)?;
    reporter.patient_scores("Dice scores (pp):", &batch.labels, &closed)?;
    reporter.plot(batch.id, method, &batch.coords, batch.dims, &batch.labels, &raw, &closed);
    Ok((raw, closed))
}

/// 在全部测试患者上评价单个多类模型.
fn evaluate_single_model(
    model: &dyn Classifier,
    provider: &dyn DataProvider,
    config: &ExperimentConfig,
    reporter: &mut Reporter,
    method: &'static str,
) -> CascadeResult<Outcome> {
    let spec = config.eval_spec();
    let mut truths = Vec::with_capacity(config.test_ids.len());
    let mut raws = Vec::with_capacity(config.test_ids.len());
    let mut closed = Vec::with_capacity(config.test_ids.len());
    info!("Test users:");
    for (i, &id) in config.test_ids.iter().enumerate() {
        info!("Test patient number {} (#{id})", i + 1);
        let batch = provider.load_patient(id, &spec)?;
        let (r, c) = evaluate_patient(model, &batch, DEFAULT_RADIUS, reporter, method)?;
        raws.push(r);
        closed.push(c);
        truths.push(batch.labels);
    }

    let (truth, bounds) = concat_with_bounds(&truths);
    let (raw, _) = concat_with_bounds(&raws);
    let (refined, _) = concat_with_bounds(&closed);
    reporter.confusion("Overall confusion matrix", &truth, &refined)?;
    let raw = reporter.cohort_scores(&format!("Overall dice scores ({method}, no pp):"), &truth, &raw, &bounds)?;
    let refined = reporter.cohort_scores(&format!("Overall dice scores ({method}):"), &truth, &refined, &bounds)?;
    Ok(Outcome {
        method,
        raw,
        refined,
        params: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PhantomProvider;
    use crate::model::Stage;
    use crate::report::Plotter;
    use crate::CascadeError;
    use std::fs;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("brats-berry-{name}-{}", std::process::id()))
    }

    fn small_config(dir: &std::path::Path) -> ExperimentConfig {
        ExperimentConfig {
            train_ids: vec![1, 2, 3],
            dev_ids: vec![4],
            test_ids: vec![5, 6],
            n_trees: 5,
            voxel_cap: Some(3000),
            online_voxel_cap: 2000,
            floor: PhantomProvider::MIN_TUMOR_VOXELS,
            workers: 2,
            model_dir: dir.join("models"),
            results_dir: dir.join("results"),
            thresholds: vec![0.5, 0.6],
            radii: vec![1, 2],
            potential_factors: vec![0.02, 0.04],
            ..Default::default()
        }
    }

    #[test]
    fn test_two_stage_end_to_end() {
        let dir = temp_dir("two-stage");
        let config = small_config(&dir);
        let provider = PhantomProvider::new();
        let mut reporter = Reporter::default()
            .with_results_file(dir.join("results").join("scores.txt"))
            .unwrap();

        let first = run_two_stage(&provider, &config, &mut reporter).unwrap();
        assert_eq!(first.refined.per_patient.len(), 2);
        assert!(first.refined.column_means()[0] > 0.8);
        let params = first.params.clone().unwrap();
        assert!(config.thresholds.contains(&params.threshold));
        assert!(config.radii.contains(&params.radius));

        let store = ModelStore::new(&config.model_dir);
        for stage in [Stage::Detection, Stage::Subtyping] {
            assert!(store.path(&config.model_key(stage)).unwrap().exists());
        }
        // 未设置可视化时不绘制校准图.
        let validation = config.results_dir.join("validation");
        assert!(!validation.exists());

        // 第二次运行从缓存读取模型, 结果不变.
        let mut plotting = Reporter::default().with_plotter(Some(Plotter::new(&config.results_dir)));
        let second = run_two_stage(&provider, &config, &mut plotting).unwrap();
        assert_eq!(first.refined, second.refined);
        assert_eq!(first.raw, second.raw);
        assert!(validation.join(Plotter::file_name(4, "MRF-1")).exists());
        assert!(validation.join(Plotter::file_name(4, "MRF-2")).exists());

        let scores = fs::read_to_string(dir.join("results").join("scores.txt")).unwrap();
        assert!(scores.contains("Overall dice scores (two-stage):"));
        assert!(scores.contains("Overall dice scores (th=0.50):"));
        assert!(scores.contains("Overall dice scores (radius baseline):"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_two_stage_defaults_without_dev() {
        let dir = temp_dir("no-dev");
        let config = ExperimentConfig {
            dev_ids: vec![],
            fresh_models: true,
            ..small_config(&dir)
        };
        let out = run_two_stage(&PhantomProvider::new(), &config, &mut Reporter::default()).unwrap();
        assert_eq!(out.params, Some(config.default_params()));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_config_rejected_before_training() {
        let dir = temp_dir("invalid");
        let config = ExperimentConfig {
            thresholds: vec![],
            ..small_config(&dir)
        };
        let provider = PhantomProvider::new();
        assert!(matches!(
            run_two_stage(&provider, &config, &mut Reporter::default()),
            Err(CascadeError::InvalidConfig(_))
        ));
        assert!(run_single_stage(&provider, &config, &mut Reporter::default()).is_err());
        assert!(run_online(&provider, &config, &mut Reporter::default()).is_err());
        assert!(!config.model_dir.exists());
    }

    #[test]
    fn test_single_stage_stratified() {
        let dir = temp_dir("single");
        let config = ExperimentConfig {
            stratified: true,
            fresh_models: true,
            ..small_config(&dir)
        };
        let out = run_single_stage(&PhantomProvider::new(), &config, &mut Reporter::default()).unwrap();
        assert_eq!(out.method, "RF");
        assert_eq!(out.raw.per_patient.len(), 2);
        assert!(out.refined.column_means()[0] > 0.8);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_online() {
        let dir = temp_dir("online");
        let config = small_config(&dir);
        let out = run_online(&PhantomProvider::new(), &config, &mut Reporter::default()).unwrap();
        assert_eq!(out.method, "online");
        assert_eq!(out.refined.per_patient.len(), 2);
        assert!(out.refined.total().is_finite());
        assert!(!config.model_dir.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
