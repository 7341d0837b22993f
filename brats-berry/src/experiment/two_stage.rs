use super::{class_frequencies, load_cached, train_cached, Outcome};
use crate::calibrate::{sweep_potential, sweep_radius, sweep_threshold};
use crate::cascade::{CascadeParams, TwoStagePredictor};
use crate::config::{ExperimentConfig, RegularizerKind};
use crate::consts::label::{is_tumor, BINARY_LABELS, SUB_LABELS, TUMOR};
use crate::consts::{DEFAULT_RADIUS, PLOTTED_DEV_PATIENTS};
use crate::data::{concat_with_bounds, min_tumor_voxels, DataProvider, PatientBatch};
use crate::model::{ClassFrequencies, ModelStore, RandomForest, Stage};
use crate::post_proc::PotentialMatrix;
use crate::report::{Plotter, Reporter};
use crate::CascadeResult;
use log::info;
use ndarray::Axis;

/// 两阶段级联实验.
///
/// 1. 从缓存读取两个模型; 任一缺失 (或要求重新训练) 时读取训练集并训练两者;
/// 2. 有开发集时校准超参数, 否则使用默认值;
/// 3. 逐个测试患者预测, 最后记录正则化前后的汇总得分.
pub fn run_two_stage(
    provider: &dyn DataProvider,
    config: &ExperimentConfig,
    reporter: &mut Reporter,
) -> CascadeResult<Outcome> {
    config.validate()?;
    let (model1, model2) = load_or_train(provider, config)?;
    info!("{}", "-".repeat(34));

    let predictor = TwoStagePredictor::new(&model1, &model2)?;
    let params = if config.dev_ids.is_empty() {
        info!("No development patients, using default hyperparameters");
        config.default_params()
    } else {
        calibrate_params(provider, config, &predictor, reporter)?
    };
    info!(
        "Hyperparameters: threshold = {:.2}, radius = {}, regularizer = {}, floor = {}",
        params.threshold,
        params.radius,
        params.regularizer.method_name(),
        params.floor
    );

    let spec = config.eval_spec();
    let n = config.test_ids.len();
    let (mut truths, mut befores, mut finals) = (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
    info!("Test users:");
    for (i, &id) in config.test_ids.iter().enumerate() {
        info!("Test patient number {} (#{id})", i + 1);
        let batch = provider.load_patient(id, &spec)?;
        let pred = predictor.predict(&batch, &params, reporter)?;
        reporter.plot(
            id,
            params.regularizer.method_name(),
            &batch.coords,
            batch.dims,
            &batch.labels,
            &pred.before,
            &pred.labels,
        );
        befores.push(pred.before);
        finals.push(pred.labels);
        truths.push(batch.labels);
    }

    let (truth, bounds) = concat_with_bounds(&truths);
    let (before, _) = concat_with_bounds(&befores);
    let (labels, _) = concat_with_bounds(&finals);
    reporter.confusion("Overall confusion matrix", &truth, &labels)?;
    let raw = reporter.cohort_scores("Overall dice scores (two-stage, no pp):", &truth, &before, &bounds)?;
    let refined = reporter.cohort_scores("Overall dice scores (two-stage):", &truth, &labels, &bounds)?;
    Ok(Outcome {
        method: "two-stage",
        raw,
        refined,
        params: Some(params),
    })
}

fn load_or_train(provider: &dyn DataProvider, config: &ExperimentConfig) -> CascadeResult<(RandomForest, RandomForest)> {
    let store = ModelStore::new(&config.model_dir);
    let key1 = config.model_key(Stage::Detection);
    let key2 = key1.for_stage(Stage::Subtyping);
    if let (Some(m1), Some(m2)) = (
        load_cached(&store, &key1, config.fresh_models),
        load_cached(&store, &key2, config.fresh_models),
    ) {
        return Ok((m1, m2));
    }

    let cohort = provider.load_patients(&config.train_ids, &config.train_spec())?;
    info!(
        "Loaded {} training voxels from {} patients",
        cohort.len(),
        cohort.n_patients()
    );
    if let Some(min) = min_tumor_voxels(&cohort.labels, &cohort.bounds) {
        info!("Minimum number of voxels in a tumor: {min}");
    }
    let freqs: Option<ClassFrequencies> = if config.stratified {
        Some(class_frequencies(provider, config)?)
    } else {
        None
    };

    let y1: Vec<u8> = cohort.labels.iter().map(|&l| u8::from(is_tumor(l)) * TUMOR).collect();
    let groups1 = ClassFrequencies::detection_groups();
    let model1 = train_cached(
        config,
        &store,
        &key1,
        cohort.features.view(),
        &y1,
        &BINARY_LABELS,
        freqs.as_ref().map(|f| (f, cohort.labels.as_slice(), groups1.as_slice())),
    )?;

    let tumor_idx: Vec<usize> = (0..cohort.len()).filter(|&i| is_tumor(cohort.labels[i])).collect();
    let x2 = cohort.features.select(Axis(0), &tumor_idx);
    let y2: Vec<u8> = tumor_idx.iter().map(|&i| cohort.labels[i]).collect();
    let groups2 = ClassFrequencies::subtyping_groups();
    let model2 = train_cached(
        config,
        &store,
        &key2,
        x2.view(),
        &y2,
        &SUB_LABELS,
        freqs.as_ref().map(|f| (f, y2.as_slice(), groups2.as_slice())),
    )?;
    Ok((model1, model2))
}

/// 在开发集上依次校准势函数、闭运算半径和检测阈值.
///
/// 阈值扫描使用校准得到的半径. 正则化方式为闭运算时跳过势函数扫描.
/// 设置了可视化时, 势函数扫描的图片写入 `{results_dir}/validation`.
pub fn calibrate_params(
    provider: &dyn DataProvider,
    config: &ExperimentConfig,
    predictor: &TwoStagePredictor<'_>,
    reporter: &mut Reporter,
) -> CascadeResult<CascadeParams> {
    let spec = config.eval_spec();
    let dev = config
        .dev_ids
        .iter()
        .map(|&id| provider.load_patient(id, &spec))
        .collect::<CascadeResult<Vec<PatientBatch>>>()?;

    let potential = match config.regularizer {
        RegularizerKind::Smoothing => {
            let plotter = reporter
                .plots()
                .then(|| Plotter::new(config.results_dir.join("validation")));
            let n_plots = if config.plot_all_dev {
                dev.len()
            } else {
                PLOTTED_DEV_PATIENTS
            };
            sweep_potential(
                predictor,
                &dev,
                &config.potential_candidates(),
                DEFAULT_RADIUS,
                reporter,
                plotter.as_ref().map(|p| (p, n_plots)),
            )?
            .best
        }
        RegularizerKind::Closing => PotentialMatrix::calibrated_default(),
    };
    let radius = sweep_radius(predictor, &dev, &config.radii, reporter)?.best;
    let threshold = sweep_threshold(predictor, &dev, &config.thresholds, radius, reporter)?.best;
    Ok(CascadeParams {
        threshold,
        radius,
        regularizer: config.regularizer(potential, radius),
        floor: config.floor,
    })
}
