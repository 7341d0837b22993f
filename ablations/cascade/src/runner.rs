//! 程序运行函数.

use crate::result::RunResult;
use anyhow::{Context, Result};
use brats_berry::prelude::*;
use log::info;
use std::path::Path;
use std::time::Instant;
use utils::loader;

/// 实验种类.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// 两阶段级联.
    TwoStage,

    /// 单阶段五分类森林.
    Forest,

    /// 在线学习.
    Online,
}

impl Mode {
    /// 名称.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TwoStage => "two-stage",
            Self::Forest => "forest",
            Self::Online => "online",
        }
    }
}

/// 实际运行.
pub fn run(mode: Mode, config_path: Option<&Path>, phantom: bool) -> Result<RunResult> {
    let mut config = match config_path {
        Some(p) => ExperimentConfig::from_json_file(p)
            .with_context(|| format!("Failed to read config file: {}", p.display()))?,
        None => ExperimentConfig::default(),
    };
    if config.workers == 0 {
        config.workers = utils::cpus();
    }
    config.validate().context("Invalid configuration")?;

    let provider: Box<dyn DataProvider> = if phantom {
        config.floor = PhantomProvider::MIN_TUMOR_VOXELS;
        Box::new(PhantomProvider::new())
    } else {
        let dir = loader::data_dir_from_env_or_home().context("Cannot locate the dataset directory")?;
        anyhow::ensure!(dir.is_dir(), "Dataset directory {} does not exist", dir.display());
        info!("Reading patients from {}", dir.display());
        Box::new(NpzProvider::new(dir))
    };

    let scores = config.results_dir.join("scores.txt");
    let mut reporter = Reporter::default()
        .with_results_file(&scores)
        .with_context(|| format!("Cannot open {}", scores.display()))?
        .with_plotter(config.plot.then(|| Plotter::new(&config.results_dir)));
    reporter.record(&format!(
        "# {} train={} dev={} test={} seed={} trees={}",
        mode.name(),
        config.train_ids.len(),
        config.dev_ids.len(),
        config.test_ids.len(),
        config.seed,
        config.n_trees
    ));

    let t0 = Instant::now();
    let outcome = match mode {
        Mode::TwoStage => run_two_stage(provider.as_ref(), &config, &mut reporter)?,
        Mode::Forest => run_single_stage(provider.as_ref(), &config, &mut reporter)?,
        Mode::Online => run_online(provider.as_ref(), &config, &mut reporter)?,
    };
    Ok(RunResult::new(outcome, t0.elapsed(), scores))
}
