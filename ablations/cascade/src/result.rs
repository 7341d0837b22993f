//! 实验结果.

use brats_berry::prelude::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// 将得分表 `s` 的汇总写进 `w` 中.
fn describe_into<W: Write>(name: &str, s: &OverlapScores, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Scores `{name}` over {} patients:", s.per_patient.len())?;
    for (c, m) in s.columns.iter().zip(s.column_means()) {
        writeln!(w, "{S4}{c}: {m:.4}")?;
    }
    write!(w, "{S4}sum: {:.4}", s.total())?;
    Ok(())
}

/// 一次运行的最终结果.
pub struct RunResult {
    outcome: Outcome,
    elapsed: Duration,
    scores_file: PathBuf,
}

impl RunResult {
    pub fn new(outcome: Outcome, elapsed: Duration, scores_file: PathBuf) -> Self {
        Self {
            outcome,
            elapsed,
            scores_file,
        }
    }

    /// 打印运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut w = stdout.lock();
        utils::sep_to(&mut w)?;
        let o = &self.outcome;
        describe_into(&format!("{}, no pp", o.method), &o.raw, &mut w)?;
        writeln!(w)?;
        utils::sep_to(&mut w)?;
        describe_into(o.method, &o.refined, &mut w)?;
        writeln!(w)?;
        utils::sep_to(&mut w)?;

        if let Some(p) = o.params.as_ref() {
            writeln!(w, "Threshold: {:.2}", p.threshold)?;
            writeln!(w, "Radius: {}", p.radius)?;
            match &p.regularizer {
                Regularizer::Smoothing(m) => writeln!(w, "Potential:\n{m}")?,
                Regularizer::Closing { radius } => writeln!(w, "Label closing radius: {radius}")?,
            }
            writeln!(w, "Tumor floor: {}", p.floor)?;
            utils::sep_to(&mut w)?;
        }
        writeln!(w, "Took {:.2} seconds", self.elapsed.as_secs_f64())?;
        writeln!(w, "Scores appended to {}", self.scores_file.display())?;
        Ok(())
    }
}
