//! Per-block summary statistics over trial result logs.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::types::TrialResult;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockStatistics {
    pub block_id: u8,
    pub title: String,
    pub trials: usize,
    /// Trials answered correctly on the first attempt.
    pub first_attempt_correct: usize,
    pub accuracy: f64,
    pub mean_rt_ms: f64,
    pub median_rt_ms: f64,
    pub std_dev_rt_ms: f64,
    pub min_rt_ms: f64,
    pub max_rt_ms: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunStatistics {
    pub participants: usize,
    pub seed: u64,
    pub total_results: usize,
    pub blocks: Vec<BlockStatistics>,
}

/// Summaries for every block present in `results`, ordered by block id.
/// Accepts one log or several concatenated.
pub fn block_statistics<'a, I>(results: I) -> Vec<BlockStatistics>
where
    I: IntoIterator<Item = &'a TrialResult>,
{
    let mut by_block: BTreeMap<u8, (String, Vec<f64>, usize)> = BTreeMap::new();
    for r in results {
        let entry = by_block
            .entry(r.block_id)
            .or_insert_with(|| (r.block_title.clone(), Vec::new(), 0));
        entry.1.push(r.reaction_time_ms);
        if r.is_correct {
            entry.2 += 1;
        }
    }

    by_block
        .into_iter()
        .map(|(block_id, (title, mut rts, correct))| {
            rts.sort_by(|a, b| a.total_cmp(b));
            let n = rts.len();
            let mean = rts.iter().sum::<f64>() / n as f64;
            let var = rts.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
            let median = if n % 2 == 1 {
                rts[n / 2]
            } else {
                (rts[n / 2 - 1] + rts[n / 2]) / 2.0
            };
            BlockStatistics {
                block_id,
                title,
                trials: n,
                first_attempt_correct: correct,
                accuracy: correct as f64 / n as f64,
                mean_rt_ms: mean,
                median_rt_ms: median,
                std_dev_rt_ms: var.sqrt(),
                min_rt_ms: rts[0],
                max_rt_ms: rts[n - 1],
            }
        })
        .collect()
}

/// Write statistics as pretty JSON, creating parent directories.
pub fn save_statistics(stats: &RunStatistics, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(stats).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn r(block_id: u8, rt: f64, is_correct: bool) -> TrialResult {
        TrialResult {
            block_id,
            block_title: format!("block {}", block_id),
            stimulus_id: "s".into(),
            category: Category::Swamp,
            is_correct,
            reaction_time_ms: rt,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn groups_by_block_in_id_order() {
        let log = vec![r(2, 500.0, true), r(1, 400.0, true), r(1, 600.0, false), r(1, 800.0, true)];
        let stats = block_statistics(&log);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].block_id, 1);
        assert_eq!(stats[0].trials, 3);
        assert_eq!(stats[0].first_attempt_correct, 2);
        assert!((stats[0].mean_rt_ms - 600.0).abs() < 1e-9);
        assert_eq!(stats[0].median_rt_ms, 600.0);
        assert_eq!(stats[0].min_rt_ms, 400.0);
        assert_eq!(stats[1].title, "block 2");
    }

    #[test]
    fn even_count_median() {
        let log = vec![r(1, 100.0, true), r(1, 300.0, true)];
        assert_eq!(block_statistics(&log)[0].median_rt_ms, 200.0);
    }

    #[test]
    fn empty_log_has_no_blocks() {
        assert!(block_statistics(&Vec::<TrialResult>::new()).is_empty());
    }
}
