//! # mod kmeans result
//! - this mod contains structs for recording the result of a run, plus the
//!   text report, performance summary and csv emission.
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::driver::{ClusteringOutcome, KmeansDriver};
use crate::settings::Settings;
use crate::timing::{Instrument, Stage};

///
/// # Description
/// - struct for recording the result of a kmeans run.
/// # Fields
/// - settings: the settings of the run, `kmeans_accel::settings::Settings`
/// - stats: the statistics
#[derive(Debug, Serialize, Default)]
pub struct KmeansResult {
    pub settings: Option<Settings>,
    pub stats: Option<KmeansStatistics>,
}

impl KmeansResult {
    pub fn new() -> Self {
        Self::default()
    }
}

/// # Description
/// - struct for recording the statistics of a kmeans run.
/// # Fields
/// - stop_iteration: the 1 based iteration the run stopped in
/// - converged: whether the means stopped moving before the cap
/// - means: final mean values, one vec per cluster
#[derive(Debug, Serialize, Default)]
pub struct KmeansStatistics {
    pub stop_iteration: usize,
    pub converged: bool,
    pub means: Vec<Vec<i32>>,

    pub read_file_ms: f64,
    pub init_ms: f64,
    pub allocate_ms: f64,
    pub first_copy_ms: f64,
    pub process_ms: f64,
    pub update_clusters_ms: f64,
    pub clustering_ms: f64,
    pub first_iteration_ms: f64,

    pub simulation_time: String,
}

impl KmeansStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// collect the outcome and the stage timings out of a finished driver.
    pub fn collect(driver: &mut KmeansDriver, outcome: &ClusteringOutcome) -> Self {
        let first_iteration_ms = driver.first_process_ms();
        let instrument = driver.instrument();
        KmeansStatistics {
            stop_iteration: outcome.stop_iteration,
            converged: outcome.converged,
            means: outcome.means.clone(),
            read_file_ms: instrument.report_ms(Stage::ReadFile),
            init_ms: instrument.report_ms(Stage::Init),
            allocate_ms: instrument.report_ms(Stage::Allocate),
            first_copy_ms: instrument.report_ms(Stage::FirstCopy),
            process_ms: instrument.report_ms(Stage::Process),
            update_clusters_ms: instrument.report_ms(Stage::UpdateClusters),
            clustering_ms: instrument.report_ms(Stage::Clustering),
            first_iteration_ms,
            simulation_time: String::new(),
        }
    }

    /// print the human readable performance summary.
    pub fn print_summary(&self, iteration_count: usize) {
        println!("------------------------------------------------------");
        println!("  Performance Summary                                 ");
        println!("------------------------------------------------------");
        println!("  Read input file            : {:12.4} ms", self.read_file_ms);
        println!("  Device Initialization      : {:12.4} ms", self.init_ms);
        println!("  Buffer Allocation          : {:12.4} ms", self.allocate_ms);
        println!("  Iteration                  : {:12.4} ms", self.process_ms);
        println!("  Iteration count            : {:16}   ", iteration_count);
        println!("  Update clusters            : {:12.4} ms", self.update_clusters_ms);
        println!("  Clusterization             : {:12.4} ms", self.clustering_ms);
        println!("------------------------------------------------------");
    }

    /// append one csv row of the timing columns, creating the file on the
    /// first run.
    pub fn append_csv(
        &self,
        path: impl AsRef<Path>,
        num_clusters: usize,
        num_dims: usize,
    ) -> std::io::Result<()> {
        let mut csv = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(
            csv,
            "{},{},{},{},{},{},{},{}",
            self.first_iteration_ms,
            self.first_copy_ms,
            self.process_ms,
            self.update_clusters_ms,
            self.clustering_ms,
            self.stop_iteration,
            num_clusters,
            num_dims
        )
    }
}

/// write the text report: the stopping iteration and the final per cluster
/// mean values.
pub fn write_report(path: impl AsRef<Path>, outcome: &ClusteringOutcome) -> std::io::Result<()> {
    let mut text = format!("Break in iteration {}\n", outcome.stop_iteration);
    for mean in &outcome.means {
        text += "\nCluster values: ";
        for value in mean {
            text += &format!("{} ", value);
        }
    }
    text += "\n";
    std::fs::write(path, text)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_report_format() -> std::io::Result<()> {
        std::fs::create_dir_all("test_data")?;
        let outcome = ClusteringOutcome {
            means: vec![vec![0, 2], vec![10, -4]],
            stop_iteration: 3,
            converged: true,
        };
        let path = "test_data/report_format.txt";
        write_report(path, &outcome)?;
        let text = std::fs::read_to_string(path)?;
        assert!(text.starts_with("Break in iteration 3\n"));
        assert!(text.contains("Cluster values: 0 2 "));
        assert!(text.contains("Cluster values: 10 -4 "));
        std::fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn test_csv_appends() -> std::io::Result<()> {
        std::fs::create_dir_all("test_data")?;
        let path = "test_data/out_append.csv";
        let _ = std::fs::remove_file(path);
        let stats = KmeansStatistics {
            stop_iteration: 2,
            ..Default::default()
        };
        stats.append_csv(path, 4, 2)?;
        stats.append_csv(path, 4, 2)?;
        let text = std::fs::read_to_string(path)?;
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|line| line.ends_with(",2,4,2")));
        std::fs::remove_file(path)?;
        Ok(())
    }
}
