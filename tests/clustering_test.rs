use std::error::Error;
use std::fs::File;
use std::io::Write;

use kmeans_accel::{
    accelerator::software,
    driver::KmeansDriver,
    settings::TransferMode,
    timing::{Instrument, Stage, Timers},
    utils, KmeansError, KmeansStatistics, PointSet,
};

const IMAGE: &[u8] = b"kernel_top placeholder image";

fn software_driver(num_dims: usize, mode: TransferMode) -> KmeansDriver {
    let mut driver = KmeansDriver::new(mode, Box::new(Timers::new()));
    driver.init(software::enumerate(num_dims), IMAGE).unwrap();
    driver
}

#[test]
fn test_end_to_end_from_file() -> Result<(), Box<dyn Error>> {
    utils::init_log();
    std::fs::create_dir_all("test_data")?;
    let file_name = "test_data/points_end_to_end.txt";
    // first token of each line is the point id and is discarded
    let data = "0 0\n1 1\n2 10\n3 11\n";
    let mut file = File::create(file_name)?;
    file.write_all(data.as_bytes())?;

    let mut driver = software_driver(1, TransferMode::Amortized);
    driver.allocate(4, 2, 1)?;

    driver.instrument().start(Stage::ReadFile);
    let points = PointSet::new(file_name, 4, 1)?;
    driver.instrument().stop(Stage::ReadFile);
    driver.load(&points)?;

    let outcome = driver.run(10)?;
    assert!(outcome.converged);
    // means of (0, 1) and (10, 11), truncating division
    assert_eq!(outcome.means, vec![vec![0], vec![10]]);
    assert_eq!(outcome.stop_iteration, 3);

    let stats = KmeansStatistics::collect(&mut driver, &outcome);
    assert!(stats.clustering_ms >= stats.update_clusters_ms);
    driver.release()?;

    std::fs::remove_file(file_name)?;
    Ok(())
}

#[test]
fn test_partial_transfer_matches_full_transfer() -> Result<(), Box<dyn Error>> {
    // two well separated blobs plus a straggler, 2 dims
    let coords: Vec<i16> = vec![
        2, 3, -1, 4, 0, 0, 3, -2, 150, 160, 155, 148, 160, 152, 40, 40,
    ];

    let mut means = Vec::new();
    for mode in [TransferMode::Amortized, TransferMode::FullEveryIteration] {
        let mut driver = software_driver(2, mode);
        driver.allocate(8, 3, 2)?;
        let points = PointSet::from_coords(coords.clone(), 2)?;
        driver.load(&points)?;
        let outcome = driver.run(20)?;
        assert!(outcome.converged);
        means.push(outcome.means);
        driver.release()?;
    }
    // resending only the header and centroid lines must not change the result
    assert_eq!(means[0], means[1]);
    Ok(())
}

#[test]
fn test_iteration_cap_stops_early() -> Result<(), Box<dyn Error>> {
    let coords: Vec<i16> = vec![0, 3, 7, 12, 20, 33, 47, 60];
    let points = PointSet::from_coords(coords.clone(), 1)?;

    // the spread out points need several rounds to settle
    let mut driver = software_driver(1, TransferMode::Amortized);
    driver.allocate(8, 2, 1)?;
    driver.load(&points)?;
    let unconstrained = driver.run(50)?;
    assert!(unconstrained.converged);
    assert!(unconstrained.stop_iteration > 1);
    driver.release()?;

    let mut driver = software_driver(1, TransferMode::Amortized);
    driver.allocate(8, 2, 1)?;
    driver.load(&points)?;
    let capped = driver.run(1)?;
    assert_eq!(capped.stop_iteration, 1);
    assert!(!capped.converged);
    driver.release()?;
    Ok(())
}

#[test]
fn test_empty_cluster_keeps_seed_mean() -> Result<(), Box<dyn Error>> {
    // all points sit far above every seed, cluster 2 never gets a point
    // (seeds are (0), (1), (2), every point is nearest to seed (2) first,
    // then the recomputed mean absorbs them all)
    let points = PointSet::from_coords(vec![100, 101, 102, 103], 1)?;
    let mut driver = software_driver(1, TransferMode::Amortized);
    driver.allocate(4, 3, 1)?;
    driver.load(&points)?;
    let outcome = driver.run(10)?;
    assert!(outcome.converged);
    // clusters 0 and 1 never received a point and keep their seeded means
    assert_eq!(outcome.means[0], vec![0]);
    assert_eq!(outcome.means[1], vec![1]);
    assert_eq!(outcome.means[2], vec![101]);
    driver.release()?;
    Ok(())
}

#[test]
fn test_no_usable_device_is_fatal() {
    let mut driver = KmeansDriver::new(TransferMode::Amortized, Box::new(Timers::new()));
    let err = driver.init(software::enumerate(2), b"").unwrap_err();
    assert!(matches!(err, KmeansError::NoUsableDevice { .. }));
}

#[test]
fn test_run_before_load_is_a_usage_error() {
    let mut driver = software_driver(2, TransferMode::Amortized);
    driver.allocate(10, 2, 2).unwrap();
    let err = driver.run(5).unwrap_err();
    assert!(matches!(err, KmeansError::InvalidState { .. }));
}
