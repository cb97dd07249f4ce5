//! # the clustering driver
//! - owns the iteration state and the convergence loop:
//!   write the mutated region, invoke the kernel, read the labels back,
//!   recompute the means, compare against the previous round.
//! - the lifecycle is `init` -> `allocate` -> `load` -> `run` -> `release`,
//!   anything out of order is an [`KmeansError::InvalidState`].

use log::{debug, info};

use crate::accelerator::{software, BufferHandle, Device, Session};
use crate::error::KmeansError;
use crate::layout::BufferLayout;
use crate::points::PointSet;
use crate::settings::TransferMode;
use crate::timing::{Instrument, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Initialized,
    Allocated,
    Loaded,
    Released,
}

/// the final result of one clustering run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringOutcome {
    /// final mean values per cluster, `num_dims` entries each.
    pub means: Vec<Vec<i32>>,
    /// 1 based index of the iteration the run stopped in, the original
    /// reports it as "Break in iteration N".
    pub stop_iteration: usize,
    /// true when the means stopped moving, false when the iteration cap
    /// cut the run short. either way `means` is the final answer.
    pub converged: bool,
}

/// the deterministic seed: centroid `i` starts at `(i, 0, .., 0)`.
pub fn seed_centroids(num_clusters: usize, num_dims: usize) -> Vec<i32> {
    let mut centroids = vec![0i32; num_clusters * num_dims];
    for cluster in 0..num_clusters {
        centroids[cluster * num_dims] = cluster as i32;
    }
    centroids
}

/// fold the per cluster sums and counts into new means.
///
/// truncating integer division, a cluster with no points keeps its previous
/// mean. returns true when any mean moved.
pub fn update_means(
    sums: &[i64],
    counts: &[i64],
    num_dims: usize,
    clusters: &mut [i32],
    clusters_old: &mut [i32],
) -> bool {
    let mut changed = false;
    for idx in 0..clusters.len() {
        if counts[idx / num_dims] > 0 {
            clusters[idx] = (sums[idx] / counts[idx / num_dims]) as i32;
        }
        if clusters[idx] != clusters_old[idx] {
            changed = true;
        }
        clusters_old[idx] = clusters[idx];
    }
    changed
}

/// # Description
/// - drives the accelerator through the kmeans iterations.
/// - the packed buffer and the label mirror are allocated once in
///   `allocate` and mutated in place every round.
pub struct KmeansDriver {
    phase: Phase,
    transfer_mode: TransferMode,
    instrument: Box<dyn Instrument>,

    session: Option<Session>,
    layout: Option<BufferLayout>,
    input: Option<BufferHandle>,
    output: Option<BufferHandle>,

    // host mirrors of the device buffers
    main_buffer: Vec<u8>,
    label_buffer: Vec<u8>,

    // points are immutable after load, clusters move every iteration
    points: Vec<i16>,
    clusters: Vec<i32>,
    clusters_old: Vec<i32>,

    iteration_count: usize,
    first_process_ms: f64,
}

impl KmeansDriver {
    pub fn new(transfer_mode: TransferMode, instrument: Box<dyn Instrument>) -> Self {
        KmeansDriver {
            phase: Phase::Created,
            transfer_mode,
            instrument,
            session: None,
            layout: None,
            input: None,
            output: None,
            main_buffer: Vec::new(),
            label_buffer: Vec::new(),
            points: Vec::new(),
            clusters: Vec::new(),
            clusters_old: Vec::new(),
            iteration_count: 0,
            first_process_ms: 0.0,
        }
    }

    /// a driver wired to the software stand-in backend.
    pub fn with_software_backend(
        num_dims: usize,
        transfer_mode: TransferMode,
        instrument: Box<dyn Instrument>,
        image: &[u8],
    ) -> Result<Self, KmeansError> {
        let mut driver = KmeansDriver::new(transfer_mode, instrument);
        driver.init(software::enumerate(num_dims), image)?;
        Ok(driver)
    }

    fn expect_phase(&self, expected: Phase, op: &str) -> Result<(), KmeansError> {
        if self.phase != expected {
            return Err(KmeansError::invalid_state(format!(
                "`{}` called in phase {:?}, expected {:?}",
                op, self.phase, expected
            )));
        }
        Ok(())
    }

    /// the injected instrumentation, for stages timed by the caller (such
    /// as reading the input file) and for reporting.
    pub fn instrument(&mut self) -> &mut dyn Instrument {
        self.instrument.as_mut()
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    /// process time of the first iteration alone, it carries the partial
    /// transfer saving of none of the later rounds.
    pub fn first_process_ms(&self) -> f64 {
        self.first_process_ms
    }

    /// open a session: program the first candidate device that accepts the
    /// binary image.
    pub fn init(
        &mut self,
        candidates: Vec<Box<dyn Device>>,
        image: &[u8],
    ) -> Result<(), KmeansError> {
        self.expect_phase(Phase::Created, "init")?;
        self.instrument.start(Stage::Init);
        let session = Session::open(candidates, image)?;
        self.instrument.stop(Stage::Init);
        self.session = Some(session);
        self.phase = Phase::Initialized;
        Ok(())
    }

    /// compute the buffer layout for the shape, allocate the host mirrors
    /// and the device buffers, and bind the kernel arguments.
    pub fn allocate(
        &mut self,
        num_points: usize,
        num_clusters: usize,
        num_dims: usize,
    ) -> Result<(), KmeansError> {
        self.expect_phase(Phase::Initialized, "allocate")?;
        let layout = BufferLayout::new(num_points, num_clusters, num_dims)?;

        self.instrument.start(Stage::Allocate);
        self.main_buffer = vec![0u8; layout.input_bytes()];
        self.label_buffer = vec![0u8; layout.output_bytes];
        self.points = vec![0i16; num_points * num_dims];
        self.clusters = vec![0i32; num_clusters * num_dims];
        self.clusters_old = vec![0i32; num_clusters * num_dims];

        let session = self.session.as_mut().unwrap();
        let (input, output) = session.allocate(layout.input_bytes(), layout.output_bytes)?;
        session.bind_arguments(layout.input_bytes(), layout.output_bytes, input, output)?;
        self.instrument.stop(Stage::Allocate);

        info!(
            "allocated packed buffer: {} input bytes, {} output bytes",
            layout.input_bytes(),
            layout.output_bytes
        );
        self.input = Some(input);
        self.output = Some(output);
        self.layout = Some(layout);
        self.phase = Phase::Allocated;
        Ok(())
    }

    /// copy the point coordinates into the packed buffer. points never
    /// change again for the lifetime of the run.
    pub fn load(&mut self, points: &PointSet) -> Result<(), KmeansError> {
        self.expect_phase(Phase::Allocated, "load")?;
        let layout = self.layout.unwrap();
        if points.num_dims() != layout.num_dims {
            return Err(KmeansError::invalid_state(format!(
                "point set has {} dims, the allocation has {}",
                points.num_dims(),
                layout.num_dims
            )));
        }
        if points.len() > layout.num_points {
            return Err(KmeansError::invalid_state(format!(
                "point set has {} points, the allocation has room for {}",
                points.len(),
                layout.num_points
            )));
        }
        let coords = points.coords();
        self.points[..coords.len()].copy_from_slice(coords);
        layout.encode_points(&mut self.main_buffer, &self.points);
        self.phase = Phase::Loaded;
        Ok(())
    }

    /// run the convergence loop for at most `max_iterations` rounds.
    pub fn run(&mut self, max_iterations: usize) -> Result<ClusteringOutcome, KmeansError> {
        self.expect_phase(Phase::Loaded, "run")?;
        if max_iterations == 0 {
            return Err(KmeansError::invalid_state(
                "`run` needs at least one iteration",
            ));
        }
        let layout = self.layout.unwrap();
        self.iteration_count = 0;
        self.first_process_ms = 0.0;

        // seed and encode the whole packed buffer for the one full upload
        self.clusters = seed_centroids(layout.num_clusters, layout.num_dims);
        self.clusters_old.copy_from_slice(&self.clusters);
        layout.encode_header(&mut self.main_buffer);
        layout.encode_centroids(&mut self.main_buffer, &self.clusters);

        self.instrument.start(Stage::Clustering);
        self.instrument.start(Stage::FirstCopy);
        let input = self.input.unwrap();
        self.session
            .as_mut()
            .unwrap()
            .upload(input, &self.main_buffer, 0..layout.input_bytes())?;
        self.instrument.stop(Stage::FirstCopy);

        let mut stop_iteration = 0;
        let mut converged = false;
        for iteration in 0..max_iterations {
            self.process(iteration)?;

            self.instrument.start(Stage::UpdateClusters);
            let changed = self.reduce();
            self.instrument.stop(Stage::UpdateClusters);

            stop_iteration = iteration + 1;
            debug!(
                "iteration {}: means {:?}, changed: {}",
                stop_iteration, self.clusters, changed
            );
            if !changed {
                converged = true;
                break;
            }
        }
        self.instrument.stop(Stage::Clustering);

        info!(
            "break in iteration {}, converged: {}",
            stop_iteration, converged
        );
        Ok(ClusteringOutcome {
            means: self
                .clusters
                .chunks(layout.num_dims)
                .map(|chunk| chunk.to_vec())
                .collect(),
            stop_iteration,
            converged,
        })
    }

    /// one accelerator round: resend the mutated region, invoke, read the
    /// labels back.
    fn process(&mut self, iteration: usize) -> Result<(), KmeansError> {
        let layout = self.layout.unwrap();
        let input = self.input.unwrap();
        let output = self.output.unwrap();
        let session = self.session.as_mut().unwrap();

        self.instrument.start(Stage::Process);
        if iteration > 0 {
            layout.encode_centroids(&mut self.main_buffer, &self.clusters);
            let range = match self.transfer_mode {
                // the point lines are still resident from the full upload
                TransferMode::Amortized => layout.mutable_range(),
                TransferMode::FullEveryIteration => 0..layout.input_bytes(),
            };
            session.upload(input, &self.main_buffer, range)?;
        }
        session.invoke_and_wait()?;
        session.download(output, &mut self.label_buffer)?;
        self.instrument.stop(Stage::Process);

        if self.iteration_count == 0 {
            self.first_process_ms = self.instrument.report_ms(Stage::Process);
        }
        self.iteration_count += 1;
        Ok(())
    }

    /// accumulate the labelled coordinates into per cluster sums and fold
    /// them into the new means.
    fn reduce(&mut self) -> bool {
        let layout = self.layout.unwrap();
        let num_dims = layout.num_dims;
        let labels = layout.decode_labels(&self.label_buffer);

        let mut sums = vec![0i64; layout.num_clusters * num_dims];
        let mut counts = vec![0i64; layout.num_clusters];
        for (point, &label) in labels.iter().enumerate() {
            let cluster = label as usize;
            for dim in 0..num_dims {
                sums[cluster * num_dims + dim] += self.points[point * num_dims + dim] as i64;
            }
            counts[cluster] += 1;
        }
        update_means(
            &sums,
            &counts,
            num_dims,
            &mut self.clusters,
            &mut self.clusters_old,
        )
    }

    /// release the device resources. the driver must not be used after.
    pub fn release(&mut self) -> Result<(), KmeansError> {
        if self.phase == Phase::Released {
            return Err(KmeansError::invalid_state("`release` called twice"));
        }
        if let Some(session) = self.session.as_mut() {
            session.close();
        }
        self.phase = Phase::Released;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timing::NullInstrument;

    fn software_driver(num_dims: usize, mode: TransferMode) -> KmeansDriver {
        KmeansDriver::with_software_backend(
            num_dims,
            mode,
            Box::new(NullInstrument),
            b"kernel_top",
        )
        .unwrap()
    }

    #[test]
    fn test_seed_is_deterministic() {
        // centroid i is (i, 0, .., 0)
        assert_eq!(seed_centroids(3, 2), vec![0, 0, 1, 0, 2, 0]);
        assert_eq!(seed_centroids(2, 1), vec![0, 1]);
    }

    #[test]
    fn test_update_means_truncates_toward_zero() {
        let mut clusters = vec![0i32, 0];
        let mut clusters_old = vec![0i32, 0];
        // -3 / 2 truncates to -1, not -2
        let changed = update_means(&[-3, 5], &[2, 2], 1, &mut clusters, &mut clusters_old);
        assert!(changed);
        assert_eq!(clusters, vec![-1, 2]);
    }

    #[test]
    fn test_update_means_zero_count_keeps_previous_mean() {
        let mut clusters = vec![7i32, 9];
        let mut clusters_old = vec![7i32, 9];
        let changed = update_means(&[0, 100], &[0, 10], 1, &mut clusters, &mut clusters_old);
        assert!(changed);
        // cluster 0 saw no points and keeps its mean
        assert_eq!(clusters, vec![7, 10]);
    }

    #[test]
    fn test_update_means_idempotent_when_labels_stable() {
        let mut clusters = vec![3i32, 20];
        let mut clusters_old = clusters.clone();
        // the sums reproduce the current means exactly
        let changed = update_means(&[6, 40], &[2, 2], 1, &mut clusters, &mut clusters_old);
        assert!(!changed);
        assert_eq!(clusters, vec![3, 20]);
    }

    #[test]
    fn test_lifecycle_order_is_enforced() {
        let mut driver = software_driver(1, TransferMode::Amortized);
        // run before allocate/load
        assert!(matches!(
            driver.run(5),
            Err(KmeansError::InvalidState { .. })
        ));
        driver.allocate(4, 2, 1).unwrap();
        assert!(matches!(
            driver.run(5),
            Err(KmeansError::InvalidState { .. })
        ));
        // allocate twice
        assert!(matches!(
            driver.allocate(4, 2, 1),
            Err(KmeansError::InvalidState { .. })
        ));
        driver.release().unwrap();
        // any call after release
        assert!(matches!(
            driver.release(),
            Err(KmeansError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_allocate_rejects_zero_shape() {
        let mut driver = software_driver(1, TransferMode::Amortized);
        assert!(matches!(
            driver.allocate(0, 2, 1),
            Err(KmeansError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_load_rejects_mismatched_dims() {
        let mut driver = software_driver(1, TransferMode::Amortized);
        driver.allocate(4, 2, 1).unwrap();
        let points = PointSet::from_coords(vec![1, 2, 3, 4], 2).unwrap();
        assert!(matches!(
            driver.load(&points),
            Err(KmeansError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_small_run_converges() {
        let mut driver = software_driver(1, TransferMode::Amortized);
        driver.allocate(4, 2, 1).unwrap();
        let points = PointSet::from_coords(vec![0, 1, 10, 11], 1).unwrap();
        driver.load(&points).unwrap();
        let outcome = driver.run(10).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.means, vec![vec![0], vec![10]]);
        driver.release().unwrap();
    }

    #[test]
    fn test_iteration_cap_reports_non_converged_stop() {
        let mut driver = software_driver(1, TransferMode::Amortized);
        driver.allocate(4, 2, 1).unwrap();
        let points = PointSet::from_coords(vec![0, 1, 10, 11], 1).unwrap();
        driver.load(&points).unwrap();
        let outcome = driver.run(1).unwrap();
        assert_eq!(outcome.stop_iteration, 1);
        assert!(!outcome.converged);
        driver.release().unwrap();
    }
}
