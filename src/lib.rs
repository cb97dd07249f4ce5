//! the crate kmeans_accel is the host side of a fixed function kmeans
//! accelerator: the device assigns each point to its nearest centroid, the
//! host recomputes the centroid means and decides convergence.
//! there are 4 parts in the crate:
//!
//! - layout: the packed, line aligned buffer format exchanged with the device.
//! - accelerator: the session over a programmed device and the software
//!   stand-in kernel.
//! - driver: the convergence loop and the iteration state.
//! - kmeans_result: the result structs to record the run.
//! # Examples
//! ```
//! use kmeans_accel::{
//!     accelerator::software, driver::KmeansDriver, points::PointSet,
//!     settings::TransferMode, timing::Timers,
//! };
//!
//! fn cluster() -> Result<(), Box<dyn std::error::Error>> {
//!     let points = PointSet::from_coords(vec![0, 1, 10, 11], 1)?;
//!
//!     let mut driver = KmeansDriver::new(TransferMode::Amortized, Box::new(Timers::new()));
//!     driver.init(software::enumerate(1), b"kernel_top")?;
//!     driver.allocate(4, 2, 1)?;
//!     driver.load(&points)?;
//!
//!     let outcome = driver.run(10)?;
//!     assert!(outcome.converged);
//!     assert_eq!(outcome.means, vec![vec![0], vec![10]]);
//!
//!     driver.release()?;
//!     Ok(())
//! }
//! cluster().unwrap();
//! ```
//!

pub mod accelerator;
pub mod cmd_args;
pub mod driver;
pub mod error;
pub mod kmeans_result;
pub mod layout;
pub mod points;
pub mod settings;
pub mod timing;

// default re-export
pub use driver::{ClusteringOutcome, KmeansDriver};
pub use error::KmeansError;
pub use kmeans_result::{KmeansResult, KmeansStatistics};
pub use layout::BufferLayout;
pub use points::PointSet;
pub use settings::Settings;

pub mod utils;
