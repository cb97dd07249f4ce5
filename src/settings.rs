//! # the settings of the kmeans accelerator host
//! - this mod contains the settings of the kmeans accelerator host.
//!
use config::{Config, File};
use glob::glob;
use itertools::Itertools;

use serde::{Deserialize, Serialize};
use std::{error::Error, string::String};

/// # Description
/// - struct for recording the settings of a kmeans run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub description: String,
    pub data_path: String,
    pub binary_path: String,
    pub kmeans_settings: KmeansSettings,
}

/// how the packed buffer is moved to the device each iteration.
/// - `Amortized`: the point region is sent once, later iterations resend
///   only the header and centroid lines. this is the production mode.
/// - `FullEveryIteration`: the whole buffer is resent every iteration. the
///   results are identical, only the transfer cost differs.
#[derive(Debug, Clone, Serialize, Deserialize, enum_as_inner::EnumAsInner)]
pub enum TransferMode {
    Amortized,
    FullEveryIteration,
}

/// # Description
/// - struct for recording the shape and iteration bound of the clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmeansSettings {
    pub num_points: usize,
    pub num_clusters: usize,
    pub num_dims: usize,
    pub max_iterations: usize,
    pub transfer_mode: TransferMode,
}

impl Settings {
    /// # Description
    /// - create the settings of the kmeans accelerator host.
    /// - will read all configs provided in the config_path.
    /// - the configs/user_configs/*.toml will also be read.
    /// # Arguments
    /// - `config_path`: the vec of paths of the config file with surfix `.toml`.
    /// # Return
    /// - `Result<Settings, Box<dyn Error>>`: the settings of the run.
    pub fn new(config_path: Vec<String>) -> Result<Self, Box<dyn Error>> {
        let input_files = config_path.iter().map(|x| File::with_name(x)).collect_vec();
        let default_files: Vec<_> = glob("configs/user_configs/*.toml")?
            .map_ok(File::from)
            .try_collect()?;

        let result: Settings = Config::builder()
            .add_source(input_files)
            .add_source(default_files)
            .build()?
            .try_deserialize()?;
        if result.kmeans_settings.max_iterations == 0 {
            return Err("max_iterations must be greater than 0".into());
        }
        if result.kmeans_settings.num_clusters > u8::MAX as usize + 1 {
            return Err("num_clusters must fit in one label byte".into());
        }
        Ok(result)
    }
}
