use clap::{Parser, ValueHint};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[clap(author, version, about="a kmeans accelerator host", long_about=None)]
pub struct Args {
    /// generate shell completion
    #[clap(long = "generate", short = 'g', value_enum)]
    pub generator: Option<Shell>,

    /// the paths of config files
    #[clap(value_hint=ValueHint::FilePath)]
    pub config_names: Vec<String>,
}
