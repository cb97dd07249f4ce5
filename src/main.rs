use chrono::Local;
use clap::{Command, CommandFactory, Parser};
use clap_complete::{generate, Generator};
use kmeans_accel::{
    accelerator::software,
    cmd_args::Args,
    driver::KmeansDriver,
    kmeans_result::{write_report, KmeansStatistics},
    points::PointSet,
    timing::{Instrument, Stage, Timers},
    utils, KmeansResult, Settings,
};
use std::{error::Error, io, time::Instant};

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

fn main() -> Result<(), Box<dyn Error>> {
    utils::init_log();
    let args = Args::parse();
    if let Some(generator) = args.generator {
        let mut cmd = Args::command();
        print_completions(generator, &mut cmd);
        return Ok(());
    }

    let mut config_names = args.config_names;
    if config_names.is_empty() {
        config_names.push("configs/default.toml".into());
    }
    let settings = Settings::new(config_names)?;
    let shape = settings.kmeans_settings.clone();

    std::fs::create_dir_all("output")?;
    let current_time: String = Local::now().format("%Y-%m-%d-%H-%M-%S%.6f").to_string();
    let start_time = Instant::now();
    let mut results = KmeansResult::default();
    results.settings = Some(settings.clone());

    let image = std::fs::read(&settings.binary_path)?;
    let mut driver = KmeansDriver::new(shape.transfer_mode.clone(), Box::new(Timers::new()));
    driver.init(software::enumerate(shape.num_dims), &image)?;
    driver.allocate(shape.num_points, shape.num_clusters, shape.num_dims)?;

    driver.instrument().start(Stage::ReadFile);
    let points = PointSet::new(&settings.data_path, shape.num_points, shape.num_dims)?;
    driver.instrument().stop(Stage::ReadFile);
    driver.load(&points)?;

    let outcome = driver.run(shape.max_iterations)?;

    let mut stats = KmeansStatistics::collect(&mut driver, &outcome);
    let iteration_count = driver.iteration_count();
    driver.release()?;

    // record the wall clock time of the whole run
    let simulation_time = start_time.elapsed().as_secs();
    let seconds = simulation_time % 60;
    let minutes = (simulation_time / 60) % 60;
    let hours = (simulation_time / 60) / 60;
    stats.simulation_time = format!("{}:{}:{}", hours, minutes, seconds);

    stats.print_summary(iteration_count);
    stats.append_csv("output/out.csv", shape.num_clusters, shape.num_dims)?;

    let report_path = format!(
        "output/kmeans_{}_{}_{}_out.txt",
        shape.num_points, shape.num_clusters, shape.num_dims
    );
    write_report(report_path, &outcome)?;

    results.stats = Some(stats);
    let output_path = format!("output/{}.json", current_time);
    println!("{}", serde_json::to_string_pretty(&results)?);
    // write json of results to output_path
    std::fs::write(output_path, serde_json::to_string_pretty(&results)?)?;
    Ok(())
}
