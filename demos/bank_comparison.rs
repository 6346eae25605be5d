//! Run a batch of seeded scenarios in parallel and compare how the three
//! parametrizations drift.
//!
//! ```sh
//! RUST_LOG=info cargo run --release --example bank_comparison
//! ```

use attitude_bank::{analysis, run_batch, ScenarioConfig, ESTIMATORS};

fn main() -> attitude_bank::Result<()> {
    env_logger::init();

    let base = ScenarioConfig::default();
    let configs: Vec<_> = (0..4).map(|seed| base.with_seed(seed)).collect();

    for (config, log) in configs.iter().zip(run_batch(&configs)) {
        let log = log?;
        println!("seed {}", config.simulator.seed);
        println!(
            "  {:<6} {:>8} {:>14} {:>14} {:>14} {:>12}",
            "name", "samples", "max |q|-1", "att err, deg", "bias err, dps", "cpu, us"
        );
        for name in ESTIMATORS {
            let s = analysis::summarize(&log, name)?;
            println!(
                "  {:<6} {:>8} {:>14.3e} {:>14.4} {:>14.4} {:>12.2}",
                s.name,
                s.samples,
                s.max_norm_error,
                s.final_attitude_error.to_degrees(),
                s.final_bias_error.to_degrees(),
                s.mean_elapsed * 1e6,
            );
        }
    }
    Ok(())
}
