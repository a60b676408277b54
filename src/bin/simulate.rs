use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use iat::env_config;
use iat::simulation::{simulate_batch, ParticipantProfile, SimulationError};
use iat::sink::{JsonFileSink, MemorySink, ResultsSink};
use iat::statistics::{block_statistics, save_statistics, RunStatistics};
use iat::stimulus_pool::StimulusPool;

struct Args {
    participants: usize,
    seed: u64,
    error_rate: f64,
    output: Option<String>,
    synthetic_images: Option<usize>,
}

const USAGE: &str =
    "Usage: iat-simulate [--participants N] [--seed S] [--error-rate P] [--output DIR] [--synthetic-images N]";

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> T {
    let Some(raw) = value else {
        eprintln!("Missing value for {}", flag);
        std::process::exit(1);
    };
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Invalid {} value: {}", flag, raw);
        std::process::exit(1);
    })
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        participants: 100,
        seed: 42,
        error_rate: 0.05,
        output: None,
        synthetic_images: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--participants" => {
                i += 1;
                parsed.participants = parse_value("--participants", args.get(i));
            }
            "--seed" => {
                i += 1;
                parsed.seed = parse_value("--seed", args.get(i));
            }
            "--error-rate" => {
                i += 1;
                parsed.error_rate = parse_value("--error-rate", args.get(i));
            }
            "--output" => {
                i += 1;
                parsed.output = Some(parse_value("--output", args.get(i)));
            }
            "--synthetic-images" => {
                i += 1;
                parsed.synthetic_images = Some(parse_value("--synthetic-images", args.get(i)));
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                println!();
                println!("Options:");
                println!("  --participants N       Number of simulated participants (default: 100)");
                println!("  --seed S               RNG seed; participant i uses S + i (default: 42)");
                println!("  --error-rate P         First-attempt error probability (default: 0.05)");
                println!("  --output DIR           Write statistics.json and per-user results to DIR");
                println!("  --synthetic-images N   Use N generated image ids per category instead of IAT_IMAGE_DIR");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("{}", USAGE);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if !(0.0..=1.0).contains(&parsed.error_rate) {
        eprintln!("Error: --error-rate must be within [0, 1]");
        std::process::exit(1);
    }
    parsed
}

fn synthetic_urls(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("/images/{}{}.jpg", prefix, i)).collect()
}

fn main() {
    env_config::init_logging();
    let args = parse_args();
    let _base = env_config::init_base_path();

    let pool = match args.synthetic_images {
        Some(n) => StimulusPool::from_sources(&synthetic_urls("mountain_", n), &synthetic_urls("swamp_", n)),
        None => StimulusPool::load(&env_config::image_dir()),
    };
    let pool = match pool {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("Failed to build stimulus pool: {}", e);
            std::process::exit(1);
        }
    };

    let sink: Box<dyn ResultsSink> = match &args.output {
        Some(dir) => Box::new(JsonFileSink::new(PathBuf::from(dir).join("results"))),
        None => Box::new(MemorySink::new()),
    };

    let profile = ParticipantProfile {
        error_rate: args.error_rate,
        ..ParticipantProfile::default()
    };

    println!(
        "Simulating {} participants (seed {}, error rate {:.3})...",
        args.participants, args.seed, args.error_rate
    );
    let start = Instant::now();
    let runs = match simulate_batch(pool, args.participants, args.seed, &profile, sink.as_ref()) {
        Ok(r) => r,
        Err(SimulationError::Plan(e)) => {
            eprintln!("Block plan does not fit the stimulus pool: {}", e);
            eprintln!("Add images to IAT_IMAGE_DIR or pass --synthetic-images N");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    let group_a = runs.iter().filter(|r| r.session.group == iat::types::Group::A).count();
    let mistakes: usize = runs.iter().map(|r| r.mistakes).sum();
    let blocks = block_statistics(runs.iter().flat_map(|r| r.results.iter()));
    let total_results: usize = runs.iter().map(|r| r.results.len()).sum();

    println!(
        "Done in {:.2?}: {} results, group A/B = {}/{}, {} corrected mistakes",
        elapsed,
        total_results,
        group_a,
        runs.len() - group_a,
        mistakes
    );
    println!();
    println!("{:<6} {:>7} {:>9} {:>10} {:>10}", "Block", "Trials", "Accuracy", "Mean RT", "Median RT");
    for b in &blocks {
        println!(
            "{:<6} {:>7} {:>8.1}% {:>8.0}ms {:>8.0}ms",
            b.block_id,
            b.trials,
            b.accuracy * 100.0,
            b.mean_rt_ms,
            b.median_rt_ms
        );
    }

    if let Some(dir) = args.output {
        let stats = RunStatistics {
            participants: runs.len(),
            seed: args.seed,
            total_results,
            blocks,
        };
        let path = PathBuf::from(&dir).join("statistics.json");
        if let Err(e) = save_statistics(&stats, &path) {
            eprintln!("Failed to write {}: {}", path.display(), e);
            std::process::exit(1);
        }
        println!();
        println!("Wrote {}", path.display());
    }
}
