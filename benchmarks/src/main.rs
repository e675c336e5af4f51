mod assoc_bench;
mod dataset_bench;
mod harness;
mod tiles_bench;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn print_usage() {
    eprintln!("Usage: benchmarks [OPTIONS]");
    eprintln!();
    eprintln!("  --bench <name>     Benchmark to run: dataset, associator, tiles,");
    eprintln!("                     all (default: all)");
    eprintln!("  --rounds <n>       Rounds per measurement (default: 5)");
    eprintln!("  --max-power <p>    Largest dataset is 2^p points (default: 16)");
    eprintln!("  --workers <n>      Worker threads (default: auto)");
    eprintln!("  --list-devices <b> Print devices of a back-end and exit");
    eprintln!("  --help             Show this help");
}

fn main() {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
                ),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut bench = "all".to_string();
    let mut rounds: usize = 5;
    let mut max_power: u32 = 16;
    let mut workers: usize = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, 16);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bench" if i + 1 < args.len() => {
                bench = args[i + 1].clone();
                i += 2;
            }
            "--rounds" if i + 1 < args.len() => {
                rounds = args[i + 1].parse().unwrap_or(rounds);
                i += 2;
            }
            "--max-power" if i + 1 < args.len() => {
                max_power = args[i + 1].parse().unwrap_or(max_power);
                i += 2;
            }
            "--workers" if i + 1 < args.len() => {
                workers = args[i + 1].parse().unwrap_or(workers).max(1);
                i += 2;
            }
            "--list-devices" if i + 1 < args.len() => {
                clue::list_devices(&args[i + 1]);
                return;
            }
            "--help" => {
                print_usage();
                return;
            }
            other => {
                eprintln!("Unknown option: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
    }

    let mut results = Vec::new();
    if bench == "dataset" || bench == "all" {
        results.extend(dataset_bench::run(rounds, max_power, workers));
    }
    if bench == "associator" || bench == "all" {
        results.extend(assoc_bench::run(rounds, workers));
    }
    if bench == "tiles" || bench == "all" {
        results.extend(tiles_bench::run(rounds, workers));
    }
    if results.is_empty() {
        eprintln!("Unknown benchmark '{bench}'");
        print_usage();
        std::process::exit(1);
    }
    harness::print_table(&results);
}
