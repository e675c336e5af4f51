use clue::{get_clusters, read_csv, write_output_csv, Clusterer, Queue};
use clue_types::{BackendKind, ClusterParams};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn print_usage() {
    eprintln!("Usage: cluster-csv --input <in.csv> --output <out.csv> --dc <f> --rhoc <f> [OPTIONS]");
    eprintln!();
    eprintln!("  --dm <f>           Nearest-higher cutoff (default: dc)");
    eprintln!("  --seed-dc <f>      Seed promotion cutoff (default: dc)");
    eprintln!("  --points-per-tile <n>  Tile occupancy target (default: 128)");
    eprintln!("  --backend <name>   serial | threaded | gpu (default: serial)");
    eprintln!("  --workers <n>      Threads for the threaded backend (default: auto)");
    eprintln!("  --list-devices <b> Print devices of a back-end and exit");
    eprintln!();
    eprintln!("Input files carry two coordinate columns and one weight column");
    eprintln!("after a header row; the output appends clusterId and isSeed.");
}

struct Options {
    input: String,
    output: String,
    params: ClusterParams,
    backend: BackendKind,
    workers: usize,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut input = None;
    let mut output = None;
    let mut dc = None;
    let mut rhoc = None;
    let mut dm = None;
    let mut seed_dc = None;
    let mut points_per_tile = 128i32;
    let mut backend = BackendKind::Serial;
    let mut workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || -> Result<&String, String> {
            args.get(i + 1).ok_or_else(|| format!("{flag} needs a value"))
        };
        match flag {
            "--input" => input = Some(value()?.clone()),
            "--output" => output = Some(value()?.clone()),
            "--dc" => dc = Some(value()?.parse::<f32>().map_err(|e| e.to_string())?),
            "--rhoc" => rhoc = Some(value()?.parse::<f32>().map_err(|e| e.to_string())?),
            "--dm" => dm = Some(value()?.parse::<f32>().map_err(|e| e.to_string())?),
            "--seed-dc" => seed_dc = Some(value()?.parse::<f32>().map_err(|e| e.to_string())?),
            "--points-per-tile" => {
                points_per_tile = value()?.parse::<i32>().map_err(|e| e.to_string())?
            }
            "--backend" => {
                backend = BackendKind::parse(value()?)
                    .ok_or_else(|| format!("unknown backend {:?}", args[i + 1]))?
            }
            "--workers" => workers = value()?.parse::<usize>().map_err(|e| e.to_string())?,
            other => return Err(format!("unknown option {other}")),
        }
        i += 2;
    }

    let dc = dc.ok_or("missing --dc")?;
    Ok(Options {
        input: input.ok_or("missing --input")?,
        output: output.ok_or("missing --output")?,
        params: ClusterParams {
            dc: vec![dc],
            rhoc: rhoc.ok_or("missing --rhoc")?,
            dm: dm.map(|v| vec![v]),
            seed_dc: seed_dc.map(|v| vec![v]),
            points_per_tile,
            wrapped: Vec::new(),
        },
        backend,
        workers,
    })
}

fn run(options: &Options) -> Result<(), clue::Error> {
    let queue = match options.backend {
        BackendKind::Serial => Queue::serial(),
        BackendKind::Threaded => Queue::threaded(options.workers)?,
        BackendKind::Gpu => Queue::gpu()?,
    };

    let mut points = read_csv::<2>(&options.input)?;
    if points.size() == 0 {
        return Err(clue::Error::EmptyInput);
    }
    let mut clusterer = Clusterer::<2>::from_params(&options.params)?;

    let start = std::time::Instant::now();
    clusterer.make_clusters(&queue, &mut points)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    write_output_csv(&options.output, &points)?;
    let clusters = get_clusters(&points);
    let outliers = points.cluster_indexes().iter().filter(|&&id| id == -1).count();
    eprintln!(
        "{} points -> {} clusters ({} outliers) in {:.1}ms on {}",
        points.size(),
        clusters.size(),
        outliers,
        elapsed_ms,
        options.backend.name()
    );
    Ok(())
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

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help") {
        print_usage();
        return;
    }
    if let Some(pos) = args.iter().position(|a| a == "--list-devices") {
        if let Some(backend) = args.get(pos + 1) {
            clue::list_devices(backend);
        } else {
            print_usage();
        }
        return;
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            print_usage();
            std::process::exit(1);
        }
    };
    if let Err(err) = run(&options) {
        eprintln!("clustering failed: {err}");
        std::process::exit(1);
    }
}
