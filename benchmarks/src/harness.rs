use std::time::Instant;

pub struct BenchResult {
    pub name: String,
    pub serial_ms: f64,
    pub threaded_ms: Option<f64>,
    pub gpu_ms: Option<f64>,
    pub verified: Option<bool>,
}

/// Run `f` once and return wall-clock milliseconds.
pub fn time_ms(mut f: impl FnMut()) -> f64 {
    let start = Instant::now();
    f();
    start.elapsed().as_secs_f64() * 1000.0
}

/// Run a benchmark function `rounds` times and return the median.
pub fn median_of(rounds: usize, mut f: impl FnMut() -> f64) -> f64 {
    let mut times: Vec<f64> = (0..rounds.max(1)).map(|_| f()).collect();
    times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    times[times.len() / 2]
}

/// Print a comparison table to stdout.
pub fn print_table(results: &[BenchResult]) {
    let name_w = 24;
    let col_w = 12;

    println!();
    println!(
        "{:<name_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>6}",
        "Benchmark",
        "Serial",
        "Threaded",
        "GPU",
        "Check",
        name_w = name_w,
        col_w = col_w
    );
    println!("{}", "-".repeat(name_w + col_w * 3 + 6 + 4));

    for result in results {
        let threaded = match result.threaded_ms {
            Some(ms) => format!("{ms:.1}ms"),
            None => "-".into(),
        };
        let gpu = match result.gpu_ms {
            Some(ms) => format!("{ms:.1}ms"),
            None => "-".into(),
        };
        let check = match result.verified {
            Some(true) => "ok",
            Some(false) => "FAIL",
            None => "-",
        };
        println!(
            "{:<name_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>6}",
            result.name,
            format!("{:.1}ms", result.serial_ms),
            threaded,
            gpu,
            check,
            name_w = name_w,
            col_w = col_w
        );
    }
}
