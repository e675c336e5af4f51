use std::fs;
use std::process::Command;

fn binary() -> &'static str {
    env!("CARGO_BIN_EXE_cluster-csv")
}

#[test]
fn test_cluster_a_small_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let output = dir.path().join("output.csv");

    let mut contents = String::from("x0,x1,weight\n");
    for (x, y) in [(0.0, 0.0), (0.0, 1.0), (10.0, 10.0), (10.0, 11.0)] {
        contents.push_str(&format!("{x},{y},1.0\n"));
    }
    fs::write(&input, contents).unwrap();

    let status = Command::new(binary())
        .args([
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--dc",
            "1.5",
            "--rhoc",
            "1.0",
            "--dm",
            "5.0",
        ])
        .status()
        .unwrap();
    assert!(status.success());

    let points = clue::read_output_csv::<2>(&output).unwrap();
    assert_eq!(points.cluster_indexes(), &[0, 0, 1, 1]);
    assert_eq!(points.is_seed(), &[0, 1, 0, 1]);
}

#[test]
fn test_missing_parameters_fail() {
    let status = Command::new(binary())
        .args(["--input", "nope.csv", "--output", "out.csv", "--dc", "1.0"])
        .status()
        .unwrap();
    assert!(!status.success());
}
