use std::process::Command;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_puzzlehunt-cli"))
}

#[test]
fn grid_without_dimensions_lists_difficulties() {
    let output = cli().arg("grid").output().expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[0], "2\t4 pieces (2x2)");
    assert_eq!(lines[8], "10\t100 pieces (10x10)");
}

#[test]
fn grid_prints_piece_rects() {
    let output = cli()
        .args(["grid", "--rows", "2", "--cols", "3", "--width", "90", "--height", "40"])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "0\tx=0 y=0 w=30 h=20");
    assert_eq!(lines[5], "5\tx=60 y=20 w=30 h=20");
}

#[test]
fn grid_rejects_unsupported_sizes() {
    let output = cli()
        .args(["grid", "--rows", "1", "--cols", "3"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
}

#[test]
fn simulate_with_fixed_seed_solves_every_image() {
    let output = cli()
        .args([
            "simulate",
            "--tabs",
            "2",
            "--images",
            "1",
            "--difficulty",
            "2",
            "--ticks",
            "20",
            "--click-chance",
            "1",
            "--solve",
        ])
        .env("PUZZLEHUNT_SEED", "11")
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("4/4\tsolved"), "{stdout}");
    assert!(stdout.contains("collected=4"), "{stdout}");
    assert!(stdout.contains("celebrations=1"), "{stdout}");
}
