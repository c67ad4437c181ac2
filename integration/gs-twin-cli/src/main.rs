use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process;

use gs_twin_cli::scenarios;

#[derive(Parser)]
#[command(name = "gs-twin-cli")]
#[command(about = "Drive the pico-gs software GPU core through scripted scenarios", long_about = None)]
struct Cli {
    /// Which scenario to run
    scenario: Scenario,

    /// Write the rendered framebuffer here, for scenarios that render (A, B)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// Identity VS, flat red triangle
    A,
    /// Perspective-correct interpolation across divergent w
    B,
    /// CALL/END control flow
    C,
    /// TEV modulate
    D,
    /// Fill engine byte-swapped write
    E,
    /// Texture wrap modes
    F,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.scenario {
        Scenario::A => scenarios::identity_vs_flat_triangle(cli.output.as_deref()),
        Scenario::B => scenarios::perspective_correctness(cli.output.as_deref()),
        Scenario::C => scenarios::call_and_return(),
        Scenario::D => scenarios::tev_modulate(),
        Scenario::E => scenarios::fill_engine(),
        Scenario::F => scenarios::wrap_modes(),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}
