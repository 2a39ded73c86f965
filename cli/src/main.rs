mod simulate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use puzzlehunt_core::{difficulty_choices, difficulty_label, GridDims, FEED_CAPACITY_DEFAULT};
use puzzlehunt_image_pipeline::{decode_rgba8, encode_png, slice};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::simulate::SimConfig;

#[derive(Parser)]
#[command(name = "puzzlehunt-cli", version, about = "Offline tools for the puzzle hunt extension")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the difficulty choices, or the piece rectangles of one grid.
    Grid {
        #[arg(long, requires = "cols")]
        rows: Option<u32>,
        #[arg(long, requires = "rows")]
        cols: Option<u32>,
        #[arg(long, default_value_t = 600)]
        width: u32,
        #[arg(long, default_value_t = 600)]
        height: u32,
    },
    /// Cuts an image into one PNG per piece.
    Slice {
        input: PathBuf,
        #[arg(long)]
        rows: u32,
        #[arg(long)]
        cols: u32,
        #[arg(long, default_value = "pieces")]
        out_dir: PathBuf,
    },
    /// Runs background, tabs and gallery headlessly and reports progress.
    Simulate {
        #[arg(long, default_value_t = 3)]
        tabs: usize,
        #[arg(long, default_value_t = 2)]
        images: usize,
        #[arg(long, default_value_t = 3)]
        difficulty: u32,
        #[arg(long, default_value_t = 1)]
        frequency: i64,
        #[arg(long, default_value_t = 100)]
        ticks: u32,
        #[arg(long, default_value_t = 0.5)]
        click_chance: f64,
        #[arg(long, default_value_t = FEED_CAPACITY_DEFAULT)]
        feed_capacity: u32,
        #[arg(long, env = "PUZZLEHUNT_SEED")]
        seed: Option<u64>,
        #[arg(long)]
        solve: bool,
    },
}

fn grid_dims(rows: u32, cols: u32) -> Result<GridDims, String> {
    GridDims::new(rows, cols).ok_or_else(|| format!("unsupported grid {rows}x{cols}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Grid {
            rows,
            cols,
            width,
            height,
        } => match (rows, cols) {
            (Some(rows), Some(cols)) => {
                let dims = grid_dims(rows, cols)?;
                for piece in 0..dims.total() {
                    if let Some(rect) = dims.piece_rect(piece, width, height) {
                        println!(
                            "{piece}\tx={} y={} w={} h={}",
                            rect.x, rect.y, rect.width, rect.height
                        );
                    }
                }
            }
            _ => {
                for choice in difficulty_choices() {
                    println!("{}\t{}", choice.difficulty, difficulty_label(&choice));
                }
            }
        },
        Commands::Slice {
            input,
            rows,
            cols,
            out_dir,
        } => {
            let dims = grid_dims(rows, cols)?;
            let bytes = std::fs::read(&input)?;
            let image = decode_rgba8(&bytes)?;
            let pieces = slice(&image, dims)?;
            std::fs::create_dir_all(&out_dir)?;
            for (index, piece) in pieces.iter().enumerate() {
                let path = out_dir.join(format!("piece-{index:03}.png"));
                std::fs::write(&path, encode_png(piece)?)?;
            }
            tracing::info!(
                count = pieces.len(),
                out_dir = %out_dir.display(),
                "wrote pieces"
            );
        }
        Commands::Simulate {
            tabs,
            images,
            difficulty,
            frequency,
            ticks,
            click_chance,
            feed_capacity,
            seed,
            solve,
        } => {
            let seed = seed.unwrap_or_else(rand::random);
            tracing::info!(seed, "starting simulation");
            let report = simulate::run(SimConfig {
                tabs,
                images,
                difficulty,
                frequency,
                ticks,
                click_chance,
                feed_capacity,
                seed,
                solve,
            })
            .await?;
            for image in &report.images {
                println!(
                    "{}\t{}\t{}/{}\t{}",
                    image.id,
                    image.label,
                    image.collected,
                    image.total,
                    if image.completed { "solved" } else { "open" }
                );
            }
            println!(
                "shown={} clicks={} collected={} withdrawn={} relayed={} cursor={} celebrations={}",
                report.shown,
                report.clicks,
                report.collected,
                report.withdrawn,
                report.relayed,
                report.cursor,
                report.celebrations
            );
        }
    }
    Ok(())
}
