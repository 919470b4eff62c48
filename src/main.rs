#![deny(missing_docs)]

//! Entry point for the `oneshot` command-line tool.
use oneshot::capture::StopHandle;
use oneshot::cli::{self, Command};
use oneshot::config;
use oneshot::logging;
use oneshot::part::PartStore;
use oneshot::pipeline::{self, Collaborators};
use oneshot::vision::open_rgb;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = match cli::parse_args(std::env::args().skip(1).collect()) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    for flag in &options.ignored {
        tracing::warn!("Ignoring unknown flag {flag}");
    }

    let config = config::load_or_default()?.with_overrides(&options.overrides)?;
    let store = PartStore::open_default()?;
    let collaborators = Collaborators::from_config(&config);

    match options.command {
        Command::Add { part, snapshot } => {
            let image = open_rgb(&snapshot)?;
            let outcome = pipeline::add_part(&store, &part, &image, &config, &collaborators)?;
            print_report(&part, &outcome.report);
        }
        Command::Extra { part, class, image } => {
            let image = open_rgb(&image)?;
            let path = pipeline::add_extra(&store, &part, class, &image, &config)?;
            println!("Saved {}", path.display());
        }
        Command::Train { part } => {
            let outcome = pipeline::retrain_part(&store, &part, &config, &collaborators)?;
            print_report(&part, &outcome.report);
        }
        Command::Run { part, frames, out } => {
            let stop = StopHandle::new();
            let summary = pipeline::run_part(
                &store,
                &part,
                &frames,
                out.as_deref(),
                &config,
                &collaborators,
                &stop,
            )?;
            println!(
                "{} frames: {} match, {} possible match, {} no match ({} missed)",
                summary.frames, summary.matches, summary.possible_matches, summary.no_matches, summary.missed
            );
        }
        Command::Restore { part } => {
            let paths = pipeline::restore_part(&store, &part)?;
            println!("Restored {}", paths.root.display());
        }
        Command::List => {
            for name in store.list()? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn print_report(part: &str, report: &oneshot::ml::TrainingReport) {
    println!("Trained {part} for {} epochs", report.history.len());
    if let Some(epoch) = report.best_loss_epoch {
        println!("Best validation loss {:.5} at epoch {epoch}", report.best_valid_loss);
    }
    if let Some(epoch) = report.stopped_early_at {
        println!("Stopped early at epoch {epoch}");
    }
}
