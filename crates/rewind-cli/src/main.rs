use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rewind_core::analysis::{liveness_from_path, tracked_values_from_path};
use rewind_core::ir::printer::print_module;
use rewind_core::ir::Module;
use rewind_core::transforms::CheckpointInjection;

#[derive(Parser)]
#[command(name = "rewind", about = "Checkpoint subroutine injection for SSA IR modules")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inject checkpoint save/restore subroutines into a module.
    Inject {
        /// Path to a JSON IR module file.
        module: PathBuf,
        /// Tracked-values analysis results.
        #[arg(long, default_value = "tracked_values.json")]
        tracked_values: PathBuf,
        /// Liveness analysis results.
        #[arg(long, default_value = "live_values.json")]
        live_values: PathBuf,
        /// Where to write the transformed module; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print a JSON-serialized IR module in human-readable form.
    Print {
        /// Path to a JSON IR module file.
        file: PathBuf,
    },
}

fn load_module(path: &Path) -> Result<Module> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing module {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Inject {
            module,
            tracked_values,
            live_values,
            output,
        } => {
            let mut m = load_module(&module)?;
            let tracked = tracked_values_from_path(&tracked_values)
                .with_context(|| format!("loading {}", tracked_values.display()))?;
            let live = liveness_from_path(&live_values)
                .with_context(|| format!("loading {}", live_values.display()))?;

            let pass = CheckpointInjection::new(tracked, live);
            let outcome = pass.run(&mut m);
            for d in &outcome.diagnostics {
                eprintln!("warning: {d}");
            }

            let json = serde_json::to_string_pretty(&m)?;
            match &output {
                Some(path) => std::fs::write(path, json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{json}"),
            }
            eprintln!(
                "{}: {}",
                module.display(),
                if outcome.changed { "modified" } else { "unchanged" }
            );
        }
        Command::Print { file } => {
            let m = load_module(&file)?;
            print!("{}", print_module(&m));
        }
    }
    Ok(())
}
