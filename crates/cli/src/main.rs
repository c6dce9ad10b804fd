//! Pipelined processor simulator CLI.
//!
//! This binary is the entry point for simulation runs. It performs:
//! 1. **Run:** Load an ELF or flat binary, build the configured machine, run it and
//!    print the program's output followed by statistics.
//! 2. **Check:** Parse and validate a JSON configuration file without running.
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` (for example
//! `RUST_LOG=commit=trace`) to see retired instructions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pipesim_core::common::error::Result;
use pipesim_core::config::{Config, CoreModel, Isa};
use pipesim_core::sim::{Simulator, load_program};
use pipesim_core::stats::STATS_SECTIONS;

#[derive(Parser, Debug)]
#[command(
    name = "pipesim",
    author,
    version,
    about = "Pipelined processor simulator for RISC-V and AArch64",
    long_about = "Run a RISC-V or AArch64 program on an emulation, in-order or out-of-order core.\n\nExamples:\n  pipesim run prog.elf\n  pipesim run prog.elf --isa aarch64 --model in-order --config core.json\n  pipesim check core.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program.
    Run {
        /// ELF executable or flat binary.
        program: PathBuf,

        /// JSON configuration file; defaults are used for absent sections.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Instruction set, overriding the configuration.
        #[arg(long, value_enum)]
        isa: Option<IsaArg>,

        /// Core model, overriding the configuration.
        #[arg(long, value_enum)]
        model: Option<ModelArg>,

        /// Stop after this many ticks.
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Statistics sections to print (summary, core, program); all when omitted.
        #[arg(long, value_delimiter = ',')]
        stats: Vec<String>,
    },

    /// Validate a configuration file.
    Check {
        /// JSON configuration file.
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IsaArg {
    Riscv,
    Aarch64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelArg {
    Emulation,
    InOrder,
    OutOfOrder,
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run {
            program,
            config,
            isa,
            model,
            max_ticks,
            stats,
        } => cmd_run(&program, config.as_deref(), isa, model, max_ticks, &stats),
        Commands::Check { config } => cmd_check(&config),
    };

    match outcome {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("\n[!] FATAL: {e}");
            process::exit(1);
        }
    }
}

fn cmd_run(
    program: &Path,
    config_path: Option<&Path>,
    isa: Option<IsaArg>,
    model: Option<ModelArg>,
    max_ticks: Option<u64>,
    sections: &[String],
) -> Result<i32> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(isa) = isa {
        config.core.isa = match isa {
            IsaArg::Riscv => Isa::Riscv,
            IsaArg::Aarch64 => Isa::Aarch64,
        };
    }
    if let Some(model) = model {
        config.core.model = match model {
            ModelArg::Emulation => CoreModel::Emulation,
            ModelArg::InOrder => CoreModel::InOrder,
            ModelArg::OutOfOrder => CoreModel::OutOfOrder,
        };
    }
    if max_ticks.is_some() {
        config.core.max_ticks = max_ticks;
    }
    for section in sections {
        if !STATS_SECTIONS.contains(&section.as_str()) {
            eprintln!("unknown stats section '{section}', expected one of {STATS_SECTIONS:?}");
        }
    }

    let process = load_program(program, config.memory.size)?;
    let mut sim = Simulator::new(&config, &process)?;
    let report = sim.run();

    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(&report.stdout);
    let _ = stdout.flush();
    let _ = std::io::stderr().write_all(&report.stderr);

    if !report.halted {
        println!("\nstopped at tick limit");
    }
    print!("{}", report.stats.render_sections(sections));

    Ok(report.exit_code().map_or(0, |code| code as i32))
}

fn cmd_check(path: &Path) -> Result<i32> {
    let config = Config::from_file(path)?;
    println!(
        "{}: ok ({:?} isa, {:?} core, {} ports)",
        path.display(),
        config.core.isa,
        config.core.model,
        config.ports.len()
    );
    Ok(0)
}
