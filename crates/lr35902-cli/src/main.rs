mod config;

use clap::{Parser, Subcommand};
use log::{debug, error, info, trace, warn};
use lr35902_core::serial::SerialCapture;
use lr35902_core::{Cpu, Disassembler, FlatMemory};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "LR35902 execution and disassembly front-end")]
struct Args {
    /// Enable trace logging of CPU state
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the code reachable from an entry point
    Disasm {
        /// Path to ROM file
        rom: PathBuf,

        /// Entry point, in hex
        #[arg(long, value_parser = config::parse_addr, default_value = "0100")]
        start: u16,

        /// Only follow the fall-through edge of conditional branches
        #[arg(long)]
        strict: bool,

        /// Debugger config (defaults to the per-user config file)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Execute a ROM until a breakpoint, an invalid instruction or the step limit
    Run {
        /// Path to ROM file
        rom: PathBuf,

        /// Maximum number of instructions to execute
        #[arg(long)]
        steps: Option<u64>,

        /// Debugger config (defaults to the per-user config file)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serial peer to connect to
        #[arg(long)]
        link: Option<String>,

        /// Run without stopping at breakpoints
        #[arg(long)]
        no_breakpoints: bool,
    },
}

fn init_logging(debug: bool) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if debug {
        builder.filter_level(log::LevelFilter::Trace);
    }
    builder.init();
}

fn load_rom(path: &Path) -> Option<FlatMemory> {
    match std::fs::read(path) {
        Ok(rom) => Some(FlatMemory::from_rom(&rom)),
        Err(e) => {
            error!("Failed to load ROM {}: {e}", path.display());
            None
        }
    }
}

fn disasm(rom: &Path, start: u16, strict: bool, config_path: Option<PathBuf>) -> ExitCode {
    let config_path = config_path.unwrap_or_else(config::default_config_path);
    let cfg = config::load_from_file(&config_path);
    let Some(mem) = load_rom(rom) else {
        return ExitCode::FAILURE;
    };
    let dis = Disassembler::new(&mem);
    print!("{}", dis.listing(start, cfg.permissive && !strict));
    ExitCode::SUCCESS
}

struct RunOptions {
    steps: Option<u64>,
    config: Option<PathBuf>,
    link: Option<String>,
    no_breakpoints: bool,
}

fn run(rom: &Path, opts: RunOptions) -> ExitCode {
    let config_path = opts.config.unwrap_or_else(config::default_config_path);
    let cfg = config::load_from_file(&config_path);
    debug!("Using debugger config {}", config_path.display());

    let Some(mem) = load_rom(rom) else {
        return ExitCode::FAILURE;
    };
    let mut mem = SerialCapture::new(mem);

    if let Some(name) = opts.link {
        let peers = mem.transport_mut().discover();
        debug!("Serial peers: {peers:?}");
        if let Err(e) = mem.transport_mut().connect(&name) {
            warn!("{e}; continuing without a link cable");
        }
    }

    let mut cpu = Cpu::new();
    if let Some(start) = cfg.start {
        cpu.regs.pc = start.0;
    }
    let sets = cfg.breakpoints.to_sets();
    let limit = opts.steps.unwrap_or(cfg.steps);

    info!("Running {} for up to {limit} steps", rom.display());
    let mut status = ExitCode::SUCCESS;
    for _ in 0..limit {
        trace!("{}", cpu.debug_state());
        let before = cpu.cycles();
        match cpu.step_with_breakpoints(&mut mem, &sets, opts.no_breakpoints) {
            Ok(Some(hit)) => {
                println!(
                    "Breakpoint ({:?}) on ${:04X} at PC=${:04X}",
                    hit.kind, hit.addr, hit.pc
                );
                break;
            }
            Ok(None) => {}
            Err(e) => {
                error!("{e}");
                status = ExitCode::FAILURE;
                break;
            }
        }
        let elapsed = cpu.cycles() - before;
        mem.transport_mut().step(elapsed.min(u8::MAX as u64) as u8);
        if cpu.stopped() {
            info!("CPU entered STOP");
            break;
        }
    }

    let serial = mem.output_lossy();
    if !serial.is_empty() {
        println!("{serial}");
    }
    println!("{}", cpu.debug_state());
    status
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    match args.command {
        Command::Disasm {
            rom,
            start,
            strict,
            config,
        } => disasm(&rom, start, strict, config),
        Command::Run {
            rom,
            steps,
            config,
            link,
            no_breakpoints,
        } => run(
            &rom,
            RunOptions {
                steps,
                config,
                link,
                no_breakpoints,
            },
        ),
    }
}
