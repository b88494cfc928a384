use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use arc::bytecode::disasm::print_program;
use arc::driver::{self, BuildOptions, DEFAULT_OUTPUT};
use arc::frontend::lexer::tokenize;
use arc::frontend::token_dumper::TokenDumper;
use arc::runtime::vm::VmConfig;

#[derive(Parser, Debug)]
#[command(name = "arc")]
#[command(about = "Compile and run Arc programs on a register bytecode VM")]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a source file into a bytecode image
    Build {
        source: PathBuf,

        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Write a bare instruction stream without the versioned header
        #[arg(long)]
        raw: bool,
    },

    /// Execute a bytecode image
    Run {
        bytecode: PathBuf,

        /// Abort after this many executed instructions
        #[arg(long, env = "ARC_MAX_STEPS")]
        max_steps: Option<u64>,
    },

    /// Print a listing of a bytecode image
    Disasm { bytecode: PathBuf },

    /// Print the tokens of a source file
    Tokens {
        source: PathBuf,

        #[arg(long)]
        no_color: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Build {
            source,
            output,
            raw,
        } => build(&source, &output, raw),
        Command::Run {
            bytecode,
            max_steps,
        } => run(&bytecode, VmConfig { max_steps }),
        Command::Disasm { bytecode } => disasm(&bytecode),
        Command::Tokens { source, no_color } => dump_tokens(&source, no_color),
    }
}

fn build(source: &Path, output: &Path, raw: bool) {
    match driver::build_file(source, output, &BuildOptions { raw }) {
        Ok(report) => {
            info!(instructions = report.instructions, bytes = report.bytes, "compiled");
            println!("Compiled to {}", report.output.display());
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run(bytecode: &Path, config: VmConfig) {
    match driver::run_file(bytecode, &config) {
        Ok(execution) => {
            if let Some(line) = driver::result_line(&execution) {
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn disasm(bytecode: &Path) {
    match driver::load_image(bytecode) {
        Ok(image) => print_program(&image.program, image.symbols.as_ref()),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn dump_tokens(source: &Path, no_color: bool) {
    let text = match fs::read_to_string(source) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("cannot read '{}': {}", source.display(), e);
            process::exit(1);
        }
    };

    match tokenize(&text) {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();
            if no_color {
                dumper = dumper.no_color();
            }
            dumper.dump(&tokens);
        }
        Err(e) => {
            eprintln!("lexer error: {}", e);
            process::exit(1);
        }
    }
}
