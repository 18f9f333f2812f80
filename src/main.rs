use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hitreg_patcher::{patch_map_file, Operation, PatchConfig};

#[derive(Parser)]
#[command(name = "cea-hitreg-patcher")]
#[command(about = "Give every weapon in a MCC CEA multiplayer map the pistol's client-side hit detection")]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Cache file to modify in place
    map : PathBuf,

    /// What to do to it
    #[arg(value_enum)]
    mode : Mode
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Patch,
    Undo
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let raw : Vec<OsString> = std::env::args_os().collect();
    let args = match parse_args(&raw) {
        Some(n) => n,
        None => {
            let program = match raw.first() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => "cea-hitreg-patcher".to_owned()
            };
            println!("Usage: {} <map> <patch/undo>", program);
            return ExitCode::FAILURE;
        }
    };

    let operation = match args.mode {
        Mode::Patch => Operation::Apply,
        Mode::Undo => Operation::Revert
    };

    match patch_map_file(&args.map, operation, &PatchConfig::default()) {
        Ok(report) => {
            debug!("{:?}", report);
            match operation {
                Operation::Apply => println!("{} was successfully patched", args.map.display()),
                Operation::Revert => println!("{} was successfully unpatched", args.map.display())
            }
            ExitCode::SUCCESS
        },
        Err(e) => {
            // File system errors already name the file.
            if e.is_io() {
                eprintln!("{}", e);
            }
            else {
                eprintln!("{}: {}", args.map.display(), e);
            }
            ExitCode::FAILURE
        }
    }
}

/// Parse `<program> <map> <patch|undo>`. Both arguments are taken literally, so a map whose name
/// starts with `-` is still a map, and anything else (including `--help`) is a usage error.
fn parse_args(raw : &[OsString]) -> Option<Args> {
    if raw.len() != 3 {
        return None;
    }
    let argv = [raw[0].clone(), OsString::from("--"), raw[1].clone(), raw[2].clone()];
    match Args::try_parse_from(argv) {
        Ok(n) => Some(n),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}
