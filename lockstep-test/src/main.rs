use clap::{Parser, ValueEnum};
use goblin::elf::program_header::{ProgramHeader, PT_LOAD};
use goblin::elf::Elf;
use lockstep_core::features::{Rv32e, Rv32i, Rv32iProtected, Rv32iSerial};
use lockstep_core::resources::ram::{MemoryError, Ram};
use lockstep_core::simulator::Simulator;
use lockstep_core::{Config, ConfigError, CpuCore, Features};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stderrlog::LogLevelNum;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File to write the signature region to, one word per line.
    #[arg(long, short)]
    signature: Option<PathBuf>,
    /// Give up after this many cycles.
    #[arg(long, default_value_t = 10_000_000)]
    max_cycles: u64,
    /// Core configuration to build.
    #[arg(long, value_enum, default_value_t = Preset::Rv32i)]
    features: Preset,
    #[arg(long, default_value_t = 0x8000_0000, value_parser = parse_address)]
    ram_base: u32,
    #[arg(long, default_value_t = 0x0040_0000)]
    ram_size: usize,
    /// Cycles between bus acknowledges.
    #[arg(long, default_value_t = 0)]
    latency: u32,
    /// Increase log verbosity, up to `-vvv`.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Elf file to run
    elf: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Preset {
    Rv32i,
    Rv32iSerial,
    Rv32e,
    Rv32iProtected,
}

#[derive(Error, Debug)]
enum RunError {
    #[error("failed to set up logging: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid elf file: {0}")]
    Elf(#[from] goblin::error::Error),
    #[error("failed to load program: {0}")]
    Memory(#[from] MemoryError),
    #[error("invalid core configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("RAM of {size:#x} bytes at {base:#010x} doesn't fit the address space")]
    Ram { base: u32, size: usize },
    #[error("missing symbol `{0}`")]
    MissingSymbol(&'static str),
    #[error("segment at file offset {offset:#x} ({size} bytes) runs past the end of the file")]
    Truncated { offset: u64, size: u64 },
    #[error("signature region {start:#010x}..{end:#010x} is not word aligned")]
    Signature { start: u32, end: u32 },
}

/// How the program ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Value stored to `tohost`.
    Exited(u32),
    TimedOut,
}

fn parse_address(value: &str) -> Result<u32, std::num::ParseIntError> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => value.parse(),
    }
}

fn symbol(elf: &Elf, name: &'static str) -> Result<u32, RunError> {
    elf.syms
        .iter()
        .find(|sym| elf.strtab.get_at(sym.st_name) == Some(name))
        .map(|sym| sym.st_value as u32)
        .ok_or(RunError::MissingSymbol(name))
}

/// File contents of a segment, checked against the end of the file.
fn segment<'a>(buf: &'a [u8], header: &ProgramHeader) -> Result<&'a [u8], RunError> {
    buf.get(header.file_range()).ok_or(RunError::Truncated {
        offset: header.p_offset,
        size: header.p_filesz,
    })
}

fn load(ram: &mut Ram, elf: &Elf, buf: &[u8]) -> Result<(), RunError> {
    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        debug!(
            "Loading segment at {:#010x} ({} bytes from file, {} in memory)",
            header.p_paddr, header.p_filesz, header.p_memsz
        );
        ram.load(header.p_paddr as u32, segment(buf, header)?)?;
    }
    Ok(())
}

fn simulate<C: Features>(
    args: &Args,
    elf: &Elf,
    buf: &[u8],
) -> Result<(Outcome, Simulator<C, Ram>), RunError> {
    let mut ram = Ram::new(args.ram_base, args.ram_size)
        .ok_or(RunError::Ram {
            base: args.ram_base,
            size: args.ram_size,
        })?
        .with_latency(args.latency);
    load(&mut ram, elf, buf)?;
    let tohost = symbol(elf, "tohost")?;

    let config = Config {
        boot_address: elf.entry as u32,
        ..Config::default()
    };
    let mut simulator = Simulator::new(CpuCore::<C>::new(config)?, ram);
    simulator.reset(1);
    info!("Running from {:#010x}", config.boot_address);

    let exited = |simulator: &Simulator<C, Ram>| {
        simulator
            .memory()
            .read_word(tohost)
            .is_ok_and(|value| value != 0)
    };
    let outcome = match simulator.run(args.max_cycles, exited) {
        Some(cycles) => {
            let value = simulator.memory().read_word(tohost)?;
            info!("Program exited with {value:#x} after {cycles} cycles");
            Outcome::Exited(value)
        }
        None => {
            warn!("No write to tohost after {} cycles", args.max_cycles);
            Outcome::TimedOut
        }
    };
    Ok((outcome, simulator))
}

fn write_signature(path: &Path, elf: &Elf, ram: &Ram) -> Result<(), RunError> {
    let start = symbol(elf, "begin_signature")?;
    let end = symbol(elf, "end_signature")?;
    if start % 4 != 0 || end % 4 != 0 || start > end {
        return Err(RunError::Signature { start, end });
    }
    let mut file = File::create(path)?;
    for address in (start..end).step_by(4) {
        writeln!(file, "{:08x}", ram.read_word(address)?)?;
    }
    debug!("Wrote {} signature words", (end - start) / 4);
    Ok(())
}

fn run<C: Features>(args: &Args, elf: &Elf, buf: &[u8]) -> Result<Outcome, RunError> {
    let (outcome, simulator) = simulate::<C>(args, elf, buf)?;
    if let Some(path) = &args.signature {
        write_signature(path, elf, simulator.memory())?;
    }
    Ok(outcome)
}

fn execute(args: &Args) -> Result<Outcome, RunError> {
    let verbosity = match args.verbose {
        0 => LogLevelNum::Warn,
        1 => LogLevelNum::Info,
        2 => LogLevelNum::Debug,
        _ => LogLevelNum::Trace,
    };
    stderrlog::new()
        .verbosity(verbosity)
        .modules([module_path!(), "lockstep_core"])
        .init()?;

    let mut buf = Vec::new();
    File::open(&args.elf)?.read_to_end(&mut buf)?;
    let elf = Elf::parse(&buf)?;

    match args.features {
        Preset::Rv32i => run::<Rv32i>(args, &elf, &buf),
        Preset::Rv32iSerial => run::<Rv32iSerial>(args, &elf, &buf),
        Preset::Rv32e => run::<Rv32e>(args, &elf, &buf),
        Preset::Rv32iProtected => run::<Rv32iProtected>(args, &elf, &buf),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match execute(&args) {
        // riscv-tests convention: 1 passes, otherwise the failing test number is shifted left
        Ok(Outcome::Exited(1)) => ExitCode::SUCCESS,
        Ok(Outcome::Exited(value)) => {
            warn!("Test {} failed", value >> 1);
            ExitCode::from(u8::try_from(value >> 1).unwrap_or(u8::MAX).max(1))
        }
        Ok(Outcome::TimedOut) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("lockstep-test: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(Ok(0x8000_0000), parse_address("0x8000_0000"));
        assert_eq!(Ok(4096), parse_address("4096"));
        assert!(parse_address("0xG").is_err());
    }

    #[test]
    fn test_truncated_segment() {
        let buf = [0u8; 0x40];
        let mut header = ProgramHeader {
            p_type: PT_LOAD,
            p_offset: 0x20,
            p_filesz: 0x20,
            ..ProgramHeader::default()
        };
        assert_eq!(Some(0x20), segment(&buf, &header).ok().map(<[u8]>::len));
        header.p_filesz = 0x21;
        assert!(matches!(
            segment(&buf, &header),
            Err(RunError::Truncated {
                offset: 0x20,
                size: 0x21
            })
        ));
    }

    #[test]
    fn test_arguments() {
        let args = Args::parse_from([
            "lockstep-test",
            "-vv",
            "--features",
            "rv32i-protected",
            "--ram-base",
            "0x1000",
            "test.elf",
        ]);
        assert_eq!(2, args.verbose);
        assert_eq!(Preset::Rv32iProtected, args.features);
        assert_eq!(0x1000, args.ram_base);
        assert_eq!(PathBuf::from("test.elf"), args.elf);
        assert_eq!(None, args.signature);
    }
}
