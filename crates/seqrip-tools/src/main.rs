use std::fs;
use std::io::{Write, stdout};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use seqrip::format::{Endian, NspcConfig, TableFormat};
use seqrip::{BytePattern, ConversionOptions, SequenceDocument};

mod input;
mod report;

use input::{load_source, read_dump_as_vec};
use report::{print_find, print_info, print_log, print_regions};

/// seqrip command line tools
#[derive(Parser)]
#[command(
    name = "seqrip",
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    /// Print debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the sequence in a dump to a Standard MIDI File
    Convert {
        #[command(flatten)]
        dump: DumpArgs,
        /// Output MIDI file (use '-' for stdout)
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// List the annotated regions of the sequence data
    Regions {
        #[command(flatten)]
        dump: DumpArgs,
        /// Only show regions down to this nesting depth
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Show tracks, measured lengths and conversion messages
    Info {
        #[command(flatten)]
        dump: DumpArgs,
    },
    /// Search a dump for a byte pattern such as "E0 ?? 12"
    Find {
        /// Input dump (gzip is detected; use '-' for stdin)
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Hex bytes separated by spaces, '??' matches any byte
        #[arg(value_name = "PATTERN")]
        pattern: String,
        /// Stop after this many matches
        #[arg(long, default_value_t = 64)]
        limit: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatKind {
    /// Reference opcode table
    Table,
    /// Nintendo SNES N-SPC driver
    Nspc,
}

#[derive(Args, Debug)]
struct DumpArgs {
    /// Input dump (gzip is detected; use '-' for stdin)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Sequence format
    #[arg(long, value_enum, default_value_t = FormatKind::Table)]
    format: FormatKind,

    /// Address dump offset 0 is loaded at (decimal, 0x or $ hex)
    #[arg(long, default_value = "0", value_parser = parse_number)]
    base: usize,

    /// N-SPC pattern address
    #[arg(long, value_parser = parse_number)]
    pattern: Option<usize>,

    /// Track start addresses, comma separated (table format)
    #[arg(long, value_delimiter = ',', value_parser = parse_number)]
    tracks: Vec<usize>,

    /// Dump offset of a 16-bit track pointer table (table format)
    #[arg(long, value_parser = parse_number)]
    pointer_table: Option<usize>,

    /// Number of entries in the pointer table
    #[arg(long, default_value_t = 1)]
    pointer_count: usize,

    /// Pointers are big-endian
    #[arg(long)]
    big_endian: bool,

    /// Ticks per quarter note (table format)
    #[arg(long, default_value_t = 48)]
    ppqn: u16,

    /// Times a looped section is repeated before the song ends
    #[arg(long, default_value_t = 1)]
    loops: u32,
}

/// Parse `123`, `0x7B` or `$7B`.
fn parse_number(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else if let Some(hex) = s.strip_prefix('$') {
        usize::from_str_radix(hex, 16)
    } else {
        s.parse::<usize>()
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn load_document(args: &DumpArgs) -> Result<SequenceDocument> {
    let source = load_source(&args.file)?;
    let name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stdin")
        .to_string();

    let mut doc = match args.format {
        FormatKind::Table => {
            let format = TableFormat {
                pointer_endian: if args.big_endian {
                    Endian::Big
                } else {
                    Endian::Little
                },
                base_address: args.base,
                ppqn: args.ppqn,
                ..TableFormat::default()
            };
            match args.pointer_table {
                Some(offset) => {
                    format.load_with_pointer_table(name, source, offset, args.pointer_count)
                }
                None if !args.tracks.is_empty() => format.load(name, source, &args.tracks),
                None => bail!("table format needs --tracks or --pointer-table"),
            }
        }
        FormatKind::Nspc => {
            let Some(pattern) = args.pattern else {
                bail!("nspc format needs --pattern");
            };
            let pattern = u16::try_from(pattern)
                .with_context(|| format!("pattern address 0x{:X} is not in ARAM", pattern))?;
            NspcConfig::new(args.base, pattern).load(name, source)
        }
    }
    .with_context(|| format!("failed to load sequence from {}", args.file.display()))?;

    doc.set_options(ConversionOptions {
        loop_count: args.loops,
        ..ConversionOptions::default()
    });
    Ok(doc)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if path == Path::new("-") {
        let mut out = stdout().lock();
        out.write_all(bytes).context("failed to write to stdout")?;
        out.flush().context("failed to flush stdout")?;
    } else {
        fs::write(path, bytes)
            .with_context(|| format!("failed to write output file: {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Convert { dump, output } => {
            let mut doc = load_document(&dump)?;
            let music = doc
                .convert()
                .with_context(|| format!("failed to convert {}", dump.file.display()))?;
            write_output(&output, &music.to_bytes())?;
            tracing::info!(
                tracks = music.tracks.len(),
                ticks = music.duration(),
                status = ?doc.status(),
                "wrote {}",
                output.display()
            );
        }
        Commands::Regions { dump, depth } => {
            let mut doc = load_document(&dump)?;
            let tree = doc
                .annotate()
                .with_context(|| format!("failed to annotate {}", dump.file.display()))?
                .clone();
            print_regions(&tree, depth);
            print_log(doc.log());
        }
        Commands::Info { dump } => {
            let mut doc = load_document(&dump)?;
            let stop = doc
                .measure()
                .with_context(|| format!("failed to measure {}", dump.file.display()))?;
            print_info(&doc, stop);
            print_log(doc.log());
        }
        Commands::Find {
            file,
            pattern,
            limit,
        } => {
            let pattern = BytePattern::parse(&pattern).context("invalid search pattern")?;
            let bytes = read_dump_as_vec(&file)?;
            print_find(bytes, &pattern, limit);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("123"), Ok(123));
        assert_eq!(parse_number("0x7B"), Ok(0x7B));
        assert_eq!(parse_number("$1F00"), Ok(0x1F00));
        assert!(parse_number("0xZZ").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
