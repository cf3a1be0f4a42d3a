use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, LevelFilter};

use cramconv::container::ContainerReader;
use cramconv::sink::DEFAULT_BUFFER_SIZE;
use cramconv::{
    BufferedSink, ContainerSource, RecordSink, RunConfigBuilder, RunController, SamWriter,
    ValidationPolicy,
};

/// Converts a container stream into SAM records, or counts its records and bases
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Input container stream [default: standard input]
    #[arg(short = 'I', long = "input-cram-file")]
    input: Option<PathBuf>,

    /// Output file [default: standard output]
    #[arg(short = 'O', long = "output-bam-file")]
    output: Option<PathBuf>,

    /// Write the @HD and @SQ header lines before the records
    #[arg(long)]
    print_sam_header: bool,

    /// Only count records and bases
    #[arg(short = 'c', long)]
    count_only: bool,

    /// Keep only records with at least one of these flag bits (decimal or 0x hex)
    #[arg(short = 'f', long, default_value = "0", value_parser = parse_flags)]
    required_flags: u16,

    /// Drop records with any of these flag bits (decimal or 0x hex)
    #[arg(short = 'F', long = "filter-flags", default_value = "0", value_parser = parse_flags)]
    forbidden_flags: u16,

    /// Quality character used when quality scores were not preserved
    #[arg(long, default_value = "?", value_parser = parse_quality)]
    default_quality_score: u8,

    /// Stop after this many records were written or counted
    #[arg(long)]
    max_records: Option<u64>,

    /// How format irregularities are treated: strict, lenient or silent
    #[arg(long, default_value = "silent")]
    validation_stringency: ValidationPolicy,

    /// Write records from the decoding thread instead of a dedicated writer thread
    #[arg(long)]
    sync_bam_output: bool,

    /// Number of records queued for the writer thread
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    async_bam_buffer: usize,

    /// Log level: error, warn, info, debug or trace
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: LevelFilter,
}

fn parse_flags(value: &str) -> std::result::Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid flag mask '{value}': {e}"))
}

/// Accepts either a single quality character or its ASCII code
fn parse_quality(value: &str) -> std::result::Result<u8, String> {
    let quality = match value.as_bytes() {
        [c] if !c.is_ascii_digit() => *c,
        _ => value
            .parse()
            .map_err(|e| format!("invalid quality score '{value}': {e}"))?,
    };
    if quality < b'!' {
        return Err(format!("quality score {quality} is below 33 ('!')"));
    }
    Ok(quality)
}

fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn run(args: &Args) -> Result<()> {
    let config = RunConfigBuilder::default()
        .count_only(args.count_only)
        .required_flags(args.required_flags)
        .forbidden_flags(args.forbidden_flags)
        .max_records(args.max_records)
        .validation(args.validation_stringency)
        .default_quality(args.default_quality_score)
        .build()?;

    let mut source = ContainerReader::new(open_input(args.input.as_ref())?)
        .context("Failed to read the container stream header")?;
    let controller = RunController::new(config);

    if args.count_only {
        let report = controller.run(&mut source, None)?;
        writeln!(io::stdout(), "{}", report.statistics)?;
        info!("Stopped: {}", report.reason);
        return Ok(());
    }

    let writer = SamWriter::new(
        open_output(args.output.as_ref())?,
        source.header(),
        args.print_sam_header,
    )?;
    let mut sink: Box<dyn RecordSink> = if args.sync_bam_output {
        Box::new(writer)
    } else {
        Box::new(BufferedSink::new(writer, args.async_bam_buffer)?)
    };
    let report = controller.run(&mut source, Some(sink.as_mut()))?;
    info!(
        "Stopped: {}; wrote {} records with {} bases from {} containers, filtered {}",
        report.reason,
        report.statistics.records,
        report.statistics.bases,
        report.statistics.containers,
        report.statistics.filtered,
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // help and version go to stdout and succeed
            if !e.use_stderr() {
                e.exit();
            }
            let _ = e.print();
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    run(&args)
}
