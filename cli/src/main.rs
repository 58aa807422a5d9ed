use std::{fmt::Display, fs, io::Write, time::Instant};

use clap::{Parser, ValueEnum};
use scenewire::{
    encoding::{
        binary,
        classic::ClassicExporter,
        dict::DictionaryMode,
        stats::SceneStatistics,
        xml::XmlExporter,
    },
    parser,
    CompressionProfile, EventBuffer, ExportOptions,
};

#[derive(Debug, Parser)]
#[command(name = "scenewire")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scene-description encoding converter", long_about = None)]
struct Cli {
    /// Path to the export options JSON file
    #[arg(long, short = 'c')]
    config: Option<String>,
    /// Prevents information like time elapsed from being printed.
    #[arg(long, short = 's')]
    silent: bool,
    /// Print scene statistics collected from the input
    #[arg(long)]
    stats: bool,
    /// The encoding to write
    #[clap(long, short = 't', default_value_t = EncodingName::Classic)]
    to: EncodingName,
    /// Output file; printed as hex to stdout when omitted for binary
    #[arg(long, short = 'o')]
    output: Option<String>,
    /// Skip fields whose value equals the schema default
    #[arg(long)]
    remove_defaults: bool,
    /// Assign node numbers from the canonical vocabulary table
    #[arg(long)]
    canonical: bool,
    /// Compression profile for the binary encoding
    #[arg(long)]
    compression: Option<ProfileName>,
    /// Largest acceptable error for lossy float quantization
    #[arg(long)]
    tolerance: Option<f32>,
    /// Input file: classic text, or a binary stream (.swb)
    input: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingName {
    #[value(name = "classic")]
    Classic,
    #[value(name = "xml")]
    Xml,
    #[value(name = "binary")]
    Binary,
}

impl Display for EncodingName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Classic => "classic",
            Self::Xml => "xml",
            Self::Binary => "binary",
        })
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileName {
    #[value(name = "fastest")]
    Fastest,
    #[value(name = "smallest")]
    Smallest,
    #[value(name = "lossy")]
    Lossy,
}

fn exit_with_error(args: std::fmt::Arguments) -> ! {
    eprintln!("{}", args);
    std::process::exit(1);
}

fn elapsed_to_string(start: &Instant) -> String {
    let elapsed = start.elapsed();
    let ms = elapsed.as_millis();
    let us = elapsed.as_micros();
    if ms == 0 {
        format!("{}us", us)
    } else {
        let s = elapsed.as_secs();
        if s == 0 {
            format!("{}.{:03}ms", ms, us % 1000)
        } else {
            format!("{}.{:03}s", s, ms % 1000)
        }
    }
}

fn load_options(args: &Cli) -> ExportOptions {
    let mut options = match &args.config {
        Some(path) => match fs::read_to_string(path) {
            Ok(json) => match ExportOptions::from_json(&json) {
                Ok(options) => options,
                Err(err) => {
                    exit_with_error(format_args!("failed to parse options JSON: {}", err))
                }
            },
            Err(err) => exit_with_error(format_args!(
                "failed to read options JSON file at '{}': {}",
                path, err
            )),
        },
        None => ExportOptions::default(),
    };

    if args.remove_defaults {
        options.remove_defaults = true;
    }
    if args.canonical {
        options.dictionary = DictionaryMode::Canonical;
    }
    if let Some(profile) = args.compression {
        options.compression = match profile {
            ProfileName::Fastest => CompressionProfile::Fastest,
            ProfileName::Smallest => CompressionProfile::SmallestNonlossy,
            ProfileName::Lossy => CompressionProfile::SmallestLossy,
        };
    }
    if let Some(tolerance) = args.tolerance {
        options.quantize_tolerance = tolerance;
    }

    options
}

fn read_events(path: &str, options: &ExportOptions) -> EventBuffer {
    let mut events = EventBuffer::new();

    if path.ends_with(".swb") {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                exit_with_error(format_args!("failed to read binary file '{}': {}", path, err))
            }
        };
        match binary::decode::decode(&data, &mut events, options) {
            Ok(()) => events,
            Err(err) => exit_with_error(format_args!("failed to decode '{}': {}", path, err)),
        }
    } else {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                exit_with_error(format_args!("failed to read scene file '{}': {}", path, err))
            }
        };
        match parser::parse(&source, &mut events) {
            Ok(()) => events,
            Err(err) => exit_with_error(format_args!("failed to parse '{}': {}", path, err)),
        }
    }
}

fn write_output(args: &Cli, bytes: &[u8], binary: bool) {
    match &args.output {
        Some(path) => {
            if let Err(err) = fs::write(path, bytes) {
                exit_with_error(format_args!("failed to write '{}': {}", path, err));
            }
        }
        None if binary => println!("{}", hex::encode_upper(bytes)),
        None => {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(bytes);
        }
    }
}

fn main() {
    env_logger::init();
    let args = Cli::parse();
    let options = load_options(&args);

    let start = Instant::now();
    let events = read_events(&args.input, &options);
    if !args.silent {
        println!("read {} events in {}", events.len(), elapsed_to_string(&start));
    }

    if args.stats {
        match SceneStatistics::collect(&events) {
            Ok(stats) => print!("{}", stats.report()),
            Err(err) => exit_with_error(format_args!("failed to collect statistics: {}", err)),
        }
    }

    let start = Instant::now();
    match args.to {
        EncodingName::Classic => {
            let mut exporter = ClassicExporter::new(Vec::new());
            if let Err(err) = events.replay(&mut exporter) {
                exit_with_error(format_args!("failed to export: {}", err));
            }
            write_output(&args, &exporter.into_inner(), false);
        }
        EncodingName::Xml => {
            let mut exporter = XmlExporter::new(Vec::new());
            if let Err(err) = events.replay(&mut exporter) {
                exit_with_error(format_args!("failed to export: {}", err));
            }
            match exporter.finish() {
                Ok(bytes) => write_output(&args, &bytes, false),
                Err(err) => exit_with_error(format_args!("failed to export: {}", err)),
            }
        }
        EncodingName::Binary => {
            let mut buf = Vec::with_capacity(64 * 1024);
            if let Err(err) = binary::export(&events, &mut buf, &options) {
                exit_with_error(format_args!("failed to export: {}", err));
            }
            write_output(&args, &buf, true);
        }
    }

    if !args.silent {
        println!("encoded to {} in {}", args.to, elapsed_to_string(&start));
    }
}
