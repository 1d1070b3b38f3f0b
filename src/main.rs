//! apu-trace: replay a register trace and print the committed slots as CSV.
//! Built only with the `trace` feature (see `required-features` in Cargo.toml).

mod cli {
    use anyhow::{bail, Context, Result};
    use log::{info, LevelFilter};
    use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
    use std::env;
    use std::fs;
    use std::io::{self, Write};

    use apu_bridge::trace::{parse_trace, write_pcm_csv, write_slots_csv, Replayer};
    use apu_bridge::{Apu, EngineConfig, FlatMemory, MemorySink, Region};

    const USAGE: &str = "Usage:\n  apu-trace [options] <trace.txt>\n\nOptions:\n  --pal                Use PAL timing (default NTSC)\n  --config <file>      Load engine settings from a JSON file\n  --prg <file>         Map a 32 KiB image at $8000 for DMC samples\n  --pcm                Print the PCM delta stream instead of parameter slots\n  -o, --output <file>  Write CSV to a file instead of stdout\n  -v, -vv              Debug / trace logging on stderr\n  -h, --help           Show this help\n";

    #[derive(Default)]
    struct Options {
        pal: bool,
        config: Option<String>,
        prg: Option<String>,
        pcm: bool,
        output: Option<String>,
        verbosity: u8,
        trace: Option<String>,
    }

    fn parse_args() -> Result<Option<Options>> {
        let mut options = Options::default();
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--pal" => options.pal = true,
                "--pcm" => options.pcm = true,
                "-v" => options.verbosity = options.verbosity.max(1),
                "-vv" => options.verbosity = 2,
                "--config" => {
                    options.config = Some(args.next().context("--config requires a file")?)
                }
                "--prg" => options.prg = Some(args.next().context("--prg requires a file")?),
                "-o" | "--output" => {
                    options.output = Some(args.next().context("--output requires a file")?)
                }
                "-h" | "--help" => {
                    print!("{USAGE}");
                    return Ok(None);
                }
                _ if arg.starts_with('-') => bail!("unknown option {arg}\n\n{USAGE}"),
                _ => {
                    if options.trace.replace(arg).is_some() {
                        bail!("only one trace file may be given\n\n{USAGE}");
                    }
                }
            }
        }
        if options.trace.is_none() {
            bail!("missing trace file\n\n{USAGE}");
        }
        Ok(Some(options))
    }

    fn init_logging(verbosity: u8) -> Result<()> {
        let level = match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )
        .context("failed to initialise logging")
    }

    pub fn run() -> Result<()> {
        let Some(options) = parse_args()? else {
            return Ok(());
        };
        init_logging(options.verbosity)?;

        let mut config = match &options.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {path}"))?;
                EngineConfig::from_json(&text)?
            }
            None => EngineConfig::default(),
        };
        if options.pal {
            config.region = Region::Pal;
        }

        let memory = match &options.prg {
            Some(path) => {
                let image = fs::read(path).with_context(|| format!("failed to read {path}"))?;
                FlatMemory::with_image(&image, 0x8000)?
            }
            None => FlatMemory::new(),
        };

        let trace_path = options.trace.as_deref().unwrap_or_default();
        let text = fs::read_to_string(trace_path)
            .with_context(|| format!("failed to read trace {trace_path}"))?;
        let events = parse_trace(&text)?;
        info!("{} accesses in {trace_path}", events.len());

        let apu = Apu::new(config, MemorySink::new(), memory)?;
        let mut replayer = Replayer::new(apu);
        let summary = replayer.run(&events).clone();
        let sink = replayer.into_apu().into_parts().0;

        let out: Box<dyn Write> = match &options.output {
            Some(path) => Box::new(
                fs::File::create(path).with_context(|| format!("failed to create {path}"))?,
            ),
            None => Box::new(io::stdout().lock()),
        };
        if options.pcm {
            write_pcm_csv(sink.pcm_writes(), out)?;
        } else {
            write_slots_csv(sink.slots(), out)?;
        }

        eprintln!(
            "{} frames, {} accesses, {} slots, {} PCM writes, {} status reads",
            summary.frames,
            summary.events,
            sink.slots().len(),
            sink.pcm_writes().len(),
            summary.status_reads.len()
        );
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    cli::run()
}
