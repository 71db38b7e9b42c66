//! sdrec CLI: record from a test tone or the default input into RECORDnn.RAW
//! files, driven by single-key commands; convert recordings to WAV.

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use sdrec::command::{command_channel, execute, Command, CommandSender};
use sdrec::config::RecorderConfig;
use sdrec::controller::recording_pipeline;
use sdrec::convert::SampleFormat;
use sdrec::export::{export_wav, RawLayout};
use sdrec::interrupt::{AudioInterrupt, BlockClock};
use sdrec::sample_queue::StereoProducer;
use sdrec::source::{Silence, SineSource};
use sdrec::storage::{FsDevice, MemDevice, StorageDevice};

const COMMAND_CAPACITY: usize = 16;
const TICK: Duration = Duration::from_millis(1);

#[derive(Parser, Debug)]
#[command(name = "sdrec")]
#[command(about = "Buffered multi-channel audio recorder")]
struct Cli {
    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Record with single-key commands (h for help)
    Record(RecordArgs),
    /// Convert a raw recording to WAV
    Convert(ConvertArgs),
}

#[derive(clap::Args, Debug)]
struct RecordArgs {
    /// Config file (default: <config dir>/sdrec/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory recordings are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Storage sample format (int16 or float32)
    #[arg(long)]
    format: Option<SampleFormat>,
    /// Channels written to the file (1 or 2)
    #[arg(long)]
    channels: Option<u8>,
    #[arg(long, value_enum, default_value_t = SourceKind::Tone)]
    source: SourceKind,
    /// Record into memory instead of files
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    input: PathBuf,
    /// Output path (default: input with a .wav extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, default_value = "int16")]
    format: SampleFormat,
    #[arg(long, default_value = "2")]
    channels: u16,
    #[arg(long, default_value = "44100")]
    sample_rate: u32,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SourceKind {
    /// 440/660 Hz sine on left/right
    Tone,
    Silence,
    /// Default capture device
    Input,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            // Raw mode does not translate \n, so terminate lines explicitly.
            write!(buf, "[{} {}] {}\r\n", record.level(), record.target(), record.args())
        })
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Mode::Record(args) => record(args),
        Mode::Convert(args) => convert(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn convert(args: ConvertArgs) -> Result<(), Box<dyn Error>> {
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("wav"));
    let layout = RawLayout {
        format: args.format,
        channels: args.channels,
        sample_rate: args.sample_rate,
    };
    export_wav(&args.input, &output, layout)?;
    Ok(())
}

fn record(args: RecordArgs) -> Result<(), Box<dyn Error>> {
    let config_path = args.config.clone().unwrap_or_else(RecorderConfig::default_path);
    let mut config = RecorderConfig::load(&config_path)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(format) = args.format {
        config.write_format = format;
    }
    if let Some(channels) = args.channels {
        config.write_channels = channels;
    }
    config.validate()?;
    log::info!("Using config {}", config_path.display());

    if args.dry_run {
        run(MemDevice::new(), &config, args.source, |device| {
            for name in device.file_names() {
                log::info!("{name}: {} bytes", device.file(name).map_or(0, <[u8]>::len));
            }
        })
    } else {
        run(FsDevice::new(&config.output_dir), &config, args.source, |_| {})
    }
}

/// Whatever is feeding the queues; dropping it stops production.
enum Producer {
    Clock(BlockClock),
    #[cfg(feature = "input")]
    Input(sdrec::capture::InputCapture),
}

impl Producer {
    fn stop(self) {
        match self {
            Producer::Clock(clock) => {
                let fired = clock.stop();
                log::debug!("Block clock fired {fired} times");
            }
            #[cfg(feature = "input")]
            Producer::Input(capture) => {
                log::debug!("Closing {}-channel input stream", capture.channels());
            }
        }
    }

    /// Rate blocks are arriving at, when the source decides it rather than the config.
    fn device_sample_rate_hz(&self) -> Option<u32> {
        match self {
            Producer::Clock(_) => None,
            #[cfg(feature = "input")]
            Producer::Input(capture) => Some(capture.sample_rate_hz()),
        }
    }
}

fn start_producer(
    kind: SourceKind,
    producer: StereoProducer,
    sample_rate_hz: u32,
) -> Result<Producer, Box<dyn Error>> {
    match kind {
        SourceKind::Tone => {
            let irq = AudioInterrupt::new(SineSource::test_tone(sample_rate_hz), producer);
            Ok(Producer::Clock(BlockClock::spawn(irq, sample_rate_hz)))
        }
        SourceKind::Silence => {
            let irq = AudioInterrupt::new(Silence, producer);
            Ok(Producer::Clock(BlockClock::spawn(irq, sample_rate_hz)))
        }
        #[cfg(feature = "input")]
        SourceKind::Input => Ok(Producer::Input(sdrec::capture::open_input_stream(
            producer,
            sample_rate_hz,
        )?)),
        #[cfg(not(feature = "input"))]
        SourceKind::Input => Err("built without the `input` feature".into()),
    }
}

/// Restores the terminal when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Reads keys until quit, forwarding them to the recording loop.
fn spawn_console(mut cmd_tx: CommandSender, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::Acquire) {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    log::error!("console: {err}");
                    let _ = cmd_tx.try_send(Command::Quit);
                    return;
                }
            }
            let Ok(Event::Key(KeyEvent {
                code: KeyCode::Char(key),
                modifiers,
                kind: KeyEventKind::Press,
                ..
            })) = event::read()
            else {
                continue;
            };
            let cmd = if modifiers.contains(KeyModifiers::CONTROL) && key == 'c' {
                Some(Command::Quit)
            } else {
                Command::from_key(key)
            };
            if let Some(cmd) = cmd {
                if cmd_tx.try_send(cmd).is_err() {
                    log::warn!("command queue full, dropped {cmd:?}");
                }
                if cmd == Command::Quit {
                    return;
                }
            }
        }
    })
}

/// Runs the recording loop until quit, then hands the device to `report`.
fn run<D: StorageDevice>(
    device: D,
    config: &RecorderConfig,
    source: SourceKind,
    report: impl FnOnce(&D),
) -> Result<(), Box<dyn Error>> {
    let (mut controller, producer) = recording_pipeline(device, config)?;
    let producer = start_producer(source, producer, config.sample_rate_hz)?;
    if let Some(rate_hz) = producer.device_sample_rate_hz() {
        controller.set_sample_rate_hz(rate_hz)?;
        if rate_hz != config.sample_rate_hz {
            log::info!("Convert recordings with --sample-rate {rate_hz}");
        }
    }

    let _raw_mode = RawModeGuard::enable()?;
    log::info!("Ready. p to prepare storage, r to record, s to stop, q to quit, h for help.");
    let (cmd_tx, mut cmd_rx) = command_channel(COMMAND_CAPACITY);
    let running = Arc::new(AtomicBool::new(true));
    let console = spawn_console(cmd_tx, Arc::clone(&running));

    let outcome = 'outer: loop {
        while let Some(cmd) = cmd_rx.try_recv() {
            match execute(cmd, &mut controller) {
                Ok(flow) if flow.is_break() => break 'outer Ok(()),
                Ok(_) => {}
                Err(err) => break 'outer Err(err),
            }
        }
        controller.service();
        controller.report_overrun();
        thread::sleep(TICK);
    };

    running.store(false, Ordering::Release);
    let _ = console.join();
    producer.stop();
    if controller.state() == sdrec::RecordingState::Recording {
        controller.stop()?;
    }
    log::info!("{}", controller.status());
    report(controller.device());
    outcome?;
    Ok(())
}
