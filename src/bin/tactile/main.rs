//! Host tool for the two-finger tactile sensor board.
//!
//! ```text
//! cargo run --bin tactile -- list
//! cargo run --bin tactile -- monitor --device /dev/ttyACM0
//! cargo run --bin tactile -- record --out grasp.csv --separator ";" --period 2
//! cargo run --bin tactile -- record --seconds 10 --config tactile.ron
//! ```

use clap::Parser;
use log::{error, info};
use std::{
    error::Error,
    path::PathBuf,
    time::{Duration, Instant},
};
use tactile::{
    acquisition::Acquisition,
    args::{CommandTask, TactileArgs},
    config::Config,
    csv_log::{FrameLogger, LogWorker},
    gui::{device_selector, live_view},
    sample_buffer::SampleBuffer,
    transport::{available_ports, open_serial},
};

fn main() {
    env_logger::init();
    let args = TactileArgs::parse();

    if let Err(e) = run(&args) {
        error!("{}", e);
        eprintln!("tactile: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &TactileArgs) -> Result<(), Box<dyn Error>> {
    let config = args.load_config()?;

    let record = match &args.command {
        CommandTask::List => {
            for port in available_ports()? {
                println!("{}", port.to_string_lossy());
            }
            return Ok(());
        }
        CommandTask::Monitor(_) => None,
        CommandTask::Record(record) => Some(record.seconds),
    };

    let port = match &config.port {
        Some(port) => PathBuf::from(port),
        None => match device_selector(available_ports()?)? {
            Some(port) => port,
            None => return Ok(()),
        },
    };
    let serial = open_serial(&port, config.baud_rate, config.poll_timeout())?;

    let view = SampleBuffer::new(config.view_capacity);
    let log = SampleBuffer::new(config.log_capacity);
    let mut builder = Acquisition::builder()
        .period_ms(config.period_ms)
        .buffer(view.clone());
    let mut worker = match record {
        Some(_) => {
            builder = builder.buffer(log.clone());
            let logger = FrameLogger::create(&config.log_path, &config.csv_separator)?;
            Some(LogWorker::spawn(log, logger, config.log_flush()))
        }
        None => None,
    };
    let mut acquisition = builder.start(serial);

    let res = match record {
        Some(Some(seconds)) => record_headless(&mut acquisition, seconds),
        _ => live_view(
            &mut acquisition,
            view,
            config.ui_refresh(),
            &port.to_string_lossy(),
        )
        .map_err(Into::into),
    };

    acquisition.stop()?;
    if let Some(worker) = worker.as_mut() {
        let rows = worker.stop()?;
        println!("Wrote {} frames to {}", rows, config.log_path.display());
    }
    report(&acquisition, &config);
    res
}

fn record_headless(acquisition: &mut Acquisition, seconds: u64) -> Result<(), Box<dyn Error>> {
    info!("Recording for {} s", seconds);
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        if !acquisition.is_running() {
            acquisition.stop()?;
            break;
        }
        spin_sleep::sleep(Duration::from_millis(100));
    }
    Ok(())
}

fn report(acquisition: &Acquisition, config: &Config) {
    let stats = acquisition.stats().snapshot();
    info!(
        "{} bytes, {} packets, {} rejected, {} frames at {} ms",
        stats.bytes, stats.packets, stats.rejected, stats.frames, config.period_ms
    );
}
