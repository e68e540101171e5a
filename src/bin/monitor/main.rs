//! Runs the live view against a simulated sensor board, optionally logging
//! what it sees.
//!
//! ```text
//! cargo run --bin monitor -- --corruption 0.001 --out simulated.csv
//! ```

use clap::Parser;
use log::error;
use std::error::Error;
use tactile::{
    acquisition::Acquisition,
    args::DummyArgs,
    csv_log::{FrameLogger, LogWorker},
    dummy_device::DummyDevice,
    gui::live_view,
    sample_buffer::SampleBuffer,
};

fn main() {
    env_logger::init();
    let args = DummyArgs::parse();

    if let Err(e) = run(&args) {
        error!("{}", e);
        eprintln!("monitor: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &DummyArgs) -> Result<(), Box<dyn Error>> {
    let config = args.load_config()?;

    let mut device = DummyDevice::builder()
        .corruption(args.corruption)
        .noise(args.noise)
        .poll_timeout(config.poll_timeout());
    if let Some(seed) = args.seed {
        device = device.seed(seed);
    }

    let view = SampleBuffer::new(config.view_capacity);
    let log = SampleBuffer::new(config.log_capacity);
    let mut builder = Acquisition::builder()
        .period_ms(config.period_ms)
        .buffer(view.clone());
    let mut worker = match &args.outfile {
        Some(_) => {
            builder = builder.buffer(log.clone());
            let logger = FrameLogger::create(&config.log_path, &config.csv_separator)?;
            Some(LogWorker::spawn(log, logger, config.log_flush()))
        }
        None => None,
    };
    let mut acquisition = builder.start(device.build());

    let res = live_view(&mut acquisition, view, config.ui_refresh(), "Simulated board");

    acquisition.stop()?;
    if let Some(worker) = worker.as_mut() {
        let rows = worker.stop()?;
        println!("Wrote {} frames to {}", rows, config.log_path.display());
    }
    Ok(res?)
}
