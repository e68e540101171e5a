//! The acquisition thread.
//!
//! One thread owns the [`Transport`] and all decoder state. It asks the
//! board to start streaming, then polls the transport, assembles packets,
//! demultiplexes them into a persistent [`Fingers`] and, whenever a set of
//! readings completes, timestamps it and hands a copy to every sink. Sinks
//! are [`SampleBuffer`]s that consumers drain at their own pace, or channel
//! senders for consumers that want every frame.
//!
//! The thread checks for a stop signal between polls, so the poll timeout
//! of the transport bounds how long [`Acquisition::stop`] waits. A packet
//! that is half received when the thread stops is dropped.

use crate::finger_data::Fingers;
use crate::frame_assembler::FrameAssembler;
use crate::packet::UsbPacket;
use crate::sample_buffer::SampleBuffer;
use crate::sensor_demux::demux;
use crate::transport::Transport;

use log::{debug, error, info, warn};
use std::{
    borrow::Cow,
    fmt, io,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

const READ_CHUNK: usize = 1024;
const RATE_WINDOW: Duration = Duration::from_millis(200);

/// Returned when the acquisition thread ends abnormally.
#[derive(Debug)]
pub enum AcquisitionError {
    /// The transport failed to read or write, e.g. the port vanished.
    Transport(io::Error),

    /// The acquisition thread panicked.
    Panicked,
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            AcquisitionError::Transport(error) => Cow::from(format!("transport error: {}", error)),
            AcquisitionError::Panicked => Cow::from("acquisition thread panicked"),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for AcquisitionError {}

impl From<io::Error> for AcquisitionError {
    fn from(value: io::Error) -> Self {
        Self::Transport(value)
    }
}

/// Counters updated by the acquisition thread, readable from anywhere.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    bytes: AtomicU64,
    packets: AtomicU64,
    rejected: AtomicU64,
    frames: AtomicU64,
    data_rate: AtomicU64,
}

/// A point-in-time copy of [`AcquisitionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Bytes read from the transport.
    pub bytes: u64,
    /// Packets that passed the CRC check.
    pub packets: u64,
    /// Framed packets thrown away for a bad CRC or length.
    pub rejected: u64,
    /// Complete frames published.
    pub frames: u64,
    /// Bytes per second over the last measurement window.
    pub data_rate: u64,
}

impl AcquisitionStats {
    /// Reads every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes: self.bytes.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            data_rate: self.data_rate.load(Ordering::Relaxed),
        }
    }
}

enum Signal {
    Stop,
}

/// Configures and starts an [`Acquisition`].
#[derive(Debug, Default)]
pub struct AcquisitionBuilder {
    period_ms: u8,
    buffers: Vec<SampleBuffer<Fingers>>,
    subscribers: Vec<mpsc::Sender<Fingers>>,
}

impl AcquisitionBuilder {
    /// Auto-send period to request from the board, in milliseconds.
    pub fn period_ms(mut self, period_ms: u8) -> Self {
        self.period_ms = period_ms;
        self
    }

    /// Adds a buffer that receives a copy of every completed frame.
    pub fn buffer(mut self, buffer: SampleBuffer<Fingers>) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Adds a channel that receives every completed frame. A subscriber
    /// whose receiver is dropped is forgotten.
    pub fn subscriber(mut self, tx: mpsc::Sender<Fingers>) -> Self {
        self.subscribers.push(tx);
        self
    }

    /// Spawns the acquisition thread on `transport`.
    pub fn start<T: Transport + 'static>(self, transport: T) -> Acquisition {
        let (tx, rx) = mpsc::channel::<Signal>();
        let stats = Arc::new(AcquisitionStats::default());
        let th_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("acquisition".to_owned())
            .spawn(move || run(transport, rx, self, &th_stats))
            .map_err(|e| error!("Could not spawn the acquisition thread: {}", e))
            .ok();

        Acquisition { handle, tx, stats }
    }
}

/// A running acquisition thread.
pub struct Acquisition {
    handle: Option<thread::JoinHandle<Result<(), AcquisitionError>>>,
    tx: mpsc::Sender<Signal>,
    stats: Arc<AcquisitionStats>,
}

impl Acquisition {
    /// Starts configuring an acquisition.
    pub fn builder() -> AcquisitionBuilder {
        AcquisitionBuilder {
            period_ms: 1,
            ..Default::default()
        }
    }

    /// Shared handle to the live counters.
    pub fn stats(&self) -> Arc<AcquisitionStats> {
        Arc::clone(&self.stats)
    }

    /// `false` once the thread has ended, on request or by failure.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Asks the thread to stop, waits for it, and reports how it ended.
    pub fn stop(&mut self) -> Result<(), AcquisitionError> {
        // The thread may already be gone, in which case nobody is listening
        let _ = self.tx.send(Signal::Stop);
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| AcquisitionError::Panicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Acquisition ended with: {}", e);
        }
    }
}

struct RateMeter {
    since: Instant,
    bytes: u64,
}

impl RateMeter {
    fn new() -> Self {
        Self {
            since: Instant::now(),
            bytes: 0,
        }
    }

    // Returns a fresh bytes-per-second figure once per window.
    fn add(&mut self, n: usize) -> Option<u64> {
        self.bytes += n as u64;
        let elapsed = self.since.elapsed();
        if elapsed < RATE_WINDOW {
            return None;
        }
        let rate = self.bytes * 1000 / (elapsed.as_millis() as u64).max(1);
        self.since = Instant::now();
        self.bytes = 0;
        Some(rate)
    }
}

fn run<T: Transport>(
    mut transport: T,
    rx: mpsc::Receiver<Signal>,
    mut sinks: AcquisitionBuilder,
    stats: &AcquisitionStats,
) -> Result<(), AcquisitionError> {
    transport.send_packet(&UsbPacket::autosend(sinks.period_ms))?;
    info!("Requested auto-send every {} ms", sinks.period_ms);

    let started = Instant::now();
    let mut assembler = FrameAssembler::new();
    let mut fingers = Fingers::default();
    let mut chunk = [0u8; READ_CHUNK];
    let mut rate = RateMeter::new();

    let result = loop {
        match rx.try_recv() {
            Ok(Signal::Stop) | Err(mpsc::TryRecvError::Disconnected) => break Ok(()),
            Err(mpsc::TryRecvError::Empty) => {}
        }

        let n = match transport.read_chunk(&mut chunk) {
            Ok(n) => n.min(READ_CHUNK),
            Err(e) => {
                error!("Reading from the device failed: {}", e);
                break Err(AcquisitionError::Transport(e));
            }
        };

        stats.bytes.fetch_add(n as u64, Ordering::Relaxed);
        if let Some(bps) = rate.add(n) {
            stats.data_rate.store(bps, Ordering::Relaxed);
            debug!("Data rate {}.{:03} KB/s", bps / 1000, bps % 1000);
        }

        for &b in &chunk[..n] {
            let mut next = assembler.feed(b);
            // A resync may have left more complete packets behind this one
            while let Some(packet) = next {
                stats.packets.fetch_add(1, Ordering::Relaxed);

                // Many packets make up one set; publish once the set is whole
                if demux(&packet, &mut fingers) {
                    fingers.timestamp = started.elapsed().as_millis() as i64;
                    stats.frames.fetch_add(1, Ordering::Relaxed);
                    for buffer in &sinks.buffers {
                        buffer.push(fingers);
                    }
                    sinks.subscribers.retain(|tx| tx.send(fingers).is_ok());
                }
                next = assembler.next_buffered();
            }
        }
        stats.rejected.store(assembler.rejected(), Ordering::Relaxed);
    };

    if assembler.pending() > 0 {
        debug!("Dropping {} bytes of a partial packet", assembler.pending());
    }

    match transport.send_packet(&UsbPacket::autosend(0)) {
        Ok(()) => info!("Stopped auto-send"),
        Err(e) => warn!("Could not stop auto-send: {}", e),
    }

    result
}
