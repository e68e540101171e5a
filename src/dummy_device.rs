//! A simulated sensor board, for running the front-end and the tests
//! without hardware.
//!
//! The device stays silent until it receives an auto-send command, exactly
//! like the real board. Once streaming, every period it emits one static
//! tactile packet and one IMU packet per finger followed by a packet with
//! the dynamic tactile readings of all fingers, which completes the set.

use crate::finger_data::{FINGER_COUNT, STATIC_TACTILE_COLS, STATIC_TACTILE_COUNT};
use crate::frame_assembler::FrameAssembler;
use crate::packet::{UsbPacket, COMMAND_AUTOSEND_SENSORS};
use crate::sensor_demux::{encode_record, SensorType};
use crate::transport::Transport;

use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::VecDeque,
    f64::consts::PI,
    io, thread,
    time::{Duration, Instant},
};

// Bound on how far a paused reader lets the device fall behind
const MAX_BACKLOG_SETS: u64 = 64;

/// A [`Transport`] that synthesizes sensor data.
pub struct DummyDevice {
    commands: FrameAssembler,
    period: Option<Duration>,
    started: Instant,
    sets_sent: u64,
    pending: VecDeque<u8>,
    corruption: f64,
    noise: f64,
    realtime: bool,
    poll_timeout: Duration,
    rng: StdRng,
}

/// Configures a [`DummyDevice`].
#[derive(Debug, Clone)]
pub struct DummyDeviceBuilder {
    corruption: f64,
    noise: f64,
    realtime: bool,
    poll_timeout: Duration,
    seed: Option<u64>,
}

impl Default for DummyDeviceBuilder {
    fn default() -> Self {
        Self {
            corruption: 0.0,
            noise: 20.0,
            realtime: true,
            poll_timeout: Duration::from_millis(1),
            seed: None,
        }
    }
}

impl DummyDeviceBuilder {
    /// Probability that any emitted byte gets a bit flipped.
    pub fn corruption(mut self, probability: f64) -> Self {
        self.corruption = probability.clamp(0.0, 1.0);
        self
    }

    /// Amplitude of the random noise added to every reading.
    pub fn noise(mut self, amplitude: f64) -> Self {
        self.noise = amplitude.abs();
        self
    }

    /// In realtime mode data is paced by the requested period. Otherwise
    /// every read returns one more set of readings immediately.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// How long a read waits when no data is due.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Makes the generated stream reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the device, initially not streaming.
    pub fn build(self) -> DummyDevice {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        DummyDevice {
            commands: FrameAssembler::new(),
            period: None,
            started: Instant::now(),
            sets_sent: 0,
            pending: VecDeque::new(),
            corruption: self.corruption,
            noise: self.noise,
            realtime: self.realtime,
            poll_timeout: self.poll_timeout,
            rng,
        }
    }
}

impl DummyDevice {
    /// Starts configuring a device.
    pub fn builder() -> DummyDeviceBuilder {
        DummyDeviceBuilder::default()
    }

    /// Whether an auto-send command has switched streaming on.
    pub fn is_streaming(&self) -> bool {
        self.period.is_some()
    }

    /// Number of complete sets of readings generated so far.
    pub fn sets_sent(&self) -> u64 {
        self.sets_sent
    }

    fn handle_command(&mut self, packet: UsbPacket) {
        match (packet.command(), packet.payload()) {
            (COMMAND_AUTOSEND_SENSORS, [0]) => {
                info!("Dummy device: auto-send stopped");
                self.period = None;
            }
            (COMMAND_AUTOSEND_SENSORS, [ms]) => {
                info!("Dummy device: auto-send every {} ms", ms);
                self.period = Some(Duration::from_millis(*ms as u64));
                self.started = Instant::now();
                self.sets_sent = 0;
            }
            (command, _) => debug!("Dummy device: ignoring command {:#04X}", command),
        }
    }

    fn sets_due(&self) -> u64 {
        let Some(period) = self.period else {
            return 0;
        };
        if !self.realtime {
            return 1;
        }
        let elapsed = self.started.elapsed().as_micros() as u64;
        let period = (period.as_micros() as u64).max(1);
        (elapsed / period)
            .saturating_sub(self.sets_sent)
            .min(MAX_BACKLOG_SETS)
    }

    fn reading(&mut self, base: f64) -> u16 {
        let noise = if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        };
        (base + noise).round() as i16 as u16
    }

    fn generate_set(&mut self) -> io::Result<Vec<UsbPacket>> {
        let t = self.sets_sent as f64 / 1000.0;
        let mut packets = Vec::with_capacity(2 * FINGER_COUNT + 1);

        for f in 0..FINGER_COUNT {
            // A pressure blob that wanders along the finger
            let centre = (STATIC_TACTILE_COLS as f64 - 1.0) * (0.5 + 0.5 * (t + f as f64).sin());
            let taxels: Vec<u16> = (0..STATIC_TACTILE_COUNT)
                .map(|i| {
                    let col = (i % STATIC_TACTILE_COLS) as f64;
                    let level = 3000.0 * (-(col - centre).powi(2) / 2.0).exp() + 500.0;
                    self.reading(level).min(4095)
                })
                .collect();
            packets.push(encode_packet(&[encode_record(
                SensorType::StaticTactile,
                f,
                &taxels,
            )])?);

            let tilt = 2.0 * PI * 0.2 * t + f as f64;
            let accel = [
                self.reading(4096.0 * tilt.sin()),
                self.reading(4096.0 * tilt.cos()),
                self.reading(16384.0),
            ];
            let gyro = [
                self.reading(800.0 * tilt.cos()),
                self.reading(-800.0 * tilt.sin()),
                self.reading(0.0),
            ];
            let mag = [self.reading(300.0), self.reading(-120.0), self.reading(45.0)];
            let temperature = [self.reading(2500.0)];
            packets.push(encode_packet(&[
                encode_record(SensorType::Accelerometer, f, &accel),
                encode_record(SensorType::Gyroscope, f, &gyro),
                encode_record(SensorType::Magnetometer, f, &mag),
                encode_record(SensorType::Temperature, f, &temperature),
            ])?);
        }

        let dynamic: Vec<Vec<u8>> = (0..FINGER_COUNT)
            .map(|f| {
                let vibration = 1000.0 * (2.0 * PI * (40.0 + 20.0 * f as f64) * t).sin();
                let value = self.reading(vibration);
                encode_record(SensorType::DynamicTactile, f, &[value])
            })
            .collect();
        packets.push(encode_packet(&dynamic)?);

        Ok(packets)
    }

    fn queue(&mut self, packet: &UsbPacket) {
        for mut b in packet.encode() {
            if self.corruption > 0.0 && self.rng.gen_bool(self.corruption) {
                b ^= 1 << self.rng.gen_range(0..8u32);
            }
            self.pending.push_back(b);
        }
    }
}

fn encode_packet(records: &[Vec<u8>]) -> io::Result<UsbPacket> {
    UsbPacket::new(0x01, &records.concat())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

impl Transport for DummyDevice {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            for _ in 0..self.sets_due() {
                for packet in self.generate_set()? {
                    self.queue(&packet);
                }
                self.sets_sent += 1;
            }
        }

        if self.pending.is_empty() {
            thread::sleep(self.poll_timeout);
            return Ok(0);
        }

        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        for packet in self.commands.feed_all(bytes) {
            self.handle_command(packet);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finger_data::Fingers;
    use crate::sensor_demux::demux;

    fn device() -> DummyDevice {
        DummyDevice::builder()
            .realtime(false)
            .poll_timeout(Duration::ZERO)
            .seed(7)
            .build()
    }

    fn drain(dev: &mut DummyDevice) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 37];
        loop {
            let n = dev.read_chunk(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if dev.pending.is_empty() {
                return out;
            }
        }
    }

    #[test]
    fn silent_until_autosend() {
        let mut dev = device();
        let mut buf = [0u8; 64];
        assert_eq!(dev.read_chunk(&mut buf).unwrap(), 0);
        assert!(!dev.is_streaming());

        dev.send_packet(&UsbPacket::autosend(1)).unwrap();
        assert!(dev.is_streaming());
        assert!(dev.read_chunk(&mut buf).unwrap() > 0);

        dev.send_packet(&UsbPacket::autosend(0)).unwrap();
        assert!(!dev.is_streaming());
    }

    #[test]
    fn every_set_completes_one_frame() {
        let mut dev = device();
        dev.send_packet(&UsbPacket::autosend(1)).unwrap();

        let mut assembler = FrameAssembler::new();
        let mut fingers = Fingers::default();
        let mut frames = 0;
        for _ in 0..10 {
            for packet in assembler.feed_all(&drain(&mut dev)) {
                if demux(&packet, &mut fingers) {
                    frames += 1;
                }
            }
        }

        assert_eq!(frames, 10);
        assert_eq!(dev.sets_sent(), 10);
        assert_eq!(assembler.rejected(), 0);
        assert!(fingers.finger.iter().all(|f| f.accelerometer[2] > 16000));
    }

    #[test]
    fn oversized_set_is_an_error() {
        let record = encode_record(SensorType::StaticTactile, 0, &[0; STATIC_TACTILE_COUNT]);
        assert_eq!(encode_packet(&[record.clone()]).unwrap().length(), 57);

        let err = encode_packet(&[record.clone(), record]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn corrupted_stream_still_decodes_some_frames() {
        let mut dev = DummyDevice::builder()
            .realtime(false)
            .seed(99)
            .corruption(0.002)
            .build();
        dev.send_packet(&UsbPacket::autosend(1)).unwrap();

        let mut assembler = FrameAssembler::new();
        let mut fingers = Fingers::default();
        let mut frames = 0;
        for _ in 0..500 {
            for packet in assembler.feed_all(&drain(&mut dev)) {
                if demux(&packet, &mut fingers) {
                    frames += 1;
                }
            }
        }

        assert!(assembler.rejected() > 0);
        assert!(frames > 250);
    }
}
