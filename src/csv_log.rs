//! Writes frames out as delimited text, one line per frame.
//!
//! Each line holds the timestamp, then the dynamic tactile values of every
//! finger, then the static tactile arrays, then the accelerometer and
//! finally the gyroscope vectors. Every field after the timestamp is
//! preceded by the separator and a single space.
//!
//! [`LogWorker`] drains a dedicated [`SampleBuffer`] into a [`FrameLogger`]
//! on its own thread, so that writing to disk never holds up acquisition.

use crate::finger_data::{Fingers, DYNAMIC_TACTILE_COUNT, FINGER_COUNT, STATIC_TACTILE_COUNT};
use crate::sample_buffer::SampleBuffer;

use log::{debug, info, warn};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::mpsc,
    thread,
    time::Duration,
};

/// The column names matching [`record`].
pub fn header(separator: &str) -> String {
    let mut line = String::from("Time(ms)");
    let mut column = |name: String| {
        line.push_str(separator);
        line.push(' ');
        line.push_str(&name);
    };
    for f in 0..FINGER_COUNT {
        for i in 0..DYNAMIC_TACTILE_COUNT {
            column(format!("D{}_{}", i, f));
        }
    }
    for f in 0..FINGER_COUNT {
        for i in 0..STATIC_TACTILE_COUNT {
            column(format!("S{}_{}", i, f));
        }
    }
    for prefix in ["A", "G"] {
        for f in 0..FINGER_COUNT {
            for axis in ["x", "y", "z"] {
                column(format!("{}{}{}", prefix, axis, f));
            }
        }
    }
    line
}

/// One frame as a line of text, without the line terminator.
pub fn record(fingers: &Fingers, separator: &str) -> String {
    let mut line = fingers.timestamp.to_string();
    let mut field = |v: &dyn std::fmt::Display| {
        line.push_str(separator);
        line.push(' ');
        line.push_str(&v.to_string());
    };
    for f in &fingers.finger {
        f.dynamic_tactile.iter().for_each(|v| field(v));
    }
    for f in &fingers.finger {
        f.static_tactile.iter().for_each(|v| field(v));
    }
    for f in &fingers.finger {
        f.accelerometer.iter().for_each(|v| field(v));
    }
    for f in &fingers.finger {
        f.gyroscope.iter().for_each(|v| field(v));
    }
    line
}

/// Writes frames to any [`Write`]r.
pub struct FrameLogger<W: Write> {
    writer: W,
    separator: String,
    rows: u64,
}

impl FrameLogger<BufWriter<File>> {
    /// Creates (or truncates) the file at `path` and writes the header.
    pub fn create(path: impl AsRef<Path>, separator: &str) -> io::Result<Self> {
        let file = File::create(path.as_ref())?;
        info!("Logging to {}", path.as_ref().display());
        let mut logger = FrameLogger::new(BufWriter::new(file), separator);
        logger.write_header()?;
        Ok(logger)
    }
}

impl<W: Write> FrameLogger<W> {
    /// Wraps `writer`. Nothing is written until asked for.
    pub fn new(writer: W, separator: &str) -> Self {
        Self {
            writer,
            separator: separator.to_owned(),
            rows: 0,
        }
    }

    /// Writes the column names.
    pub fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "{}", header(&self.separator))
    }

    /// Writes one frame.
    pub fn write_frame(&mut self, fingers: &Fingers) -> io::Result<()> {
        writeln!(self.writer, "{}", record(fingers, &self.separator))?;
        self.rows += 1;
        Ok(())
    }

    /// Writes frames in order.
    pub fn write_frames(&mut self, frames: &[Fingers]) -> io::Result<()> {
        frames.iter().try_for_each(|f| self.write_frame(f))
    }

    /// Pushes buffered output to the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Frames written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes and hands back the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

enum Signal {
    Stop,
}

/// A thread that periodically moves every frame out of a buffer and into
/// a [`FrameLogger`].
pub struct LogWorker {
    handle: Option<thread::JoinHandle<io::Result<u64>>>,
    tx: mpsc::Sender<Signal>,
}

impl LogWorker {
    /// Starts draining `buffer` into `logger` every `period`.
    pub fn spawn<W>(
        buffer: SampleBuffer<Fingers>,
        mut logger: FrameLogger<W>,
        period: Duration,
    ) -> Self
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Signal>();

        let handle = thread::spawn(move || -> io::Result<u64> {
            loop {
                let stopping = !matches!(rx.try_recv(), Err(mpsc::TryRecvError::Empty));

                let frames = buffer.extract(true);
                if !frames.is_empty() {
                    debug!("Logging {} frames", frames.len());
                    logger.write_frames(&frames)?;
                    logger.flush()?;
                }

                if stopping {
                    break;
                }
                spin_sleep::sleep(period);
            }
            info!("Logged {} frames", logger.rows());
            Ok(logger.rows())
        });

        LogWorker {
            handle: Some(handle),
            tx,
        }
    }

    /// Logs whatever is still buffered, stops the thread and returns the
    /// number of frames written.
    pub fn stop(&mut self) -> io::Result<u64> {
        let _ = self.tx.send(Signal::Stop);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "log thread panicked"))?,
            None => Ok(0),
        }
    }
}

impl Drop for LogWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Logging ended with: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn frame(timestamp: i64) -> Fingers {
        let mut fingers = Fingers {
            timestamp,
            ..Default::default()
        };
        for (f, finger) in fingers.finger.iter_mut().enumerate() {
            finger.dynamic_tactile = [-(f as i16) - 1];
            finger.static_tactile[0] = 100 + f as u16;
            finger.accelerometer = [1, 2, 3];
            finger.gyroscope = [-4, -5, -6];
            finger.temperature = 99;
        }
        fingers
    }

    #[test]
    fn header_layout() {
        let h = header(",");
        let columns: Vec<&str> = h.split(", ").collect();

        assert_eq!(columns.len(), 1 + FINGER_COUNT * (1 + STATIC_TACTILE_COUNT + 6));
        assert_eq!(&columns[..3], &["Time(ms)", "D0_0", "D0_1"]);
        assert_eq!(columns[3], "S0_0");
        assert_eq!(columns[4], "S1_0");
        assert_eq!(columns[3 + STATIC_TACTILE_COUNT], "S0_1");
        let imu = 3 + 2 * STATIC_TACTILE_COUNT;
        assert_eq!(&columns[imu..imu + 4], &["Ax0", "Ay0", "Az0", "Ax1"]);
        assert_eq!(columns.last(), Some(&"Gz1"));
    }

    #[test]
    fn record_layout() {
        let line = record(&frame(1234), ";");
        let fields: Vec<&str> = line.split("; ").collect();

        assert_eq!(fields.len(), header(";").split("; ").count());
        assert_eq!(&fields[..3], &["1234", "-1", "-2"]);
        assert_eq!(fields[3], "100");
        assert_eq!(fields[3 + STATIC_TACTILE_COUNT], "101");
        let imu = 3 + 2 * STATIC_TACTILE_COUNT;
        assert_eq!(&fields[imu..imu + 3], &["1", "2", "3"]);
        assert_eq!(&fields[imu + 6..imu + 9], &["-4", "-5", "-6"]);
        // Temperature and magnetometer are not logged
        assert!(!fields.contains(&"99"));
    }

    #[test]
    fn logger_counts_rows() {
        let mut logger = FrameLogger::new(Vec::new(), ",");
        logger.write_header().unwrap();
        logger.write_frames(&[frame(1), frame(2)]).unwrap();
        assert_eq!(logger.rows(), 2);

        let text = String::from_utf8(logger.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Time(ms), D0_0"));
        assert!(lines[2].starts_with("2, -1, -2, 100"));
    }

    #[test]
    fn worker_drains_buffer_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fingers.csv");

        let buffer = SampleBuffer::new(16);
        let logger = FrameLogger::create(&path, ",").unwrap();
        let mut worker = LogWorker::spawn(buffer.clone(), logger, Duration::from_millis(5));

        for t in 0..10 {
            buffer.push(frame(t));
        }
        thread::sleep(Duration::from_millis(20));
        for t in 10..15 {
            buffer.push(frame(t));
        }

        assert_eq!(worker.stop().unwrap(), 15);
        assert!(buffer.is_empty());

        let text = fs::read_to_string(&path).unwrap();
        let timestamps: Vec<i64> = text
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(timestamps, (0..15).collect::<Vec<_>>());
    }
}
