//! The byte source the acquisition thread reads from.
//!
//! The real thing is a [`serial2::SerialPort`]; the [dummy
//! device](crate::dummy_device) stands in for it when no hardware is around.

use crate::packet::UsbPacket;

use log::info;
use serial2::SerialPort;
use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

/// A bidirectional, polled byte stream to the sensor board.
pub trait Transport: Send {
    /// Reads whatever bytes are available into `buf`, waiting no longer
    /// than a short poll timeout. `Ok(0)` means that nothing arrived.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `bytes` to the device.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Encodes and sends a command packet.
    fn send_packet(&mut self, packet: &UsbPacket) -> io::Result<()> {
        self.write_bytes(&packet.encode())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }
}

impl Transport for SerialPort {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}

/// Returned when a serial port cannot be opened.
#[derive(Debug)]
pub struct OpenError {
    /// The device that was asked for.
    pub path: PathBuf,
    /// What the operating system said.
    pub source: io::Error,
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self.source.kind() {
            io::ErrorKind::PermissionDenied => Cow::from("insufficient permission to open port"),
            io::ErrorKind::NotFound => Cow::from("no such port"),
            // Linux reports EBUSY, which has no stable ErrorKind
            _ if self.source.raw_os_error() == Some(16) => {
                Cow::from("port is already opened by another application")
            }
            _ => Cow::from(format!("could not open port: {}", self.source)),
        };

        write!(f, "{}: {}", self.path.display(), reason)
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Lists the serial devices present on this machine.
pub fn available_ports() -> io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

/// Opens `path` at `baud_rate` (8N1, no flow control) and makes reads give
/// up after `poll_timeout`.
pub fn open_serial(
    path: impl AsRef<Path>,
    baud_rate: u32,
    poll_timeout: Duration,
) -> Result<SerialPort, OpenError> {
    let path = path.as_ref();
    let wrap = |source| OpenError {
        path: path.to_owned(),
        source,
    };

    let mut port = SerialPort::open(path, baud_rate).map_err(wrap)?;
    port.set_read_timeout(poll_timeout).map_err(wrap)?;
    info!("Opened {} at {} baud", path.display(), baud_rate);
    Ok(port)
}
