//! The framed packet that travels over the USB serial link.
//!
//! On the wire every packet is laid out as follows:
//!
//! ```text
//! +------------+-------+---------+--------+-----------------+
//! | start 0x9A | crc-8 | command | length | payload (0..60) |
//! +------------+-------+---------+--------+-----------------+
//! ```
//!
//! The high nibble of `command` carries flags and the low nibble carries the
//! command id. The CRC covers `command`, `length` and `payload`, and is a
//! CRC-8/SMBUS (polynomial `0x07`, zero init, no reflection, no final xor).

use std::{borrow::Cow, fmt};

/// Sentinel byte that starts every packet.
pub const START_BYTE: u8 = 0x9A;

/// Bytes preceding the payload: start byte, CRC, command and length.
pub const HEADER_LEN: usize = 4;

/// Largest payload a packet may carry.
pub const MAX_PAYLOAD: usize = 60;

/// Largest framed packet, header included.
pub const MAX_PACKET: usize = HEADER_LEN + MAX_PAYLOAD;

/// Ask the device for a single set of sensor readings.
pub const COMMAND_READ_SENSORS: u8 = 0x61;

/// Ask the device to stream sensor readings periodically. The single payload
/// byte is the period in milliseconds, zero stops the stream.
pub const COMMAND_AUTOSEND_SENSORS: u8 = 0x58;

/// Reboot the device into its bootloader.
pub const COMMAND_ENTER_BOOTLOADER: u8 = 0xE2;

const CRC8: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_SMBUS);

/// Computes the checksum the device expects over `command‖length‖payload`.
pub fn checksum(command: u8, length: u8, payload: &[u8]) -> u8 {
    let mut digest = CRC8.digest();
    digest.update(&[command, length]);
    digest.update(payload);
    digest.finalize()
}

/// Returned when a packet cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The payload does not fit in a single packet.
    PayloadTooLong(usize),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            PacketError::PayloadTooLong(len) => Cow::from(format!(
                "payload of {} bytes exceeds the {} byte limit",
                len, MAX_PAYLOAD
            )),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for PacketError {}

/// A checksum-valid packet, either received from or bound for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPacket {
    command: u8,
    payload: Vec<u8>,
}

impl UsbPacket {
    /// Builds a packet, refusing payloads longer than [`MAX_PAYLOAD`].
    pub fn new(command: u8, payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLong(payload.len()));
        }
        Ok(Self {
            command,
            payload: payload.to_vec(),
        })
    }

    /// Parses a framed packet whose header has already been checked to be
    /// complete. Returns `None` if the frame is short or its CRC is wrong.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        if frame.len() < HEADER_LEN || frame[0] != START_BYTE {
            return None;
        }
        let length = frame[3] as usize;
        if length > MAX_PAYLOAD || frame.len() < HEADER_LEN + length {
            return None;
        }
        let payload = &frame[HEADER_LEN..HEADER_LEN + length];
        if checksum(frame[2], frame[3], payload) != frame[1] {
            return None;
        }
        Some(Self {
            command: frame[2],
            payload: payload.to_vec(),
        })
    }

    /// Enables periodic sending of sensor data every `period_ms`
    /// milliseconds; a period of zero disables it.
    pub fn autosend(period_ms: u8) -> Self {
        Self {
            command: COMMAND_AUTOSEND_SENSORS,
            payload: vec![period_ms],
        }
    }

    /// Requests one set of sensor data.
    pub fn read_sensors() -> Self {
        Self {
            command: COMMAND_READ_SENSORS,
            payload: Vec::new(),
        }
    }

    /// The full command byte.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// The flags in the upper nibble of the command byte.
    pub fn flags(&self) -> u8 {
        self.command >> 4
    }

    /// The command id in the lower nibble of the command byte.
    pub fn command_id(&self) -> u8 {
        self.command & 0x0F
    }

    /// Payload length in bytes.
    pub fn length(&self) -> u8 {
        // `new` and `from_frame` bound the payload to MAX_PAYLOAD
        self.payload.len() as u8
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The CRC this packet carries on the wire.
    pub fn checksum(&self) -> u8 {
        checksum(self.command, self.length(), &self.payload)
    }

    /// Serializes the packet into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.push(START_BYTE);
        bytes.push(self.checksum());
        bytes.push(self.command);
        bytes.push(self.length());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}
