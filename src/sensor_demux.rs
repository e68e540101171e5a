//! Splits a packet payload into per-finger sensor readings.
//!
//! A payload is a run of sensor records. Each record starts with a tag byte
//! whose upper nibble names the sensor type and whose bits 2-3 name the
//! finger; the lower two bits are reserved. The tag is followed by a
//! type-specific number of big-endian 16 bit values.
//!
//! A record that runs past the end of the payload contributes whatever
//! values fit. An unknown sensor type ends parsing of the packet; whatever
//! was already applied stays applied.

use crate::finger_data::{
    Fingers, DYNAMIC_TACTILE_COUNT, FINGER_COUNT, IMU_AXES, STATIC_TACTILE_COUNT,
};
use crate::packet::UsbPacket;

use log::{trace, warn};
use nom::{
    error::Error,
    multi::many_m_n,
    number::complete::{be_i16, be_u16},
    Parser,
};

/// The kinds of sensor a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    /// The 4x7 static tactile array.
    StaticTactile,
    /// The dynamic tactile channel.
    DynamicTactile,
    /// Accelerometer x y z.
    Accelerometer,
    /// Gyroscope x y z.
    Gyroscope,
    /// Magnetometer x y z.
    Magnetometer,
    /// Temperature.
    Temperature,
}

impl SensorType {
    /// Decodes the sensor type from a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag & 0xF0 {
            0x10 => Some(SensorType::StaticTactile),
            0x20 => Some(SensorType::DynamicTactile),
            0x30 => Some(SensorType::Accelerometer),
            0x40 => Some(SensorType::Gyroscope),
            0x50 => Some(SensorType::Magnetometer),
            0x60 => Some(SensorType::Temperature),
            _ => None,
        }
    }

    /// The upper nibble identifying this sensor type in a tag byte.
    pub fn tag_bits(self) -> u8 {
        match self {
            SensorType::StaticTactile => 0x10,
            SensorType::DynamicTactile => 0x20,
            SensorType::Accelerometer => 0x30,
            SensorType::Gyroscope => 0x40,
            SensorType::Magnetometer => 0x50,
            SensorType::Temperature => 0x60,
        }
    }

    /// Number of 16 bit values in a full record of this type.
    pub fn value_count(self) -> usize {
        match self {
            SensorType::StaticTactile => STATIC_TACTILE_COUNT,
            SensorType::DynamicTactile => DYNAMIC_TACTILE_COUNT,
            SensorType::Accelerometer | SensorType::Gyroscope | SensorType::Magnetometer => {
                IMU_AXES
            }
            SensorType::Temperature => 1,
        }
    }
}

/// Extracts the finger index from a tag byte. Two bits wide, so it may name
/// a finger the board does not have.
pub fn finger_index(tag: u8) -> usize {
    ((tag >> 2) & 0x03) as usize
}

/// Builds the tag byte for a record.
pub fn encode_tag(sensor: SensorType, finger: usize) -> u8 {
    sensor.tag_bits() | (((finger as u8) & 0x03) << 2)
}

/// Serializes one sensor record. Signed readings are sent as their two's
/// complement bit pattern.
pub fn encode_record(sensor: SensorType, finger: usize, values: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + 2 * values.len());
    bytes.push(encode_tag(sensor, finger));
    for v in values {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    bytes
}

// Reads up to `count` values, stopping early when the input runs out.
fn take_values<'a, O, P>(input: &'a [u8], count: usize, parser: P) -> (&'a [u8], Vec<O>)
where
    P: Parser<&'a [u8], O, Error<&'a [u8]>>,
{
    many_m_n(0, count, parser)(input).unwrap_or((input, Vec::new()))
}

fn store<T: Copy>(dst: &mut [T], values: &[T]) {
    let n = values.len().min(dst.len());
    dst[..n].copy_from_slice(&values[..n]);
}

/// Applies every record in `packet` to `fingers`.
///
/// Returns `true` if a dynamic tactile record was seen, which marks the end
/// of a complete set of readings.
pub fn demux(packet: &UsbPacket, fingers: &mut Fingers) -> bool {
    let mut saw_dynamic = false;
    let mut input = packet.payload();

    while let Some((&tag, rest)) = input.split_first() {
        let Some(sensor) = SensorType::from_tag(tag) else {
            trace!("Unknown sensor tag {:#04X}, dropping rest of packet", tag);
            break;
        };
        let f = finger_index(tag);
        let count = sensor.value_count();
        let truncated = rest.len() < 2 * count;

        let Some(finger) = fingers.finger.get_mut(f) else {
            warn!(
                "{:?} record for finger {} but only {} fingers are attached",
                sensor, f, FINGER_COUNT
            );
            if truncated {
                break;
            }
            // Skip over the record so the following ones still line up
            input = &rest[2 * count..];
            continue;
        };

        input = match sensor {
            SensorType::StaticTactile => {
                let (rest, values) = take_values(rest, count, be_u16);
                store(&mut finger.static_tactile, &values);
                rest
            }
            SensorType::DynamicTactile => {
                let (rest, values) = take_values(rest, count, be_i16);
                store(&mut finger.dynamic_tactile, &values);
                saw_dynamic = true;
                rest
            }
            SensorType::Accelerometer => {
                let (rest, values) = take_values(rest, count, be_i16);
                store(&mut finger.accelerometer, &values);
                rest
            }
            SensorType::Gyroscope => {
                let (rest, values) = take_values(rest, count, be_i16);
                store(&mut finger.gyroscope, &values);
                rest
            }
            SensorType::Magnetometer => {
                let (rest, values) = take_values(rest, count, be_i16);
                store(&mut finger.magnetometer, &values);
                rest
            }
            SensorType::Temperature => {
                let (rest, values) = take_values(rest, count, be_i16);
                store(std::slice::from_mut(&mut finger.temperature), &values);
                rest
            }
        };

        if truncated {
            break;
        }
    }

    saw_dynamic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finger_data::FingerData;

    fn packet(records: &[Vec<u8>]) -> UsbPacket {
        UsbPacket::new(0x01, &records.concat()).unwrap()
    }

    fn static_values(base: u16) -> Vec<u16> {
        (0..STATIC_TACTILE_COUNT as u16).map(|i| base + i).collect()
    }

    #[test]
    fn tag_layout() {
        let tag = encode_tag(SensorType::Gyroscope, 1);
        assert_eq!(tag, 0x44);
        assert_eq!(SensorType::from_tag(tag), Some(SensorType::Gyroscope));
        assert_eq!(finger_index(tag), 1);
        assert_eq!(SensorType::from_tag(0x00), None);
        assert_eq!(SensorType::from_tag(0x7C), None);
    }

    #[test]
    fn dynamic_and_static_complete_a_frame() {
        let mut fingers = Fingers::default();
        let p = packet(&[
            encode_record(SensorType::DynamicTactile, 0, &[1234]),
            encode_record(SensorType::StaticTactile, 0, &static_values(100)),
        ]);
        assert_eq!(p.length(), 60);

        assert!(demux(&p, &mut fingers));
        assert_eq!(fingers.finger[0].dynamic_tactile, [1234]);
        assert_eq!(fingers.finger[0].static_tactile.to_vec(), static_values(100));
        assert_eq!(fingers.finger[1], FingerData::default());
    }

    #[test]
    fn static_only_is_not_complete() {
        let mut fingers = Fingers::default();
        fingers.finger[0].dynamic_tactile = [-55];

        let p = packet(&[encode_record(
            SensorType::StaticTactile,
            0,
            &static_values(7)[..20],
        )]);
        assert!(!demux(&p, &mut fingers));
        assert_eq!(fingers.finger[0].dynamic_tactile, [-55]);
        assert_eq!(fingers.finger[0].static_tactile[0], 7);
    }

    #[test]
    fn imu_and_temperature_are_signed() {
        let mut fingers = Fingers::default();
        let neg = |v: i16| v as u16;
        let p = packet(&[
            encode_record(SensorType::Accelerometer, 1, &[neg(-1), 2, neg(-300)]),
            encode_record(SensorType::Gyroscope, 1, &[4, 5, 6]),
            encode_record(SensorType::Magnetometer, 0, &[neg(-7), 8, 9]),
            encode_record(SensorType::Temperature, 1, &[neg(-20)]),
        ]);

        assert!(!demux(&p, &mut fingers));
        assert_eq!(fingers.finger[1].accelerometer, [-1, 2, -300]);
        assert_eq!(fingers.finger[1].gyroscope, [4, 5, 6]);
        assert_eq!(fingers.finger[0].magnetometer, [-7, 8, 9]);
        assert_eq!(fingers.finger[1].temperature, -20);
    }

    #[test]
    fn truncated_trailing_record_keeps_what_fits() {
        let mut fingers = Fingers::default();
        fingers.finger[0].gyroscope = [9, 9, 9];

        let mut payload = encode_record(SensorType::Gyroscope, 0, &[1, 2, 3]);
        payload.truncate(1 + 2 * 2 + 1);
        let p = UsbPacket::new(0x01, &payload).unwrap();

        assert!(!demux(&p, &mut fingers));
        assert_eq!(fingers.finger[0].gyroscope, [1, 2, 9]);
    }

    #[test]
    fn unknown_type_halts_but_keeps_earlier_fields() {
        let mut fingers = Fingers::default();
        let p = packet(&[
            encode_record(SensorType::DynamicTactile, 1, &[42]),
            vec![0xF0, 0x00, 0x01],
            encode_record(SensorType::Temperature, 1, &[99]),
        ]);

        assert!(demux(&p, &mut fingers));
        assert_eq!(fingers.finger[1].dynamic_tactile, [42]);
        assert_eq!(fingers.finger[1].temperature, 0);
    }

    #[test]
    fn out_of_range_finger_is_skipped() {
        let mut fingers = Fingers::default();
        let p = packet(&[
            encode_record(SensorType::DynamicTactile, 3, &[500]),
            encode_record(SensorType::Temperature, 0, &[21]),
        ]);

        assert!(!demux(&p, &mut fingers));
        assert_eq!(fingers.finger[0].dynamic_tactile, [0]);
        assert_eq!(fingers.finger[1].dynamic_tactile, [0]);
        assert_eq!(fingers.finger[0].temperature, 21);
    }

    #[test]
    fn empty_payload_changes_nothing() {
        let mut fingers = Fingers::default();
        assert!(!demux(&UsbPacket::read_sensors(), &mut fingers));
        assert_eq!(fingers, Fingers::default());
    }

    #[test]
    fn arbitrary_payloads_never_panic() {
        let mut fingers = Fingers::default();
        for seed in 0..=255u8 {
            let payload: Vec<u8> = (0..60u8)
                .map(|i| i.wrapping_mul(seed).wrapping_add(seed))
                .collect();
            let p = UsbPacket::new(0x01, &payload).unwrap();
            demux(&p, &mut fingers);
        }
    }
}
