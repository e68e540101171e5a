//! Host-side software for a two-finger tactile sensor board.
//!
//! Each finger carries a 4x7 array of static pressure sensors, a dynamic
//! (vibration) sensor, an accelerometer, a gyroscope, a magnetometer and a
//! temperature sensor. The board streams their readings over a USB serial
//! link as small checksummed packets. This crate reassembles those packets
//! from the raw byte stream, sorts the records they carry into a
//! per-finger [`Fingers`](finger_data::Fingers) frame and hands every
//! completed frame to bounded buffers that a live view and a CSV logger
//! drain at their own pace.
//!
//! The pieces, in the order data flows through them:
//!
//! - [`transport`]: the serial port, or anything else that yields bytes
//! - [`frame_assembler`]: finds and validates [`packet`]s in the stream
//! - [`sensor_demux`]: decodes packet payloads into a frame
//! - [`acquisition`]: the thread that drives all of the above
//! - [`sample_buffer`]: where frames wait for their consumers
//! - [`csv_log`] and [`gui`]: the consumers
//!
//! [`dummy_device`] simulates a board for trying things out without one.

#![warn(missing_docs)]
pub mod acquisition;
pub mod args;
pub mod config;
pub mod csv_log;
pub mod dummy_device;
pub mod finger_data;
pub mod frame_assembler;
pub mod gui;
pub mod packet;
pub mod sample_buffer;
pub mod sensor_demux;
pub mod transport;
