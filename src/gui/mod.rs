//! Terminal front-end: picking a serial device and watching the data live.

mod device_selector;
mod error;
mod live_view;

pub use device_selector::{device_selector, likely_sensor};
pub use error::TactileGuiError;
pub use live_view::{heat, live_view, Baseline, ViewState};
