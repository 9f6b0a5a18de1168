pub mod bus;
pub mod schemas;

pub use bus::{BusEvent, MessageBus};
pub use schemas::*;
