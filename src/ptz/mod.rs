pub mod controller;
pub mod device;
pub mod preset_manager;

pub use controller::PtzController;
pub use device::{HttpPtzDevice, PtzDevice};
pub use preset_manager::PresetManager;
