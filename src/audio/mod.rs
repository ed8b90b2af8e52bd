pub mod buffer;
pub mod device;
pub mod router;

pub use buffer::{SharedBuffer, TrackBuffer};
pub use device::{find_loopback, list_input_devices, resolve_input, Device};
pub use router::{emergency_restore, OutputRouter, RoutingGuard, SwitchAudioRouter};
