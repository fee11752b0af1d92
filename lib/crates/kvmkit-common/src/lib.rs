pub mod channel;
pub mod image;

pub use channel::{ChannelSpec, ChannelSpecError, default_channels, validate_channels};
pub use image::{Distro, UnknownDistro};
