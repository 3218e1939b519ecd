pub mod fanout;
pub mod silence;

pub use fanout::{AudioStreamFanout, CaptureDevice, FrameSubscriber};
pub use silence::SilenceCaptureDevice;
