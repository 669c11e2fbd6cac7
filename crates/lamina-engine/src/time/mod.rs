//! Frame timing.
//!
//! One [`FrameClock`] per render loop; its clamped delta feeds
//! `Graphics::paint_frame` and through it every layer update hook.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
