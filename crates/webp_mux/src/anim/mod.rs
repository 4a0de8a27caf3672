//! Animation assembly and playback.
//!
//! The encoding side keeps candidate encodings of recent frames in a
//! [`cache::FrameCache`] and picks, per frame, between a sub-rectangle
//! update and a full keyframe under the `kmin`/`kmax` keyframe-distance
//! constraints. The playback side reconstructs the canvas frame by frame,
//! applying each frame's disposal before blending the next.

pub mod cache;
pub mod encoder;
pub mod player;

pub use cache::FrameCache;
pub use encoder::AnimationEncoder;
pub use player::AnimationPlayer;
