// Re-export glam for convenience
pub use glam::*;

// Scene transform helpers
mod transform;
pub use transform::{compose_srt, euler_xyz_degrees, inverse_bind_pose, AffineExt, Mirror};
