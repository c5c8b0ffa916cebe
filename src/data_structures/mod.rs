//! Plain data types shared by the render core.
//!
//! - `aabb` holds axis-aligned bounding boxes used for scene bounds and camera framing
//! - `instance` holds per-object transformation data

pub mod aabb;
pub mod instance;
