//! GPU rendition of the two-pass frame on wgpu.

pub mod native;
mod shared;

pub use native::{GpuFrame, GpuRenderer};
