//! 调用方轮询：进度估算与终态处理

pub mod client;
pub mod progress;

pub use client::{PollEvent, PollHandle, PollingClient, StatusSource};
pub use progress::{estimate_progress, ProgressInput, ProgressTracker};
