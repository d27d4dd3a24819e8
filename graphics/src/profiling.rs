//! Profiling support via Tracy.
//!
//! This module re-exports CPU profiling from [`vesta_core::profiling`] and adds
//! a bridge that forwards [`GpuProfiler`](crate::profiler::GpuProfiler)
//! measurements to Tracy's GPU timeline.
//!
//! # Enabling Profiling
//!
//! ```toml
//! [dependencies]
//! vesta-graphics = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! # CPU Profiling
//!
//! ```ignore
//! use vesta_graphics::profiling::{frame_mark, profile_scope};
//!
//! fn build_frame() {
//!     profile_scope!("build_frame");
//!     // ...
//!     frame_mark!();
//! }
//! ```
//!
//! # GPU Profiling
//!
//! ```ignore
//! let timeline = GpuTimeline::new("Graphics Queue", 0, timestamp_period_ns);
//!
//! // After the frame's fence signaled:
//! if let Some(timeline) = &timeline {
//!     timeline.report(&profiler, slot, "frame")?;
//! }
//! ```

pub use vesta_core::profiling::*;

#[cfg(feature = "profiling")]
pub use tracy_client::{GpuContext, GpuContextType, GpuSpan};

#[cfg(feature = "profiling")]
use crate::error::GraphicsError;
#[cfg(feature = "profiling")]
use crate::profiler::GpuProfiler;

/// Tracy GPU context fed with timestamp pairs read from a [`GpuProfiler`].
#[cfg(feature = "profiling")]
pub struct GpuTimeline {
    context: GpuContext,
}

#[cfg(feature = "profiling")]
impl GpuTimeline {
    /// Create a Vulkan GPU context.
    ///
    /// Returns `None` when no Tracy client is running.
    pub fn new(name: &str, gpu_timestamp: i64, timestamp_period_ns: f32) -> Option<Self> {
        let client = Client::running()?;
        let context = client
            .new_gpu_context(
                Some(name),
                GpuContextType::Vulkan,
                gpu_timestamp,
                timestamp_period_ns,
            )
            .ok()?;
        Some(Self { context })
    }

    /// Emit a zone named `name` for the measurement in `slot`.
    ///
    /// Returns `Ok(false)` when the timestamps are not available yet.
    pub fn report(
        &self,
        profiler: &GpuProfiler,
        slot: u32,
        name: &str,
    ) -> Result<bool, GraphicsError> {
        let Some((start, end)) = profiler.read_timestamps(slot)? else {
            return Ok(false);
        };

        let mut span = self
            .context
            .span_alloc(name, "", file!(), line!())
            .map_err(|e| GraphicsError::Internal(format!("Tracy GPU span: {e:?}")))?;
        span.end_zone();
        span.upload_timestamp_start(start as i64);
        span.upload_timestamp_end(end as i64);
        Ok(true)
    }

    /// Synchronize Tracy's GPU clock, e.g. once per frame.
    pub fn sync_time(&self, gpu_timestamp: i64) {
        self.context.sync_gpu_time(gpu_timestamp);
    }

    pub fn inner(&self) -> &GpuContext {
        &self.context
    }
}
