//! Live spectrum display for software-defined radio receivers
//!
//! An averaged instantaneous power plot stacked above a scrolling waterfall.
//! Both share one frequency/pixel coordinate model with cursor-anchored zoom,
//! and each draws through either a wgpu shader path or a tiny-skia raster
//! fallback. Waterfall rows remember the frequency they were captured at, so
//! history stays aligned when the receiver is retuned.

pub mod average;
pub mod cell;
pub mod config;
pub mod coords;
pub mod error;
pub mod frame;
pub mod gradient;
pub mod history;
pub mod render;
pub mod scale;
pub mod scheduler;
pub mod storage;
pub mod widget;

pub use cell::{Cell, LocalCell};
pub use config::DisplayConfig;
pub use coords::{CoordinateModel, ViewSnapshot, Viewport};
pub use error::{DisplayError, Result};
pub use frame::{Frame, FrameHub, FrameSource};
pub use render::{BackendKind, SpectrumRenderer};
pub use scheduler::{FrameScheduler, Scheduler, Task};
pub use widget::{DisplayInputs, SpectrumDisplay};
