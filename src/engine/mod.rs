//! Engine module housing the running session.
//!
//! `backend` abstracts the audio devices, `scheduler` runs the fixed-rate
//! control loop, `control_core` is what one tick does, and `session` ties them
//! into the start/stop lifecycle. `offline` renders without a device.

pub mod backend;
pub mod control_core;
pub mod offline;
pub mod scheduler;
pub mod session;

pub use backend::{AudioBackend, CpalBackend, OutputFormat, StubBackend};
pub use control_core::{ControlCore, TickReport};
pub use offline::{render_offline, write_wav, OfflineRender, RenderTick};
pub use scheduler::{ControlLoop, LoopHandle};
pub use session::{PlaybackSession, SessionState};
