// Managers module - shared session infrastructure
//
// BroadcastChannelManager owns the status/spectrum fan-out shared between the
// playback session and its control loop.

pub mod broadcast_manager;

pub use broadcast_manager::BroadcastChannelManager;
