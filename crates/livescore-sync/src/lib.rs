// Library root: the sync runtime (live channel, polling fallback,
// connectivity monitor, coordinator) and its configuration. Exposed as a
// library so integration tests can drive it.

pub mod app;
pub mod channel;
pub mod config;
pub mod connectivity;
pub mod polling;
