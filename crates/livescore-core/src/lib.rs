// Pure game-state logic shared by the sync layer: data model, channel
// envelopes, the keyed game store, and feed classification.

pub mod classifier;
pub mod model;
pub mod protocol;
pub mod store;
