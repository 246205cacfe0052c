pub mod signal;

pub use signal::{EntryParams, SessionConfig, Signal, SignalAction};
