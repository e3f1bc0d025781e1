mod network_types;

pub use network_types::*;
