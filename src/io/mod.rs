pub mod crypto;
pub mod net;
pub mod paths;
pub mod progress;
pub mod sniff;
