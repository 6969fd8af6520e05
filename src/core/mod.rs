pub mod audio;
pub mod dsp;
pub mod export;
pub mod filter;
pub mod loader;
pub mod separator;
pub mod spectral;
