pub mod engine;
pub mod hparams;
pub mod provision;
