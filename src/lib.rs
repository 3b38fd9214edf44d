//! # OCR Eval
//!
//! Checkpoint-polling evaluation for text-recognition models and a CRNN batch
//! predictor, built on the Burn ML framework.
//!
//! ## Modules
//!
//! - [`eval`]: Evaluation loop: session seams, result accumulation, polling
//! - [`checkpoint`]: Checkpoint pointer resolution and step parsing
//! - [`recognition`]: Recognition metrics and result visualization
//! - [`crnn`]: CRNN network, preprocessing, CTC decoding, evaluation model
//! - [`predict`]: Directory-wide prediction to CSV
//! - [`summary`]: Scalar summary sinks
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod crnn;
pub mod error;
pub mod eval;
pub mod predict;
pub mod recognition;
pub mod summary;
