//! Core library for the thermodaq application.
//!
//! Acquisition and calibration pipeline for a six-channel slide temperature
//! instrument on a serial link: a background reader turns wire lines into
//! frames, frames are batch-averaged, per-channel polynomial calibration is
//! applied, and finished readings fan out to the console and the CSV session
//! log. The binary drives the pipeline; everything here is also usable
//! headless from tests.

pub mod averaging;
pub mod calibration;
pub mod config;
pub mod core;
pub mod error;
pub mod link;
pub mod pipeline;
pub mod protocol;
pub mod storage;
