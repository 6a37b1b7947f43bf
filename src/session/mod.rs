//! # Evaluation Session
//!
//! Everything between an authorized connection and a finished evaluation.
//!
//! ## Key Components:
//! - **messages**: typed JSON frames (start, stop, started, result...)
//! - **protocol**: handshake, state machine and receive-loop dispatch
//! - **runner**: one complete run, from the audio file to the joined tasks

pub mod messages; // Wire format
pub mod protocol; // Handshake and receive loop
pub mod runner; // Whole-run orchestration

pub use runner::run;
