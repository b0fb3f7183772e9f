#![forbid(unsafe_code)]

pub mod cli;
pub mod espeak;
pub mod fetch;
pub mod listen;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod segment;
pub mod source;
pub mod speech;
