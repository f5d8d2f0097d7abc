// src/lib.rs — Library root for talkstream

pub mod answer;
pub mod cli;
pub mod infra;
pub mod provider;
pub mod session;
