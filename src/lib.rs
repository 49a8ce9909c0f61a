#![recursion_limit = "256"]

//! Text autoencoders over plain-text and gazette corpora.
//!
//! Layers, outermost first: `cli` → `application` → `ml` / `infra`
//! → `data` → `domain`.

pub mod cli;
pub mod application;
pub mod domain;
pub mod data;
pub mod ml;
pub mod infra;
pub mod error;
