//! # Topic Classifier
//!
//! Fine-tune a BERT-family model on a news-topic dataset, export it to a static inference graph
//! and serve predictions over HTTP.
#![forbid(unsafe_code)]

/// Backends and devices
pub mod backend;

/// Models
pub mod models;

/// Pipelines
pub mod pipelines;

/// Datasets
pub mod datasets;

/// Utilities
pub mod utils;

/// HTTP prediction service
pub mod server;

/// Error macros
#[macro_use]
extern crate anyhow;
