//! Client-side logic of the clap detection dashboard.
//!
//! The [`controller::Dashboard`] drives a [`view::View`] from the detection server's
//! HTTP API and push channel.

pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod indicator;
pub mod push;
pub mod sequence;
pub mod session;
pub mod settings_model;
pub mod sources;
pub mod view;

#[cfg(test)]
mod testing;

pub use client::{DetectionApi, HttpDetectionApi};
pub use config::{Config, ReconnectPolicy};
pub use controller::{Action, Dashboard};
pub use error::{DashboardError, Result};
pub use view::{Document, View};
