//! Market Surveillance Engine
//! Mission: surface volume bursts, price jumps, liquidity withdrawal,
//! coordinated cross-market movement and front-running ahead of news,
//! and route the highest-value ones to an operator's webhook.

pub mod adapters;
pub mod alerts;
pub mod anomaly;
pub mod categorize;
pub mod cli;
pub mod clustering;
pub mod config;
pub mod error;
pub mod frontrun;
pub mod microstructure;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod ports;
pub mod scoring;
pub mod signals;
pub mod stats;
pub mod telemetry;
