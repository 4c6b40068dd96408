//! Signal detector (C5). The teacher's correlator/db_storage/enrichment/
//! storage/wallet_analytics/quality modules stay on disk as reference
//! during the build-out but are not wired into this module tree; none
//! survive the final trim.

pub mod detector;

pub use detector::SignalDetector;
