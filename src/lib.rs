//! KPI Measurement Service
//!
//! Measures the latency between a triggered device action and the first
//! capture frame in which the expected screen state verifies. Requests are
//! queued in-process and scanned by a single background worker; outcomes are
//! written onto the originating execution result.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
