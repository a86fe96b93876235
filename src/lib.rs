//! jgcstats - health inspector for JVMs running on this host.
//!
//! [`system::Collector`] gathers one [`health::Snapshot`] per JVM through a
//! [`system::MetricSource`], [`health::Classifier`] reduces each to a health
//! code and [`report::Reporter`] renders the result.

pub mod config;
pub mod format;
pub mod health;
pub mod report;
pub mod system;
