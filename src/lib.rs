pub mod config;
pub mod core;
pub mod extraction;
pub mod feeds;
pub mod marketdata;
pub mod persistence;
pub mod stats;
pub mod tracker;
pub mod tracking;
