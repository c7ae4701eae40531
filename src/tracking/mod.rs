pub mod actor;
pub mod classifier;
pub mod session;
