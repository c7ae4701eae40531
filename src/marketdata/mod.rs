pub mod client;
pub mod simulator;
pub mod yahoo;
