pub mod client;
mod envelope;
pub mod session;
