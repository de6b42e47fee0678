pub mod client;
pub mod state;

pub use client::DaprClient;
pub use state::StateStore;
