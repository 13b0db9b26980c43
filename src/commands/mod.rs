pub mod client;
pub mod serve;

// Re-export command functions for convenience
pub use client::client;
pub use serve::serve;
