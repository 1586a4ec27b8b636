mod client;

pub use client::TransitClient;
