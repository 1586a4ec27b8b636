pub mod transit_api;

pub use transit_api::{StopSearch, TransitApi};
