//! Adapters for the lookup port.

mod hickory;

pub use hickory::HickorySrvLookup;
