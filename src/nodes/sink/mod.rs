//! Terminal nodes

mod destination;

pub use destination::Destination;
