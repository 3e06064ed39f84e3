//! Request handlers, one module per area

pub mod attestations;
pub mod funding;
pub mod sponsorship;
pub mod status;
pub mod uploads;
