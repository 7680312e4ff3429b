//! Domain types for stockwise

pub mod instrument;
pub mod record;

pub use instrument::Instrument;
pub use record::{PriceRecord, PriceSeries};

/// Instrument identifier (ticker symbol, e.g. `RELIANCE.NS`).
pub type InstrumentId = String;
