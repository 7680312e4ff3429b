use serde::{Deserialize, Serialize};

/// Reference data for a tradable instrument. Never mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub instrument_id: String,
    pub display_name: String,
}

impl Instrument {
    pub fn new(instrument_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Display name, or the id when the name is blank.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.instrument_id
        } else {
            &self.display_name
        }
    }
}
