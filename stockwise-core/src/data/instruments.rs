//! Instrument list used to seed the store.
//!
//! ```toml
//! [[instruments]]
//! id = "RELIANCE.NS"
//! name = "Reliance Industries"
//! ```

use crate::config::ConfigError;
use crate::domain::Instrument;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentList {
    #[serde(default)]
    pub instruments: Vec<InstrumentEntry>,
}

impl InstrumentList {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a list; blank or repeated ids are rejected.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let list: InstrumentList = toml::from_str(content)?;
        let mut seen = HashSet::new();
        for entry in &list.instruments {
            let id = entry.id.trim();
            if id.is_empty() {
                return Err(ConfigError::Invalid("instrument with empty id".into()));
            }
            if !seen.insert(id) {
                return Err(ConfigError::Invalid(format!("instrument '{id}' listed twice")));
            }
        }
        Ok(list)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(format!("serialize instruments: {e}")))
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn to_instruments(&self) -> Vec<Instrument> {
        self.instruments
            .iter()
            .map(|e| Instrument::new(e.id.trim(), e.name.trim()))
            .collect()
    }

    /// Large-cap NSE names used to bootstrap an empty store.
    pub fn default_nifty() -> Self {
        let pairs = [
            ("RELIANCE.NS", "Reliance Industries"),
            ("HDFCBANK.NS", "HDFC Bank"),
            ("TCS.NS", "Tata Consultancy Services"),
            ("BHARTIARTL.NS", "Bharti Airtel"),
            ("ICICIBANK.NS", "ICICI Bank"),
            ("SBIN.NS", "State Bank of India"),
            ("INFY.NS", "Infosys"),
            ("HINDUNILVR.NS", "Hindustan Unilever"),
            ("LICI.NS", "Life Insurance Corporation of India"),
            ("BAJFINANCE.NS", "Bajaj Finance"),
            ("ITC.NS", "ITC"),
            ("LT.NS", "Larsen & Toubro"),
            ("MARUTI.NS", "Maruti Suzuki India"),
            ("HCLTECH.NS", "HCL Technologies"),
            ("SUNPHARMA.NS", "Sun Pharmaceutical"),
            ("KOTAKBANK.NS", "Kotak Mahindra Bank"),
            ("M&M.NS", "Mahindra & Mahindra"),
            ("ULTRACEMCO.NS", "UltraTech Cement"),
            ("AXISBANK.NS", "Axis Bank"),
            ("NTPC.NS", "NTPC Limited"),
            ("TITAN.NS", "Titan Company"),
            ("BAJAJFINSV.NS", "Bajaj Finserv"),
            ("HAL.NS", "Hindustan Aeronautics"),
            ("ONGC.NS", "Oil & Natural Gas"),
            ("ADANIPORTS.NS", "Adani Ports & SEZ"),
            ("BEL.NS", "Bharat Electronics"),
            ("WIPRO.NS", "Wipro"),
            ("JSWSTEEL.NS", "JSW Steel"),
            ("TATAMOTORS.NS", "Tata Motors"),
            ("ASIANPAINT.NS", "Asian Paints"),
            ("COALINDIA.NS", "Coal India"),
            ("NESTLEIND.NS", "Nestlé India"),
            ("GRASIM.NS", "Grasim Industries"),
            ("HINDALCO.NS", "Hindalco Industries"),
        ];

        Self {
            instruments: pairs
                .into_iter()
                .map(|(id, name)| InstrumentEntry {
                    id: id.into(),
                    name: name.into(),
                })
                .collect(),
        }
    }
}
