//! Read side of the store for presentation and analytics.

use crate::domain::{Instrument, PriceRecord, PriceSeries};
use crate::store::{DateRange, PriceStore, StoreError};
use chrono::NaiveDate;

/// Ranged, ordered reads of stored history.
pub struct SeriesReader<'a> {
    store: &'a dyn PriceStore,
}

impl<'a> SeriesReader<'a> {
    pub fn new(store: &'a dyn PriceStore) -> Self {
        Self { store }
    }

    /// Stored history within inclusive bounds. No matching rows yields an
    /// empty series.
    pub fn get_range(
        &self,
        instrument_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, StoreError> {
        let range = DateRange::new(start, end);
        let display_name = self.get_instrument(instrument_id)?.map(|i| i.label().to_string());
        if range.is_empty() {
            return Ok(PriceSeries::empty(instrument_id).with_display_name(display_name));
        }
        let records = self.store.find(instrument_id, range)?;
        Ok(PriceSeries::from_records(instrument_id, records).with_display_name(display_name))
    }

    /// Full stored history.
    pub fn get_all(&self, instrument_id: &str) -> Result<PriceSeries, StoreError> {
        self.get_range(instrument_id, None, None)
    }

    /// Most recent stored record, i.e. the current price.
    pub fn get_latest(&self, instrument_id: &str) -> Result<Option<PriceRecord>, StoreError> {
        self.store.find_latest(instrument_id)
    }

    pub fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, StoreError> {
        self.store.get_instrument(instrument_id)
    }

    pub fn list_instruments(&self) -> Result<Vec<Instrument>, StoreError> {
        self.store.list_instruments()
    }
}
