//! Batch sync over every registered instrument.
//!
//! Instruments are independent: one failing never stops the others, except
//! for a store `Connection` error, which aborts the batch.

use super::{SyncEngine, SyncError, SyncResult, SyncStatus};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Progress callback for batch syncs.
pub trait SyncProgress: Send + Sync {
    /// Called when starting an instrument.
    fn on_start(&self, instrument_id: &str, index: usize, total: usize);

    /// Called when an instrument finishes, successfully or not.
    fn on_complete(
        &self,
        instrument_id: &str,
        index: usize,
        total: usize,
        result: &Result<SyncResult, SyncError>,
    );

    /// Called once the batch is done.
    fn on_batch_complete(&self, report: &BatchReport);
}

/// Progress reporter that does nothing.
pub struct SilentProgress;

impl SyncProgress for SilentProgress {
    fn on_start(&self, _instrument_id: &str, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _instrument_id: &str,
        _index: usize,
        _total: usize,
        _result: &Result<SyncResult, SyncError>,
    ) {
    }

    fn on_batch_complete(&self, _report: &BatchReport) {}
}

/// Summary of a batch sync.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    /// One entry per instrument, in input order. Failed instruments carry
    /// status `Failed`.
    pub results: Vec<SyncResult>,
    pub errors: Vec<(String, SyncError)>,
}

impl BatchReport {
    pub fn count(&self, status: SyncStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn rows_written(&self) -> usize {
        self.results.iter().map(|r| r.rows_written).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }

    fn push(&mut self, instrument_id: &str, outcome: Result<SyncResult, SyncError>) {
        match outcome {
            Ok(result) => self.results.push(result),
            Err(e) => {
                self.results.push(SyncResult::failed(instrument_id));
                self.errors.push((instrument_id.to_string(), e));
            }
        }
    }
}

impl SyncEngine<'_> {
    /// Sync every instrument registered in the store.
    pub fn sync_all(&self, progress: &dyn SyncProgress) -> Result<BatchReport, SyncError> {
        self.sync_all_as_of(chrono::Local::now().date_naive(), progress)
    }

    pub fn sync_all_as_of(
        &self,
        today: NaiveDate,
        progress: &dyn SyncProgress,
    ) -> Result<BatchReport, SyncError> {
        let ids: Vec<String> = self
            .store()
            .list_instruments()?
            .into_iter()
            .map(|i| i.instrument_id)
            .collect();
        if ids.is_empty() {
            warn!("no instruments registered; nothing to sync");
        }
        self.sync_instruments(&ids, today, progress)
    }

    /// Sync the given instruments.
    ///
    /// Returns `Err` only for a fatal store error; every other failure is
    /// recorded in the report.
    pub fn sync_instruments(
        &self,
        instrument_ids: &[String],
        today: NaiveDate,
        progress: &dyn SyncProgress,
    ) -> Result<BatchReport, SyncError> {
        let total = instrument_ids.len();
        let outcomes = if self.parallel {
            self.run_parallel(instrument_ids, today, progress)
        } else {
            self.run_sequential(instrument_ids, today, progress)
        };

        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        for (id, outcome) in outcomes {
            match outcome {
                Err(e) if e.is_fatal() => {
                    error!(instrument_id = %id, error = %e, "store unreachable; aborting batch");
                    return Err(e);
                }
                outcome => report.push(&id, outcome),
            }
        }

        info!(
            total,
            updated = report.count(SyncStatus::Updated),
            no_new_data = report.count(SyncStatus::NoNewData),
            up_to_date = report.count(SyncStatus::UpToDate),
            failed = report.count(SyncStatus::Failed),
            "batch sync finished"
        );
        progress.on_batch_complete(&report);
        Ok(report)
    }

    fn run_sequential(
        &self,
        ids: &[String],
        today: NaiveDate,
        progress: &dyn SyncProgress,
    ) -> Vec<(String, Result<SyncResult, SyncError>)> {
        let total = ids.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, id) in ids.iter().enumerate() {
            progress.on_start(id, i, total);
            let outcome = self.sync_as_of(id, today);
            progress.on_complete(id, i, total, &outcome);
            let fatal = outcome.as_ref().is_err_and(SyncError::is_fatal);
            outcomes.push((id.clone(), outcome));
            if fatal {
                break;
            }
        }
        outcomes
    }

    fn run_parallel(
        &self,
        ids: &[String],
        today: NaiveDate,
        progress: &dyn SyncProgress,
    ) -> Vec<(String, Result<SyncResult, SyncError>)> {
        let total = ids.len();
        let aborted = AtomicBool::new(false);
        ids.par_iter()
            .enumerate()
            .filter_map(|(i, id)| {
                if aborted.load(Ordering::Relaxed) {
                    return None;
                }
                progress.on_start(id, i, total);
                let outcome = self.sync_as_of(id, today);
                progress.on_complete(id, i, total, &outcome);
                if outcome.as_ref().is_err_and(SyncError::is_fatal) {
                    aborted.store(true, Ordering::Relaxed);
                }
                Some((id.clone(), outcome))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fetcher::tests::StubProvider;
    use crate::data::{ProviderChain, ProviderError, RawTable};
    use crate::domain::{Instrument, PriceRecord};
    use crate::store::{DateRange, MemoryStore, PriceStore, StoreError};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn history() -> Result<RawTable, ProviderError> {
        let mut t = RawTable::with_columns(&["date", "close"]);
        t.push_row(vec![json!("2024-01-02"), json!(10.0)]);
        t.push_row(vec![json!("2024-01-03"), json!(11.0)]);
        Ok(t)
    }

    /// Memory store that fails writes for one id, or every call.
    struct FaultyStore {
        inner: MemoryStore,
        bad_write: &'static str,
        unreachable: bool,
    }

    impl FaultyStore {
        fn check(&self) -> Result<(), StoreError> {
            if self.unreachable {
                Err(StoreError::Connection {
                    root: PathBuf::from("/nowhere"),
                    reason: "gone".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl PriceStore for FaultyStore {
        fn find(&self, id: &str, range: DateRange) -> Result<Vec<PriceRecord>, StoreError> {
            self.check()?;
            self.inner.find(id, range)
        }
        fn find_latest(&self, id: &str) -> Result<Option<PriceRecord>, StoreError> {
            self.check()?;
            self.inner.find_latest(id)
        }
        fn upsert(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
            self.check()?;
            if records.iter().any(|r| r.instrument_id == self.bad_write) {
                return Err(StoreError::Write("disk full".into()));
            }
            self.inner.upsert(records)
        }
        fn list_instruments(&self) -> Result<Vec<Instrument>, StoreError> {
            self.inner.list_instruments()
        }
        fn get_instrument(&self, id: &str) -> Result<Option<Instrument>, StoreError> {
            self.inner.get_instrument(id)
        }
        fn put_instrument(&self, instrument: Instrument) -> Result<(), StoreError> {
            self.inner.put_instrument(instrument)
        }
    }

    fn faulty(bad_write: &'static str, unreachable: bool) -> FaultyStore {
        FaultyStore {
            inner: MemoryStore::with_instruments([
                Instrument::new("A.NS", "A"),
                Instrument::new("B.NS", "B"),
                Instrument::new("C.NS", "C"),
            ]),
            bad_write,
            unreachable,
        }
    }

    #[derive(Default)]
    struct Recorder {
        completed: Mutex<Vec<String>>,
        batch_done: Mutex<bool>,
    }

    impl SyncProgress for Recorder {
        fn on_start(&self, _id: &str, _index: usize, _total: usize) {}
        fn on_complete(&self, id: &str, _i: usize, _t: usize, _r: &Result<SyncResult, SyncError>) {
            self.completed.lock().unwrap().push(id.to_string());
        }
        fn on_batch_complete(&self, _report: &BatchReport) {
            *self.batch_done.lock().unwrap() = true;
        }
    }

    #[test]
    fn failure_is_isolated() {
        let store = faulty("B.NS", false);
        let chain = ProviderChain::new().with(StubProvider::new("stub", history));
        let engine = SyncEngine::new(&store, &chain);
        let progress = Recorder::default();

        let report = engine.sync_all_as_of(d("2024-01-10"), &progress).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.count(SyncStatus::Updated), 2);
        assert_eq!(report.count(SyncStatus::Failed), 1);
        assert_eq!(report.results[1].status, SyncStatus::Failed);
        assert_eq!(report.errors[0].0, "B.NS");
        assert_eq!(report.rows_written(), 4);
        assert!(report.has_failures());
        assert_eq!(progress.completed.lock().unwrap().len(), 3);
        assert!(*progress.batch_done.lock().unwrap());
    }

    #[test]
    fn connection_error_aborts_batch() {
        let store = faulty("", true);
        let chain = ProviderChain::new().with(StubProvider::new("stub", history));
        let engine = SyncEngine::new(&store, &chain);
        let progress = Recorder::default();

        let err = engine.sync_all_as_of(d("2024-01-10"), &progress).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(progress.completed.lock().unwrap().len(), 1);
        assert!(!*progress.batch_done.lock().unwrap());
    }

    #[test]
    fn parallel_batch_matches_sequential() {
        let store = faulty("", false);
        let chain = ProviderChain::new().with(StubProvider::new("stub", history));
        let engine = SyncEngine::new(&store, &chain).with_parallel(true);

        let report = engine.sync_all_as_of(d("2024-01-10"), &SilentProgress).unwrap();
        let ids: Vec<&str> = report.results.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["A.NS", "B.NS", "C.NS"]);
        assert_eq!(report.count(SyncStatus::Updated), 3);

        let again = engine.sync_all_as_of(d("2024-01-10"), &SilentProgress).unwrap();
        assert_eq!(again.count(SyncStatus::NoNewData), 3);
        assert_eq!(again.rows_written(), 0);
    }
}
