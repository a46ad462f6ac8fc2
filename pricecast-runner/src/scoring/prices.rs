//! Realized close prices indexed by company and date.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use chrono::NaiveDate;

use pricecast_core::data::{MarketSession, SourceError};
use pricecast_core::domain::{CompanyId, PriceBar};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBook {
    closes: HashMap<CompanyId, BTreeMap<NaiveDate, f64>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, company: CompanyId, date: NaiveDate, close: f64) {
        self.closes.entry(company).or_default().insert(date, close);
    }

    pub fn insert_bars(&mut self, company: CompanyId, bars: &[PriceBar]) {
        let series = self.closes.entry(company).or_default();
        for bar in bars {
            series.insert(bar.date, bar.close);
        }
    }

    /// Load the price history of every listed company from one session.
    /// Companies without a history are left out.
    pub fn load(session: &dyn MarketSession, companies: &[CompanyId]) -> Result<Self, SourceError> {
        let mut book = Self::new();
        for &company in companies {
            match session.prices(company) {
                Ok(bars) => book.insert_bars(company, &bars),
                Err(SourceError::Missing { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(book)
    }

    /// Realized close on exactly `date`.
    pub fn close_on(&self, company: CompanyId, date: NaiveDate) -> Option<f64> {
        self.closes.get(&company)?.get(&date).copied()
    }

    /// Most recent finite close strictly before `date`.
    pub fn prev_close(&self, company: CompanyId, date: NaiveDate) -> Option<(NaiveDate, f64)> {
        self.closes
            .get(&company)?
            .range(..date)
            .rev()
            .find(|(_, v)| v.is_finite())
            .map(|(d, v)| (*d, *v))
    }

    /// First close after `date`, no more than `max_days` later.
    pub fn next_close_within(
        &self,
        company: CompanyId,
        date: NaiveDate,
        max_days: i64,
    ) -> Option<(NaiveDate, f64)> {
        self.closes
            .get(&company)?
            .range((Excluded(date), Unbounded))
            .next()
            .filter(|(d, _)| (**d - date).num_days() <= max_days)
            .map(|(d, v)| (*d, *v))
    }
}
