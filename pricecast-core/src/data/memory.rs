//! In-memory market store.
//!
//! Used by tests and by embedders that already hold the data in process.
//! Tracks how many sessions are open so callers can verify that sessions
//! never outlive their unit of work.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::{Company, CompanyId, MacroPoint, ModelEntry, PriceBar, StatementLine};

use super::source::{MarketData, MarketSession, SourceError};

#[derive(Debug, Default)]
pub struct InMemoryMarket {
    companies: Vec<Company>,
    prices: HashMap<CompanyId, Vec<PriceBar>>,
    macros: BTreeMap<String, Vec<MacroPoint>>,
    statements: HashMap<CompanyId, Vec<StatementLine>>,
    models: Vec<ModelEntry>,
    offline: bool,
    open: AtomicUsize,
    opened_total: AtomicUsize,
}

impl InMemoryMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, company: Company) -> Self {
        self.companies.push(company);
        self
    }

    pub fn with_prices(mut self, company: CompanyId, bars: Vec<PriceBar>) -> Self {
        self.prices.insert(company, bars);
        self
    }

    pub fn with_macro(mut self, name: &str, points: Vec<MacroPoint>) -> Self {
        self.macros.insert(name.to_string(), points);
        self
    }

    pub fn with_statements(mut self, company: CompanyId, lines: Vec<StatementLine>) -> Self {
        self.statements.insert(company, lines);
        self
    }

    pub fn with_model(mut self, model: ModelEntry) -> Self {
        self.models.push(model);
        self
    }

    /// Make every `open_session` call fail with a connection error.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Sessions currently held.
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Sessions handed out since creation.
    pub fn sessions_opened(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

impl MarketData for InMemoryMarket {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn open_session(&self) -> Result<Box<dyn MarketSession + '_>, SourceError> {
        if self.offline {
            return Err(SourceError::Connection("in-memory market is offline".into()));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession { market: self }))
    }
}

struct MemorySession<'a> {
    market: &'a InMemoryMarket,
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        self.market.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MarketSession for MemorySession<'_> {
    fn companies(&self) -> Result<Vec<Company>, SourceError> {
        Ok(self.market.companies.clone())
    }

    fn prices(&self, company: CompanyId) -> Result<Vec<PriceBar>, SourceError> {
        self.market
            .prices
            .get(&company)
            .cloned()
            .ok_or_else(|| SourceError::Missing {
                what: format!("price history for company {company}"),
            })
    }

    fn macro_series(&self) -> Result<BTreeMap<String, Vec<MacroPoint>>, SourceError> {
        Ok(self.market.macros.clone())
    }

    fn statements(&self, company: CompanyId) -> Result<Vec<StatementLine>, SourceError> {
        Ok(self
            .market
            .statements
            .get(&company)
            .cloned()
            .unwrap_or_default())
    }

    fn models(&self) -> Result<Vec<ModelEntry>, SourceError> {
        Ok(self.market.models.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::CompanyRef;
    use crate::domain::SectorId;

    fn company(id: i64, ticker: &str, sector: i64) -> Company {
        Company {
            id: CompanyId(id),
            name: format!("{ticker} SA"),
            ticker: ticker.into(),
            sector_id: Some(SectorId(sector)),
        }
    }

    #[test]
    fn sessions_are_released_on_drop() {
        let market = InMemoryMarket::new().with_company(company(1, "AAA3", 1));
        {
            let _a = market.open_session().unwrap();
            let _b = market.open_session().unwrap();
            assert_eq!(market.open_sessions(), 2);
        }
        assert_eq!(market.open_sessions(), 0);
        assert_eq!(market.sessions_opened(), 2);
    }

    #[test]
    fn offline_market_fails_to_connect() {
        let market = InMemoryMarket::new().offline();
        assert!(matches!(
            market.open_session().err(),
            Some(SourceError::Connection(_))
        ));
        assert_eq!(market.open_sessions(), 0);
    }

    #[test]
    fn resolve_by_ticker_is_case_insensitive() {
        let market = InMemoryMarket::new()
            .with_company(company(1, "AAA3", 1))
            .with_company(company(2, "BBB4", 1));
        let session = market.open_session().unwrap();
        let found = session.resolve(&CompanyRef::ticker("bbb4")).unwrap();
        assert_eq!(found.map(|c| c.id), Some(CompanyId(2)));
        assert!(session.resolve(&CompanyRef::id(CompanyId(9))).unwrap().is_none());
    }

    #[test]
    fn sector_peers_exclude_self_and_other_sectors() {
        let market = InMemoryMarket::new()
            .with_company(company(1, "AAA3", 1))
            .with_company(company(2, "BBB4", 1))
            .with_company(company(3, "CCC3", 2));
        let session = market.open_session().unwrap();
        let me = company(1, "AAA3", 1);
        let peers = session.sector_peers(&me).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, CompanyId(2));
    }

    #[test]
    fn missing_prices_are_reported() {
        let market = InMemoryMarket::new();
        let session = market.open_session().unwrap();
        assert!(matches!(
            session.prices(CompanyId(5)),
            Err(SourceError::Missing { .. })
        ));
    }
}
