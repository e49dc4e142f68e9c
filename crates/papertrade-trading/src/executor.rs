//! Atomic trade execution.
//!
//! A trade is two effects that must land together: a balance change on the
//! portfolio and an appended row in the ledger. The executor serializes all
//! execution for a given portfolio behind an async lock, prices the trade
//! from the quote cache, checks funds or holdings, applies the balance via
//! compare-and-set, and only then appends. If the append fails, the balance
//! change is rolled back with a compensating compare-and-set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use papertrade_core::{
    total_cents, Ledger, Portfolio, PortfolioStore, StoreError, Symbol, TradeAction, TradeIntent,
    Transaction, ValidationError,
};
use papertrade_market::QuoteCache;

use crate::error::TradeError;
use crate::holdings::HoldingsView;

/// How many times a compare-and-set on the balance is retried before the
/// trade is abandoned. External writers (deposits, admin corrections) can
/// race the executor, so a miss is re-read and re-checked, not an error.
const MAX_BALANCE_ATTEMPTS: usize = 4;

/// Executes buys and sells against a portfolio, atomically.
#[derive(Clone)]
pub struct TradeExecutor {
    portfolios: Arc<dyn PortfolioStore>,
    ledger: Arc<dyn Ledger>,
    quotes: QuoteCache,
    holdings: HoldingsView,
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl TradeExecutor {
    pub fn new(
        portfolios: Arc<dyn PortfolioStore>,
        ledger: Arc<dyn Ledger>,
        quotes: QuoteCache,
    ) -> Self {
        let holdings = HoldingsView::new(ledger.clone());
        Self {
            portfolios,
            ledger,
            quotes,
            holdings,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The holdings projection this executor checks sells against.
    pub fn holdings(&self) -> &HoldingsView {
        &self.holdings
    }

    /// Execute a trade at the current cached quote.
    ///
    /// On success the returned transaction's `price_cents` is the total
    /// value of the trade (unit price times quantity), matching the amount
    /// debited or credited.
    pub async fn execute(
        &self,
        portfolio: Uuid,
        symbol: Symbol,
        action: TradeAction,
        quantity: i64,
    ) -> Result<Transaction, TradeError> {
        if quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity { quantity }.into());
        }

        // One trade at a time per portfolio. Distinct portfolios proceed
        // concurrently; the lock map only grows by portfolios traded in this
        // process lifetime.
        let lock = self.portfolio_lock(portfolio);
        let _guard = lock.lock().await;

        // Establish the portfolio exists before spending a provider call.
        self.load_portfolio(portfolio).await?;

        let quote = self
            .quotes
            .get_quote(&symbol)
            .await
            .map_err(|error| TradeError::QuoteUnavailable {
                symbol: symbol.clone(),
                reason: error.to_string(),
            })?;
        let total = total_cents(quote.price_cents, quantity)?;
        debug!(%portfolio, %symbol, %action, quantity, total, "priced trade");

        if action == TradeAction::Sell {
            let held = self.holdings.quantity_of(portfolio, &symbol).await?;
            if held < quantity {
                return Err(TradeError::InsufficientHoldings {
                    symbol,
                    requested: quantity,
                    held,
                });
            }
        }

        let (previous_balance, new_balance) =
            self.apply_balance(portfolio, action, total).await?;

        let intent = TradeIntent::new(portfolio, symbol.clone(), action, quantity, total)?;
        match self.ledger.append(intent).await {
            Ok(transaction) => {
                info!(
                    uuid = %transaction.uuid,
                    %portfolio,
                    %symbol,
                    %action,
                    quantity,
                    total,
                    balance = new_balance,
                    "executed trade"
                );
                Ok(transaction)
            }
            Err(append_error) => {
                self.roll_back_balance(portfolio, new_balance, previous_balance, append_error)
                    .await
            }
        }
    }

    /// Move the balance by the trade total via compare-and-set, retrying a
    /// bounded number of times against concurrent balance writers.
    ///
    /// Returns the balance before and after the applied change.
    async fn apply_balance(
        &self,
        portfolio: Uuid,
        action: TradeAction,
        total: i64,
    ) -> Result<(i64, i64), TradeError> {
        for _ in 0..MAX_BALANCE_ATTEMPTS {
            let current = self.load_portfolio(portfolio).await?;

            let new_balance = match action {
                TradeAction::Buy => {
                    if current.balance_cents < total {
                        return Err(TradeError::InsufficientFunds {
                            required: total,
                            available: current.balance_cents,
                        });
                    }
                    current.balance_cents - total
                }
                TradeAction::Sell => current.balance_cents.checked_add(total).ok_or_else(|| {
                    TradeError::ConsistencyViolation(format!(
                        "crediting {total} cents overflows the balance of portfolio {portfolio}"
                    ))
                })?,
            };

            let applied = self
                .portfolios
                .compare_and_set_balance(portfolio, current.balance_cents, new_balance)
                .await?;
            if applied {
                return Ok((current.balance_cents, new_balance));
            }

            debug!(%portfolio, "balance moved underneath the trade; re-reading");
        }

        Err(TradeError::BalanceConflict)
    }

    async fn load_portfolio(&self, portfolio: Uuid) -> Result<Portfolio, TradeError> {
        self.portfolios
            .get(portfolio)
            .await
            .map_err(|error| match error {
                StoreError::NotFound(_) => TradeError::PortfolioNotFound(portfolio),
                other => TradeError::Store(other),
            })
    }

    /// Undo an applied balance change after the ledger refused the append.
    ///
    /// The executor's lock keeps other trades out, so the compensating
    /// compare-and-set should always hit; when it does not, some external
    /// writer has raced us and the stores are left inconsistent.
    async fn roll_back_balance(
        &self,
        portfolio: Uuid,
        from_cents: i64,
        to_cents: i64,
        append_error: StoreError,
    ) -> Result<Transaction, TradeError> {
        warn!(%portfolio, error = %append_error, "ledger append failed; rolling back balance");

        match self
            .portfolios
            .compare_and_set_balance(portfolio, from_cents, to_cents)
            .await
        {
            Ok(true) => Err(TradeError::Store(append_error)),
            Ok(false) => {
                error!(%portfolio, "balance changed during rollback; stores have diverged");
                Err(TradeError::ConsistencyViolation(format!(
                    "balance of portfolio {portfolio} changed during rollback after a failed append: {append_error}"
                )))
            }
            Err(rollback_error) => {
                error!(%portfolio, error = %rollback_error, "rollback write failed; stores have diverged");
                Err(TradeError::ConsistencyViolation(format!(
                    "rollback of portfolio {portfolio} failed after a failed append: \
                     append: {append_error}; rollback: {rollback_error}"
                )))
            }
        }
    }

    fn portfolio_lock(&self, portfolio: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .expect("portfolio lock map mutex should not be poisoned");
        locks.entry(portfolio).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use super::*;
    use papertrade_core::{
        Portfolio, ProviderError, Quote, QuoteProvider, Tick, TickRequest, UtcDateTime,
    };
    use papertrade_ledger::{MemoryLedger, MemoryPortfolioStore};
    use papertrade_market::CacheConfig;

    /// Provider double serving one fixed unit price for every symbol.
    struct StaticProvider {
        price_cents: i64,
    }

    impl QuoteProvider for StaticProvider {
        fn latest<'a>(
            &'a self,
            symbol: &'a Symbol,
        ) -> Pin<Box<dyn Future<Output = Result<Quote, ProviderError>> + Send + 'a>> {
            Box::pin(async move {
                Quote::new(symbol.clone(), self.price_cents, UtcDateTime::now())
                    .map_err(|e| ProviderError::malformed_payload(e.to_string()))
            })
        }

        fn ticks<'a>(
            &'a self,
            _request: TickRequest,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Tick>, ProviderError>> + Send + 'a>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    /// Provider double with no quotes at all.
    struct EmptyProvider;

    impl QuoteProvider for EmptyProvider {
        fn latest<'a>(
            &'a self,
            symbol: &'a Symbol,
        ) -> Pin<Box<dyn Future<Output = Result<Quote, ProviderError>> + Send + 'a>> {
            Box::pin(async move { Err(ProviderError::not_found(symbol)) })
        }

        fn ticks<'a>(
            &'a self,
            _request: TickRequest,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Tick>, ProviderError>> + Send + 'a>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    /// Ledger double whose appends always fail; reads stay empty.
    struct BrokenLedger;

    impl Ledger for BrokenLedger {
        fn append<'a>(
            &'a self,
            _intent: TradeIntent,
        ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>> {
            Box::pin(async move { Err(StoreError::Query(String::from("disk full"))) })
        }

        fn list<'a>(
            &'a self,
            _portfolio: Uuid,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>>
        {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn list_page<'a>(
            &'a self,
            _portfolio: Uuid,
            _offset: usize,
            _limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>>
        {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn get<'a>(
            &'a self,
            transaction: Uuid,
        ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>> {
            Box::pin(async move {
                Err(StoreError::NotFound(format!("transaction {transaction}")))
            })
        }
    }

    /// Portfolio store whose compare-and-set answers follow a script; once
    /// the script runs out every further swap is refused.
    struct ScriptedCasStore {
        portfolio: Portfolio,
        answers: Mutex<std::collections::VecDeque<Result<bool, StoreError>>>,
    }

    impl ScriptedCasStore {
        fn new(
            portfolio: Portfolio,
            answers: Vec<Result<bool, StoreError>>,
        ) -> Self {
            Self {
                portfolio,
                answers: Mutex::new(answers.into()),
            }
        }
    }

    impl PortfolioStore for ScriptedCasStore {
        fn get<'a>(
            &'a self,
            _portfolio: Uuid,
        ) -> Pin<Box<dyn Future<Output = Result<Portfolio, StoreError>> + Send + 'a>> {
            let portfolio = self.portfolio.clone();
            Box::pin(async move { Ok(portfolio) })
        }

        fn compare_and_set_balance<'a>(
            &'a self,
            _portfolio: Uuid,
            _expected_cents: i64,
            _new_cents: i64,
        ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>> {
            let answer = self
                .answers
                .lock()
                .expect("script mutex should not be poisoned")
                .pop_front()
                .unwrap_or(Ok(false));
            Box::pin(async move { answer })
        }
    }

    fn symbol(s: &str) -> Symbol {
        Symbol::parse(s).expect("valid symbol")
    }

    fn scripted_portfolio(balance_cents: i64) -> Portfolio {
        let now = UtcDateTime::now();
        Portfolio {
            uuid: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            tournament: None,
            name: String::from("scripted"),
            balance_cents,
            created_at: now,
            updated_at: now,
        }
    }

    fn executor_with(
        price_cents: i64,
        ledger: Arc<dyn Ledger>,
    ) -> (TradeExecutor, Arc<MemoryPortfolioStore>) {
        let portfolios = Arc::new(MemoryPortfolioStore::new());
        let quotes = QuoteCache::new(
            CacheConfig::default(),
            Arc::new(StaticProvider { price_cents }),
        );
        (
            TradeExecutor::new(portfolios.clone(), ledger, quotes),
            portfolios,
        )
    }

    fn funded(portfolios: &MemoryPortfolioStore, balance_cents: i64) -> Portfolio {
        portfolios.create_portfolio_with_balance(Uuid::new_v4(), "test", None, balance_cents)
    }

    #[tokio::test]
    async fn buy_debits_the_total_and_appends() {
        let ledger = Arc::new(MemoryLedger::new());
        let (executor, portfolios) = executor_with(10_000, ledger.clone());
        let portfolio = funded(&portfolios, 50_000);

        let transaction = executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 3)
            .await
            .expect("trade executes");

        // 3 shares at $100.00 each; price_cents is the total value.
        assert_eq!(transaction.price_cents, 30_000);
        assert_eq!(transaction.quantity, 3);

        let current = portfolios.get(portfolio.uuid).await.expect("exists");
        assert_eq!(current.balance_cents, 20_000);
        assert_eq!(ledger.list(portfolio.uuid).await.expect("lists").len(), 1);
    }

    #[tokio::test]
    async fn sell_credits_the_total() {
        let ledger = Arc::new(MemoryLedger::new());
        let (executor, portfolios) = executor_with(10_000, ledger);
        let portfolio = funded(&portfolios, 50_000);

        executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 2)
            .await
            .expect("buy executes");
        executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Sell, 2)
            .await
            .expect("sell executes");

        let current = portfolios.get(portfolio.uuid).await.expect("exists");
        assert_eq!(current.balance_cents, 50_000);
    }

    #[tokio::test]
    async fn buy_beyond_the_balance_is_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let (executor, portfolios) = executor_with(10_000, ledger.clone());
        let portfolio = funded(&portfolios, 5_000);

        let err = executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 1)
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            TradeError::InsufficientFunds {
                required: 10_000,
                available: 5_000,
            }
        ));

        // Nothing recorded, nothing debited.
        let current = portfolios.get(portfolio.uuid).await.expect("exists");
        assert_eq!(current.balance_cents, 5_000);
        assert!(ledger.list(portfolio.uuid).await.expect("lists").is_empty());
    }

    #[tokio::test]
    async fn sell_beyond_holdings_is_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let (executor, portfolios) = executor_with(10_000, ledger);
        let portfolio = funded(&portfolios, 50_000);

        executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 1)
            .await
            .expect("buy executes");

        let err = executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Sell, 2)
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            TradeError::InsufficientHoldings {
                requested: 2,
                held: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected_before_pricing() {
        let ledger = Arc::new(MemoryLedger::new());
        let (executor, portfolios) = executor_with(10_000, ledger);
        let portfolio = funded(&portfolios, 50_000);

        let err = executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 0)
            .await
            .expect_err("must fail");
        assert!(matches!(err, TradeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unknown_symbol_surfaces_as_quote_unavailable() {
        let portfolios = Arc::new(MemoryPortfolioStore::new());
        let portfolio = funded(&portfolios, 50_000);
        let quotes = QuoteCache::new(CacheConfig::default(), Arc::new(EmptyProvider));
        let executor =
            TradeExecutor::new(portfolios, Arc::new(MemoryLedger::new()), quotes);

        let err = executor
            .execute(portfolio.uuid, symbol("ZZZZ"), TradeAction::Buy, 1)
            .await
            .expect_err("must fail");
        assert!(matches!(err, TradeError::QuoteUnavailable { .. }));
    }

    #[tokio::test]
    async fn unknown_portfolio_is_reported_as_such() {
        let ledger = Arc::new(MemoryLedger::new());
        let (executor, _portfolios) = executor_with(10_000, ledger);

        let missing = Uuid::new_v4();
        let err = executor
            .execute(missing, symbol("AAPL"), TradeAction::Buy, 1)
            .await
            .expect_err("must fail");
        assert!(matches!(err, TradeError::PortfolioNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn exhausted_balance_retries_abort_with_a_conflict() {
        let ledger = Arc::new(MemoryLedger::new());
        let portfolio = scripted_portfolio(50_000);
        let portfolio_id = portfolio.uuid;
        // Every compare-and-set misses, as if an external writer kept
        // moving the balance between read and write.
        let portfolios = Arc::new(ScriptedCasStore::new(portfolio, Vec::new()));
        let quotes = QuoteCache::new(
            CacheConfig::default(),
            Arc::new(StaticProvider { price_cents: 10_000 }),
        );
        let executor = TradeExecutor::new(portfolios, ledger.clone(), quotes);

        let err = executor
            .execute(portfolio_id, symbol("AAPL"), TradeAction::Buy, 1)
            .await
            .expect_err("must fail");
        assert!(matches!(err, TradeError::BalanceConflict));

        // The trade never reached the ledger.
        assert!(ledger.list(portfolio_id).await.expect("lists").is_empty());
    }

    #[tokio::test]
    async fn refused_rollback_surfaces_a_consistency_violation() {
        let portfolio = scripted_portfolio(50_000);
        let portfolio_id = portfolio.uuid;
        // The debit applies, the append fails, and the compensating swap
        // finds the balance already changed.
        let portfolios = Arc::new(ScriptedCasStore::new(portfolio, vec![Ok(true)]));
        let quotes = QuoteCache::new(
            CacheConfig::default(),
            Arc::new(StaticProvider { price_cents: 10_000 }),
        );
        let executor = TradeExecutor::new(portfolios, Arc::new(BrokenLedger), quotes);

        let err = executor
            .execute(portfolio_id, symbol("AAPL"), TradeAction::Buy, 1)
            .await
            .expect_err("must fail");
        assert!(matches!(err, TradeError::ConsistencyViolation(_)));
    }

    #[tokio::test]
    async fn failed_rollback_write_surfaces_a_consistency_violation() {
        let portfolio = scripted_portfolio(50_000);
        let portfolio_id = portfolio.uuid;
        // The debit applies, the append fails, and the compensating swap
        // itself errors out.
        let portfolios = Arc::new(ScriptedCasStore::new(
            portfolio,
            vec![
                Ok(true),
                Err(StoreError::Connection(String::from("store went away"))),
            ],
        ));
        let quotes = QuoteCache::new(
            CacheConfig::default(),
            Arc::new(StaticProvider { price_cents: 10_000 }),
        );
        let executor = TradeExecutor::new(portfolios, Arc::new(BrokenLedger), quotes);

        let err = executor
            .execute(portfolio_id, symbol("AAPL"), TradeAction::Buy, 1)
            .await
            .expect_err("must fail");
        assert!(matches!(err, TradeError::ConsistencyViolation(_)));
    }

    #[tokio::test]
    async fn failed_append_rolls_the_balance_back() {
        let (executor, portfolios) = executor_with(10_000, Arc::new(BrokenLedger));
        let portfolio = funded(&portfolios, 50_000);

        let err = executor
            .execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 1)
            .await
            .expect_err("must fail");
        assert!(matches!(err, TradeError::Store(_)));

        let current = portfolios.get(portfolio.uuid).await.expect("exists");
        assert_eq!(current.balance_cents, 50_000);
    }

    #[tokio::test]
    async fn concurrent_buys_cannot_overspend() {
        let ledger = Arc::new(MemoryLedger::new());
        let (executor, portfolios) = executor_with(10_000, ledger.clone());
        // Enough for one 3-share buy but not two.
        let portfolio = funded(&portfolios, 40_000);

        let left = executor.execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 3);
        let right = executor.execute(portfolio.uuid, symbol("AAPL"), TradeAction::Buy, 3);
        let (left, right) = tokio::join!(left, right);

        let successes = [&left, &right].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(matches!(
            [left, right].into_iter().find(|r| r.is_err()),
            Some(Err(TradeError::InsufficientFunds { .. }))
        ));

        let current = portfolios.get(portfolio.uuid).await.expect("exists");
        assert_eq!(current.balance_cents, 10_000);
        assert_eq!(ledger.list(portfolio.uuid).await.expect("lists").len(), 1);
    }
}
