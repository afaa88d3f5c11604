//! Quote Router
//!
//! Finds the best swap route between two assets: the direct quote, or a
//! two-leg route through one intermediate asset. Quotes come from a
//! [`QuoteSource`] (the solver gateway in production).
//!
//! Selection:
//! - exact input (sell): maximize `amount_out`
//! - exact output (buy): minimize `amount_in`
//! - ties go to the route with fewer hops

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::{ClientError, ClientResult};
use crate::intents::TokenId;
use crate::primitives::Balance;

/// Deeper searches are not supported.
pub const MAX_HOPS: u8 = 2;

/// Which side of the trade is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteAmount {
    /// Sell exactly this much of the input asset.
    ExactIn(Balance),
    /// Buy exactly this much of the output asset.
    ExactOut(Balance),
}

/// One solver quote for a single pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub token_in: TokenId,
    pub token_out: TokenId,
    pub amount_in: Balance,
    pub amount_out: Balance,
    /// Hashes to redeem this quote; valid until `expires_at`.
    pub quote_hashes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Anything that can price a single pair.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Best quote for the pair, or `None` when nobody quotes it.
    async fn quote(
        &self,
        token_in: &TokenId,
        token_out: &TokenId,
        amount: QuoteAmount,
    ) -> ClientResult<Option<Quote>>;
}

/// A chain of quotes from `token_in` to `token_out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub legs: Vec<Quote>,
}

impl Route {
    pub fn hops(&self) -> usize {
        self.legs.len()
    }

    pub fn amount_in(&self) -> Balance {
        self.legs.first().map_or(0, |q| q.amount_in)
    }

    pub fn amount_out(&self) -> Balance {
        self.legs.last().map_or(0, |q| q.amount_out)
    }

    pub fn token_in(&self) -> Option<&TokenId> {
        self.legs.first().map(|q| &q.token_in)
    }

    pub fn token_out(&self) -> Option<&TokenId> {
        self.legs.last().map(|q| &q.token_out)
    }

    /// All hashes needed to redeem the route atomically.
    pub fn quote_hashes(&self) -> Vec<String> {
        self.legs
            .iter()
            .flat_map(|q| q.quote_hashes.iter().cloned())
            .collect()
    }

    /// Earliest leg expiry; the route is only as valid as its shortest leg.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.legs.iter().filter_map(|q| q.expires_at).min()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(false, |at| at <= now)
    }

    /// Whether `self` beats `other` for the given trade side.
    fn better_than(&self, other: &Route, amount: QuoteAmount) -> bool {
        let key = |r: &Route| match amount {
            QuoteAmount::ExactIn(_) => r.amount_out(),
            QuoteAmount::ExactOut(_) => r.amount_in(),
        };
        let (mine, theirs) = (key(self), key(other));
        let strictly = match amount {
            QuoteAmount::ExactIn(_) => mine > theirs,
            QuoteAmount::ExactOut(_) => mine < theirs,
        };
        strictly || (mine == theirs && self.hops() < other.hops())
    }
}

pub struct QuoteRouter {
    source: Arc<dyn QuoteSource>,
    intermediates: Vec<TokenId>,
    min_liquidity: Balance,
}

impl QuoteRouter {
    pub fn new(source: Arc<dyn QuoteSource>, intermediates: Vec<TokenId>, min_liquidity: Balance) -> Self {
        Self {
            source,
            intermediates,
            min_liquidity,
        }
    }

    pub fn from_config(source: Arc<dyn QuoteSource>, config: &RouterConfig) -> ClientResult<Self> {
        let intermediates = config
            .intermediate_tokens
            .iter()
            .map(|t| t.parse())
            .collect::<ClientResult<Vec<TokenId>>>()?;
        let min_liquidity = config
            .min_liquidity
            .parse()
            .map_err(|_| ClientError::validation(format!("Invalid min_liquidity '{}'", config.min_liquidity)))?;
        Ok(Self::new(source, intermediates, min_liquidity))
    }

    /// Best route from `token_in` to `token_out`.
    ///
    /// # Arguments
    ///
    /// * `token_in` / `token_out` - Asset pair; must differ
    /// * `amount` - Fixed side of the trade
    /// * `max_hops` - 1 for direct only, 2 to also try intermediates (capped at 2)
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Route))` - Best route that clears the liquidity threshold
    /// * `Ok(None)` - No route clears it
    /// * `Err(ClientError::Validation)` - Same asset, zero amount or zero hops
    pub async fn find_route(
        &self,
        token_in: &TokenId,
        token_out: &TokenId,
        amount: QuoteAmount,
        max_hops: u8,
    ) -> ClientResult<Option<Route>> {
        if token_in == token_out {
            return Err(ClientError::validation("Cannot route an asset to itself"));
        }
        if matches!(amount, QuoteAmount::ExactIn(0) | QuoteAmount::ExactOut(0)) {
            return Err(ClientError::validation("Quote amount must be positive"));
        }
        if max_hops == 0 {
            return Err(ClientError::validation("max_hops must be at least 1"));
        }
        let max_hops = max_hops.min(MAX_HOPS);

        let direct = self.direct(token_in, token_out, amount);
        let candidates: Vec<Route> = if max_hops >= 2 {
            let via = self
                .intermediates
                .iter()
                .filter(|mid| *mid != token_in && *mid != token_out)
                .map(|mid| self.via(token_in, mid, token_out, amount));
            let (direct, via) = futures::join!(direct, join_all(via));
            direct.into_iter().chain(via.into_iter().flatten()).collect()
        } else {
            direct.await.into_iter().collect()
        };

        let mut best: Option<Route> = None;
        for route in candidates {
            if !self.clears_liquidity(&route, amount) {
                debug!(
                    "Discarding {}-hop route {:?} -> {:?}: below liquidity threshold",
                    route.hops(),
                    route.token_in(),
                    route.token_out()
                );
                continue;
            }
            if best.as_ref().map_or(true, |b| route.better_than(b, amount)) {
                best = Some(route);
            }
        }

        match &best {
            Some(route) => info!(
                "Route {} -> {}: {} hop(s), in {} out {}",
                token_in,
                token_out,
                route.hops(),
                route.amount_in(),
                route.amount_out()
            ),
            None => info!("No route {} -> {}", token_in, token_out),
        }
        Ok(best)
    }

    fn clears_liquidity(&self, route: &Route, amount: QuoteAmount) -> bool {
        match amount {
            QuoteAmount::ExactIn(_) => route.amount_out() >= self.min_liquidity,
            QuoteAmount::ExactOut(_) => route.amount_in() >= self.min_liquidity && route.amount_in() > 0,
        }
    }

    /// Quote errors mean "no route this way", not a failed search.
    async fn leg(&self, token_in: &TokenId, token_out: &TokenId, amount: QuoteAmount) -> Option<Quote> {
        match self.source.quote(token_in, token_out, amount).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!("Quote {} -> {} failed: {}", token_in, token_out, e);
                None
            }
        }
    }

    async fn direct(&self, token_in: &TokenId, token_out: &TokenId, amount: QuoteAmount) -> Option<Route> {
        self.leg(token_in, token_out, amount)
            .await
            .map(|q| Route { legs: vec![q] })
    }

    /// Two legs through `mid`. For exact output the second leg is priced
    /// first and its input becomes the first leg's exact output.
    async fn via(
        &self,
        token_in: &TokenId,
        mid: &TokenId,
        token_out: &TokenId,
        amount: QuoteAmount,
    ) -> Option<Route> {
        let legs = match amount {
            QuoteAmount::ExactIn(_) => {
                let first = self.leg(token_in, mid, amount).await?;
                let second = self
                    .leg(mid, token_out, QuoteAmount::ExactIn(first.amount_out))
                    .await?;
                vec![first, second]
            }
            QuoteAmount::ExactOut(_) => {
                let second = self.leg(mid, token_out, amount).await?;
                let first = self
                    .leg(token_in, mid, QuoteAmount::ExactOut(second.amount_in))
                    .await?;
                vec![first, second]
            }
        };
        if legs.iter().any(|q| q.amount_in == 0 || q.amount_out == 0) {
            return None;
        }
        Some(Route { legs })
    }
}
