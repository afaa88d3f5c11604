//! Orderbook client
//!
//! Limit and market orders on the intents orderbook contract. Reads and
//! market-order quotes are view calls; every write is an intent published
//! through the solver network and awaited until settlement.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{ClientError, ClientResult};
use crate::intents::{Intent, IntentsClient, TokenId};
use crate::primitives::{dec_format, AccountId, Balance};

pub const ORDERBOOK_CONTRACT: &str = "orderbook.fi.tg";
pub const FEE_COLLECTOR: &str = "intents.fi.tg";
/// Basis points.
pub const DEFAULT_FEE: u32 = 30;

// ============================================================================
// MODELS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub base: TokenId,
    pub quote: TokenId,
}

/// One price level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderEntry {
    /// Raw price: quote units per base unit, as a decimal string.
    pub price: String,
    #[serde(with = "dec_format")]
    pub order_balance: Balance,
}

impl OrderEntry {
    pub fn price_value(&self) -> f64 {
        self.price.parse().unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawOrderBook {
    #[serde(default)]
    asks: Vec<OrderEntry>,
    #[serde(default)]
    bids: Vec<OrderEntry>,
}

/// Both sides of a pair's book. Asks ascend by price, bids descend.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    pub decimal_base: u8,
    pub decimal_quote: u8,
    pub asks: Vec<OrderEntry>,
    pub bids: Vec<OrderEntry>,
}

impl OrderBook {
    pub fn new(decimal_base: u8, decimal_quote: u8, mut asks: Vec<OrderEntry>, mut bids: Vec<OrderEntry>) -> Self {
        let by_price = |a: &OrderEntry, b: &OrderEntry| {
            a.price_value()
                .partial_cmp(&b.price_value())
                .unwrap_or(Ordering::Equal)
        };
        asks.sort_by(by_price);
        bids.sort_by(|a, b| by_price(b, a));
        Self {
            decimal_base,
            decimal_quote,
            asks,
            bids,
        }
    }

    pub fn best_bid(&self) -> Option<&OrderEntry> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderEntry> {
        self.asks.first()
    }

    /// Best ask minus best bid, in raw price units.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()?.price_value() - self.best_bid()?.price_value())
    }

    /// Raw price converted to quote tokens per whole base token.
    pub fn human_price(&self, entry: &OrderEntry) -> f64 {
        let exp = i32::from(self.decimal_base) - i32::from(self.decimal_quote);
        entry.price_value() * 10f64.powi(exp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderInfo {
    pub side: String,
    pub maker: String,
    pub price: String,
    pub token_pair: TokenPair,
    pub created_ts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Order {
    pub hash: String,
    #[serde(rename = "order")]
    pub info: OrderInfo,
    #[serde(with = "dec_format")]
    pub order_balance: Balance,
}

/// Fee share in basis points and who collects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCollector {
    pub fee: u32,
    pub collector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProtocolFees {
    pub taker_fee_collectors: Vec<FeeCollector>,
    pub maker_fee_collectors: Vec<FeeCollector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TakerType {
    pub order_type: String,
    #[serde(default)]
    pub min_amount_out: Option<String>,
}

/// How a market order would fill against the current book.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookFillResult {
    pub taker_type: TakerType,
    pub taker_side: String,
    pub token_pair: BTreeMap<String, String>,
    #[serde(with = "dec_format")]
    pub taker_receive_total: Balance,
    #[serde(with = "dec_format")]
    pub taker_unspent: Balance,
    pub makers_receive_total_by_account: BTreeMap<String, String>,
    pub updated_balance_by_order: BTreeMap<String, String>,
    #[serde(with = "dec_format")]
    pub taker_fee_quote: Balance,
    #[serde(with = "dec_format")]
    pub makers_total_fee_quote: Balance,
    pub fee_config: ProtocolFees,
}

/// Result of the `get_quote_pub` view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketOrderSimulation {
    pub book_fill_result: BookFillResult,
    #[serde(default)]
    pub taker_remainder: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub increase_user_balance: BTreeMap<String, BTreeMap<String, u128>>,
}

#[derive(Debug, Clone, Serialize)]
struct LimitOrderMsg<'a> {
    token_pair: &'a TokenPair,
    price: &'a str,
    refs: Vec<FeeCollector>,
    order_type: &'static str,
}

/// Market order placement. Exactly one of the two bounds is set.
#[derive(Debug, Clone, Serialize)]
struct MarketOrderMsg<'a> {
    token_pair: &'a TokenPair,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_amount_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exact_amount_out: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    refs: Vec<FeeCollector>,
    order_type: &'static str,
}

/// Moves the decimal point of a plain decimal string `shift` places right
/// (left when negative) and strips redundant zeros.
fn shift_decimal(value: &str, shift: i32) -> String {
    let (int_part, frac_part) = value.split_once('.').unwrap_or((value, ""));
    let digits: String = format!("{}{}", int_part, frac_part);
    let point = int_part.len() as i64 + i64::from(shift);

    let (int_digits, frac_digits) = if point <= 0 {
        (String::new(), format!("{}{}", "0".repeat((-point) as usize), digits))
    } else if point as usize >= digits.len() {
        (format!("{}{}", digits, "0".repeat(point as usize - digits.len())), String::new())
    } else {
        let (i, f) = digits.split_at(point as usize);
        (i.to_string(), f.to_string())
    };

    let int_digits = int_digits.trim_start_matches('0');
    let frac_digits = frac_digits.trim_end_matches('0');
    let int_digits = if int_digits.is_empty() { "0" } else { int_digits };
    if frac_digits.is_empty() {
        int_digits.to_string()
    } else {
        format!("{}.{}", int_digits, frac_digits)
    }
}

fn market_bounds(
    min_amount_out: Option<Balance>,
    exact_amount_out: Option<Balance>,
) -> ClientResult<(Option<String>, Option<String>)> {
    match (min_amount_out, exact_amount_out) {
        (Some(_), Some(_)) => Err(ClientError::validation(
            "Market order takes min_amount_out or exact_amount_out, not both",
        )),
        (None, Some(exact)) => Ok((None, Some(exact.to_string()))),
        (min, None) => Ok((Some(min.unwrap_or(0).to_string()), None)),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Orderbook access for one token pair.
pub struct OrderbookClient {
    intents: Arc<IntentsClient>,
    contract: AccountId,
    pair: TokenPair,
    decimal_base: u8,
    decimal_quote: u8,
    fee_collector: String,
    fee: u32,
}

impl OrderbookClient {
    /// # Arguments
    ///
    /// * `intents` - Signs and publishes the order intents
    /// * `pair` - Base and quote token
    /// * `decimal_base` / `decimal_quote` - Token decimals, used for price conversion
    pub fn new(
        intents: Arc<IntentsClient>,
        pair: TokenPair,
        decimal_base: u8,
        decimal_quote: u8,
    ) -> ClientResult<Self> {
        Ok(Self {
            intents,
            contract: ORDERBOOK_CONTRACT.parse()?,
            pair,
            decimal_base,
            decimal_quote,
            fee_collector: FEE_COLLECTOR.to_string(),
            fee: DEFAULT_FEE,
        })
    }

    /// Overrides the referral fee and its collector.
    pub fn with_fee(mut self, collector: impl Into<String>, fee: u32) -> Self {
        self.fee_collector = collector.into();
        self.fee = fee;
        self
    }

    pub fn with_contract(mut self, contract: AccountId) -> Self {
        self.contract = contract;
        self
    }

    pub fn pair(&self) -> &TokenPair {
        &self.pair
    }

    /// Converts a human price (quote per whole base token) to the raw
    /// orderbook format.
    pub fn price_from_float(&self, price: f64) -> ClientResult<String> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ClientError::validation(format!("Invalid price {}", price)));
        }
        let shift = i32::from(self.decimal_quote) - i32::from(self.decimal_base);
        Ok(shift_decimal(&price.to_string(), shift))
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub async fn get_orderbook(&self, depth: u32) -> ClientResult<OrderBook> {
        let raw: RawOrderBook = self
            .intents
            .account()
            .view_function(
                &self.contract,
                "get_orderbook",
                &json!({ "token_pair": self.pair, "depth": depth }),
            )
            .await?
            .json()?;
        Ok(OrderBook::new(self.decimal_base, self.decimal_quote, raw.asks, raw.bids))
    }

    pub async fn get_orders(&self, skip: u32, limit: u32) -> ClientResult<Vec<Order>> {
        self.intents
            .account()
            .view_function(
                &self.contract,
                "get_orders",
                &json!({ "skip": skip, "limit": limit, "token_pair": self.pair }),
            )
            .await?
            .json()
    }

    pub async fn get_protocol_fee(&self) -> ClientResult<ProtocolFees> {
        self.intents
            .account()
            .view_function(
                &self.contract,
                "get_protocol_fee",
                &json!({ "token_pair": self.pair }),
            )
            .await?
            .json()
    }

    /// Proceeds of filled orders not yet claimed, by token id.
    pub async fn get_pending_balance(&self) -> ClientResult<BTreeMap<String, Balance>> {
        let account = self.intents.account();
        let raw: BTreeMap<String, String> = account
            .view_function(
                &self.contract,
                "get_user_balance",
                &json!({ "account_id": account.account_id() }),
            )
            .await?
            .json()?;
        raw.into_iter()
            .map(|(token, amount)| {
                let parsed = amount.parse().map_err(|_| {
                    ClientError::ViewFunction(format!("Invalid balance '{}' for {}", amount, token))
                })?;
                Ok((token, parsed))
            })
            .collect()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Sells `amount` of `token_in` at `price` (raw format, see
    /// [`Self::price_from_float`]).
    ///
    /// # Returns
    ///
    /// * `Ok(Some(tx_hash))` - Order placed and settled
    /// * `Ok(None)` - Published but not settled in time
    pub async fn place_limit_order(
        &self,
        price: &str,
        amount: Balance,
        token_in: &TokenId,
    ) -> ClientResult<Option<String>> {
        self.check_order(amount, token_in)?;
        let order = LimitOrderMsg {
            token_pair: &self.pair,
            price,
            refs: self.fee_refs(),
            order_type: "limit",
        };
        info!("Placing limit order: {} {} at {}", amount, token_in, price);
        self.submit_order(amount, token_in, serde_json::to_string(&order)?)
            .await
    }

    /// Market order message. Without bounds the order accepts any output
    /// (`min_amount_out = 0`).
    ///
    /// # Returns
    ///
    /// * `Err(ClientError::Validation)` - Both bounds were given
    pub fn build_market_order(
        &self,
        min_amount_out: Option<Balance>,
        exact_amount_out: Option<Balance>,
    ) -> ClientResult<String> {
        let (min_amount_out, exact_amount_out) = market_bounds(min_amount_out, exact_amount_out)?;
        let order = MarketOrderMsg {
            token_pair: &self.pair,
            min_amount_out,
            exact_amount_out,
            refs: self.fee_refs(),
            order_type: "market",
        };
        Ok(serde_json::to_string(&order)?)
    }

    /// Sells `amount` of `token_in` against the book.
    pub async fn place_market_order(
        &self,
        amount: Balance,
        token_in: &TokenId,
        min_amount_out: Option<Balance>,
        exact_amount_out: Option<Balance>,
    ) -> ClientResult<Option<String>> {
        self.check_order(amount, token_in)?;
        let msg = self.build_market_order(min_amount_out, exact_amount_out)?;
        info!("Placing market order: {} {}", amount, token_in);
        self.submit_order(amount, token_in, msg).await
    }

    /// Quotes a market order without placing it.
    pub async fn simulate_market_order(
        &self,
        amount: Balance,
        token_in: &TokenId,
        min_amount_out: Option<Balance>,
        exact_amount_out: Option<Balance>,
    ) -> ClientResult<MarketOrderSimulation> {
        self.check_order(amount, token_in)?;
        let (min_amount_out, exact_amount_out) = market_bounds(min_amount_out, exact_amount_out)?;
        let action = MarketOrderMsg {
            token_pair: &self.pair,
            min_amount_out,
            exact_amount_out,
            refs: Vec::new(),
            order_type: "market",
        };
        self.intents
            .account()
            .view_function(
                &self.contract,
                "get_quote_pub",
                &json!({
                    "ext": { "refs": self.fee_refs() },
                    "amount": amount.to_string(),
                    "token_id": token_in,
                    "order_placement_action": action,
                }),
            )
            .await?
            .json()
    }

    fn fee_refs(&self) -> Vec<FeeCollector> {
        vec![FeeCollector {
            fee: self.fee,
            collector: self.fee_collector.clone(),
        }]
    }

    fn check_order(&self, amount: Balance, token_in: &TokenId) -> ClientResult<()> {
        if amount == 0 {
            return Err(ClientError::validation("Order amount must be positive"));
        }
        if *token_in != self.pair.base && *token_in != self.pair.quote {
            return Err(ClientError::validation(format!(
                "Token {} is not part of the pair",
                token_in
            )));
        }
        Ok(())
    }

    /// Transfers `amount` of `token_in` to the orderbook with the order in `msg`.
    async fn submit_order(
        &self,
        amount: Balance,
        token_in: &TokenId,
        msg: String,
    ) -> ClientResult<Option<String>> {
        let intent = Intent::Transfer {
            receiver_id: self.contract.clone(),
            tokens: BTreeMap::from([(token_in.clone(), amount.to_string())]),
            memo: None,
            msg: Some(msg),
            min_gas: None,
        };
        self.intents
            .submit_and_wait(&self.intents.intent().push(intent), &[])
            .await
    }

    pub async fn cancel_order(&self, order_hash: &str) -> ClientResult<Option<String>> {
        let msg = json!({ "action": "close_order", "data": order_hash }).to_string();
        info!("Cancelling order {}", order_hash);
        self.auth_call(msg).await
    }

    pub async fn claim_pending_balance(&self) -> ClientResult<Option<String>> {
        self.auth_call(json!({ "action": "claim_balance" }).to_string())
            .await
    }

    async fn auth_call(&self, msg: String) -> ClientResult<Option<String>> {
        let builder = self
            .intents
            .intent()
            .auth_call(self.contract.clone(), msg, 0, None);
        self.intents.submit_and_wait(&builder, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(price: &str, balance: Balance) -> OrderEntry {
        OrderEntry {
            price: price.to_string(),
            order_balance: balance,
        }
    }

    #[test]
    fn test_shift_decimal() {
        assert_eq!(shift_decimal("1.5", -3), "0.0015");
        assert_eq!(shift_decimal("1.5", 6), "1500000");
        assert_eq!(shift_decimal("0.25", 0), "0.25");
        assert_eq!(shift_decimal("12", -1), "1.2");
        assert_eq!(shift_decimal("100", -2), "1");
    }

    #[test]
    fn test_orderbook_sides_sorted() {
        let book = OrderBook::new(
            9,
            6,
            vec![entry("0.0021", 5), entry("0.0019", 7)],
            vec![entry("0.0015", 1), entry("0.0018", 2)],
        );
        assert_eq!(book.best_ask().unwrap().price, "0.0019");
        assert_eq!(book.best_bid().unwrap().price, "0.0018");
        let spread = book.spread().unwrap();
        assert!((spread - 0.0001).abs() < 1e-12);
        assert!((book.human_price(book.best_ask().unwrap()) - 1.9).abs() < 1e-9);
    }

    #[test]
    fn test_empty_side_has_no_spread() {
        let book = OrderBook::new(6, 6, vec![], vec![entry("1", 1)]);
        assert!(book.best_ask().is_none());
        assert!(book.spread().is_none());
    }

    #[test]
    fn test_market_bounds() {
        assert_eq!(market_bounds(None, None).unwrap(), (Some("0".to_string()), None));
        assert_eq!(market_bounds(Some(5), None).unwrap(), (Some("5".to_string()), None));
        assert_eq!(market_bounds(None, Some(9)).unwrap(), (None, Some("9".to_string())));
        assert!(matches!(market_bounds(Some(1), Some(2)), Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_order_decoding() {
        let order: Order = serde_json::from_value(json!({
            "hash": "abc",
            "order": {
                "side": "sell",
                "maker": "alice.near",
                "price": "0.002",
                "token_pair": {"base": "nep141:wrap.near", "quote": "nep141:usdt.tether-token.near"},
                "created_ts": 1700000000
            },
            "order_balance": "1000"
        }))
        .unwrap();
        assert_eq!(order.info.maker, "alice.near");
        assert_eq!(order.order_balance, 1000);
    }
}
