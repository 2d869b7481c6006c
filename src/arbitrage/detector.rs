//! Arbitrage Detector
//!
//! Scans cyclic routes quote → … → quote over a `StateView` and emits the
//! ones that clear the profit threshold after gas.
//!
//! Routes are enumerated once at construction from the registered pools:
//!   2 hops: ordered pool pairs within a pair group (same base/quote)
//!   3 hops: triangles across the whole pool set, when max_hops >= 3
//!
//! Each route is quoted at every configured trade size for its quote token
//! and the most profitable size is kept. Detection is synchronous; a cycle
//! only reads the view it was given.
//!
//! Created: 2026-01-27
//! Modified: 2026-01-29 - Added V3 pool support
//! Modified: 2026-02-04 - Exact route quoting over state views, speculative source, 3-hop routes

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::view::StateView;
use crate::config::{DetectionConfig, QuoteTokenConfig};
use crate::error::ArbError;
use crate::types::{
    from_decimal, to_decimal, Hop, Opportunity, OpportunitySource, Pool, TriggerInfo,
};

const BPS: u64 = 10_000;

/// Minimum net profit an opportunity must clear. Both bounds apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProfitThreshold {
    /// Net profit relative to input, in basis points
    pub min_profit_bps: u32,
    /// Net profit in human quote-token units
    #[serde(default)]
    pub min_profit_abs: Decimal,
}

/// Fee inputs for one detection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasPricing {
    pub base_fee: u128,
    pub priority_fee: u128,
}

impl GasPricing {
    pub fn gas_price(&self) -> u128 {
        self.base_fee.saturating_add(self.priority_fee)
    }
}

/// Pools trading the same base token against the same quote token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairGroup {
    pub base: Address,
    pub quote: Address,
    pub pools: Vec<Address>,
}

impl PairGroup {
    /// Group pools by (quote, base). A pool between two quote tokens lands
    /// in one group per quote token.
    pub fn build(pools: &[Arc<Pool>], quote_tokens: &[Address]) -> Vec<PairGroup> {
        let mut groups: BTreeMap<(Address, Address), Vec<Address>> = BTreeMap::new();
        for pool in pools {
            for quote in quote_tokens {
                if let Some(base) = pool.other_token(*quote) {
                    groups.entry((*quote, base)).or_default().push(pool.address);
                }
            }
        }
        groups
            .into_iter()
            .map(|((quote, base), mut pools)| {
                pools.sort();
                PairGroup { base, quote, pools }
            })
            .collect()
    }
}

/// Per-quote-token sizes and thresholds in raw units
#[derive(Debug, Clone)]
struct QuoteSpec {
    symbol: String,
    decimals: u8,
    trade_sizes: Vec<U256>,
    confirmed_abs: U256,
    speculative_abs: U256,
    /// Raw quote units per 1e18 wei
    native_price: Option<U256>,
}

#[derive(Debug, Clone)]
struct Route {
    quote: Address,
    hops: Vec<Hop>,
}

impl Route {
    fn touches(&self, pools: &HashSet<Address>) -> bool {
        self.hops.iter().any(|h| pools.contains(&h.pool))
    }
}

pub struct ArbitrageDetector {
    max_hops: usize,
    gas_per_swap: u64,
    gas_overhead: u64,
    base_latency: Duration,
    per_hop_latency: Duration,
    confirmed: ProfitThreshold,
    speculative: ProfitThreshold,
    wrapped_native: Address,
    quotes: HashMap<Address, QuoteSpec>,
    /// Quote token → pools pairing it with the wrapped native token
    gas_pools: HashMap<Address, Vec<Address>>,
    groups: Vec<PairGroup>,
    routes: Vec<Route>,
}

impl ArbitrageDetector {
    pub fn new(
        config: &DetectionConfig,
        wrapped_native: Address,
        quote_tokens: &[QuoteTokenConfig],
        pools: &[Arc<Pool>],
    ) -> Result<Self, ArbError> {
        let mut quotes = HashMap::new();
        for q in quote_tokens {
            let raw = |value: Decimal, what: &str| {
                from_decimal(value, q.decimals)
                    .ok_or_else(|| ArbError::Config(format!("{} {} out of range for {}", what, value, q.symbol)))
            };
            let trade_sizes = q
                .trade_sizes
                .iter()
                .map(|s| raw(*s, "trade size"))
                .collect::<Result<Vec<_>, _>>()?;
            let native_price = q.native_price.map(|p| raw(p, "native_price")).transpose()?;
            quotes.insert(
                q.address,
                QuoteSpec {
                    symbol: q.symbol.clone(),
                    decimals: q.decimals,
                    trade_sizes,
                    confirmed_abs: raw(config.confirmed.min_profit_abs, "confirmed.min_profit_abs")?,
                    speculative_abs: raw(config.speculative.min_profit_abs, "speculative.min_profit_abs")?,
                    native_price,
                },
            );
        }

        let quote_addrs: Vec<Address> = quote_tokens.iter().map(|q| q.address).collect();
        let groups = PairGroup::build(pools, &quote_addrs);
        let routes = enumerate_routes(&groups, pools, &quote_addrs, config.max_hops);

        let mut gas_pools: HashMap<Address, Vec<Address>> = HashMap::new();
        for pool in pools {
            if let Some(other) = pool.other_token(wrapped_native) {
                if quotes.contains_key(&other) {
                    gas_pools.entry(other).or_default().push(pool.address);
                }
            }
        }

        info!(
            "Detector: {} pair groups, {} routes (max {} hops), {} quote tokens",
            groups.len(),
            routes.len(),
            config.max_hops,
            quotes.len()
        );

        Ok(Self {
            max_hops: config.max_hops,
            gas_per_swap: config.gas_per_swap,
            gas_overhead: config.gas_overhead,
            base_latency: Duration::from_millis(config.base_latency_ms),
            per_hop_latency: Duration::from_millis(config.per_hop_latency_ms),
            confirmed: config.confirmed,
            speculative: config.speculative,
            wrapped_native,
            quotes,
            gas_pools,
            groups,
            routes,
        })
    }

    pub fn groups(&self) -> &[PairGroup] {
        &self.groups
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    pub fn threshold(&self, source: OpportunitySource) -> ProfitThreshold {
        match source {
            OpportunitySource::Confirmed => self.confirmed,
            OpportunitySource::Speculative => self.speculative,
        }
    }

    /// Required absolute profit in raw units of `quote`
    pub fn min_profit_raw(&self, quote: Address, source: OpportunitySource) -> Option<U256> {
        self.quotes.get(&quote).map(|q| match source {
            OpportunitySource::Confirmed => q.confirmed_abs,
            OpportunitySource::Speculative => q.speculative_abs,
        })
    }

    /// Whether `net` on `amount_in` of `quote` clears the threshold for `source`
    pub fn clears_threshold(&self, quote: Address, source: OpportunitySource, amount_in: U256, net: U256) -> bool {
        let Some(min_abs) = self.min_profit_raw(quote, source) else {
            return false;
        };
        let min_bps = U256::from(self.threshold(source).min_profit_bps);
        net >= min_abs && net.saturating_mul(U256::from(BPS)) >= min_bps.saturating_mul(amount_in)
    }

    pub fn quote_symbol(&self, quote: &Address) -> &str {
        self.quotes.get(quote).map(|q| q.symbol.as_str()).unwrap_or("?")
    }

    pub fn quote_decimals(&self, quote: &Address) -> u8 {
        self.quotes.get(quote).map(|q| q.decimals).unwrap_or(18)
    }

    /// Run one cycle over every route
    pub fn detect(&self, view: &dyn StateView, gas: GasPricing) -> Vec<Opportunity> {
        self.scan(view, gas, None)
    }

    /// Run one cycle over routes touching any of `pools`
    pub fn detect_touching(&self, view: &dyn StateView, gas: GasPricing, pools: &[Address]) -> Vec<Opportunity> {
        let focus: HashSet<Address> = pools.iter().copied().collect();
        self.scan(view, gas, Some(&focus))
    }

    fn scan(&self, view: &dyn StateView, gas: GasPricing, focus: Option<&HashSet<Address>>) -> Vec<Opportunity> {
        let source = view.source();
        let shadowed: HashSet<Address> = view.shadowed_pools().into_iter().collect();
        if source == OpportunitySource::Speculative && shadowed.is_empty() {
            return Vec::new();
        }

        let mut gas_costs: HashMap<(Address, usize), Option<U256>> = HashMap::new();
        let mut opportunities = Vec::new();
        let mut scanned = 0usize;

        for route in &self.routes {
            if source == OpportunitySource::Speculative && !route.touches(&shadowed) {
                continue;
            }
            if focus.is_some_and(|f| !route.touches(f)) {
                continue;
            }
            let Some(spec) = self.quotes.get(&route.quote) else {
                continue;
            };
            scanned += 1;

            let hop_count = route.hops.len();
            let gas_cost = *gas_costs
                .entry((route.quote, hop_count))
                .or_insert_with(|| self.gas_cost_in_quote(view, route.quote, spec, hop_count, gas));
            let Some(gas_cost) = gas_cost else {
                debug!("No gas price path to {}, skipping {}-hop routes", spec.symbol, hop_count);
                continue;
            };

            if let Some(opp) = self.best_size(view, route, spec, gas_cost, source) {
                opportunities.push(opp);
            }
        }

        rank(&mut opportunities);

        debug!(
            "{} scan: {} routes, {} opportunities",
            source,
            scanned,
            opportunities.len()
        );
        for opp in &opportunities {
            info!(
                "🎯 {} OPPORTUNITY: {} | {} {} in → net {} {} | spread {}bps | {} hops",
                source.to_string().to_uppercase(),
                describe_route(view, &opp.hops),
                to_decimal(opp.amount_in, self.quote_decimals(&opp.quote_token)),
                self.quote_symbol(&opp.quote_token),
                to_decimal(opp.net_profit, self.quote_decimals(&opp.quote_token)),
                self.quote_symbol(&opp.quote_token),
                opp.gross_spread_bps,
                opp.hop_count(),
            );
        }

        opportunities
    }

    /// Quote `route` at each trade size and keep the largest net profit that
    /// clears the threshold.
    fn best_size(
        &self,
        view: &dyn StateView,
        route: &Route,
        spec: &QuoteSpec,
        gas_cost: U256,
        source: OpportunitySource,
    ) -> Option<Opportunity> {
        let mut best: Option<Opportunity> = None;

        for &amount_in in &spec.trade_sizes {
            let Some(expected_out) = chain_quote(view, &route.hops, amount_in) else {
                continue;
            };
            let Some(net_profit) = expected_out
                .checked_sub(amount_in)
                .and_then(|gross| gross.checked_sub(gas_cost))
            else {
                continue;
            };
            if !self.clears_threshold(route.quote, source, amount_in, net_profit) {
                continue;
            }
            if best.as_ref().is_some_and(|b| b.net_profit >= net_profit) {
                continue;
            }

            let trigger = match source {
                OpportunitySource::Confirmed => None,
                OpportunitySource::Speculative => earliest_trigger(view, &route.hops),
            };
            best = Some(Opportunity {
                hops: route.hops.clone(),
                quote_token: route.quote,
                amount_in,
                expected_out,
                gross_spread_bps: spread_bps(amount_in, expected_out),
                gas_cost_quote: gas_cost,
                net_profit,
                estimated_latency: self.base_latency + self.per_hop_latency * route.hops.len() as u32,
                source,
                trigger,
                detected_at: Instant::now(),
            });
        }

        best
    }

    /// (gas_per_swap * hops + overhead) * gas price, converted to raw quote
    /// units through a wrapped-native pool in the view, else the configured
    /// native price.
    fn gas_cost_in_quote(
        &self,
        view: &dyn StateView,
        quote: Address,
        spec: &QuoteSpec,
        hops: usize,
        gas: GasPricing,
    ) -> Option<U256> {
        let units = self.gas_per_swap.saturating_mul(hops as u64).saturating_add(self.gas_overhead);
        let wei = U256::from(units).checked_mul(U256::from(gas.gas_price()))?;
        if wei.is_zero() || quote == self.wrapped_native {
            return Some(wei);
        }

        let via_pool = self
            .gas_pools
            .get(&quote)
            .into_iter()
            .flatten()
            .filter_map(|pool| view.quote_exact_input(pool, self.wrapped_native, wei))
            .max();
        via_pool.or_else(|| {
            spec.native_price
                .and_then(|price| wei.checked_mul(price))
                .map(|v| v / U256::from(10u64.pow(18)))
        })
    }
}

/// Net profit desc, then hop count asc, then estimated latency asc
pub fn rank(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.net_profit
            .cmp(&a.net_profit)
            .then(a.hop_count().cmp(&b.hop_count()))
            .then(a.estimated_latency.cmp(&b.estimated_latency))
    });
}

fn chain_quote(view: &dyn StateView, hops: &[Hop], amount_in: U256) -> Option<U256> {
    hops.iter().try_fold(amount_in, |amount, hop| {
        view.quote_exact_input(&hop.pool, hop.token_in, amount)
            .filter(|out| !out.is_zero())
    })
}

fn spread_bps(amount_in: U256, amount_out: U256) -> i64 {
    if amount_in.is_zero() {
        return 0;
    }
    if amount_out >= amount_in {
        let bps: u64 = ((amount_out - amount_in) * U256::from(BPS) / amount_in).saturating_to();
        bps.min(i64::MAX as u64) as i64
    } else {
        let bps: u64 = ((amount_in - amount_out) * U256::from(BPS) / amount_in).saturating_to();
        -(bps.min(i64::MAX as u64) as i64)
    }
}

/// The shadowed hop that expires first bounds the opportunity's life
fn earliest_trigger(view: &dyn StateView, hops: &[Hop]) -> Option<TriggerInfo> {
    hops.iter()
        .filter_map(|hop| {
            let entry = view.entry(&hop.pool)?;
            let shadow = entry.shadow?;
            Some(TriggerInfo {
                tx_hash: shadow.trigger,
                pool: hop.pool,
                expires_at: shadow.expires_at,
            })
        })
        .min_by_key(|t| t.expires_at)
}

fn describe_route(view: &dyn StateView, hops: &[Hop]) -> String {
    hops.iter()
        .map(|hop| match view.entry(&hop.pool) {
            Some(entry) => format!("{}[{} {}]", entry.pool.label, entry.pool.dex, hop.variant),
            None => hop.pool.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" → ")
}

fn hop(pool: &Pool, token_in: Address) -> Option<Hop> {
    Some(Hop {
        pool: pool.address,
        variant: pool.variant,
        token_in,
        token_out: pool.other_token(token_in)?,
    })
}

fn enumerate_routes(
    groups: &[PairGroup],
    pools: &[Arc<Pool>],
    quote_tokens: &[Address],
    max_hops: usize,
) -> Vec<Route> {
    let by_addr: HashMap<Address, &Arc<Pool>> = pools.iter().map(|p| (p.address, p)).collect();
    let mut routes = Vec::new();

    for group in groups {
        for first in &group.pools {
            for second in &group.pools {
                if first == second {
                    continue;
                }
                let (Some(p1), Some(p2)) = (by_addr.get(first), by_addr.get(second)) else {
                    continue;
                };
                if let (Some(h1), Some(h2)) = (hop(p1, group.quote), hop(p2, group.base)) {
                    routes.push(Route {
                        quote: group.quote,
                        hops: vec![h1, h2],
                    });
                }
            }
        }
    }

    if max_hops >= 3 {
        let mut by_token: HashMap<Address, Vec<&Arc<Pool>>> = HashMap::new();
        for pool in pools {
            by_token.entry(pool.token0).or_default().push(pool);
            by_token.entry(pool.token1).or_default().push(pool);
        }
        let empty = Vec::new();

        for &quote in quote_tokens {
            for p1 in by_token.get(&quote).unwrap_or(&empty) {
                let Some(h1) = hop(p1, quote) else { continue };
                for p2 in by_token.get(&h1.token_out).unwrap_or(&empty) {
                    if p2.address == p1.address {
                        continue;
                    }
                    let Some(h2) = hop(p2, h1.token_out) else { continue };
                    if h2.token_out == quote {
                        continue;
                    }
                    for p3 in by_token.get(&h2.token_out).unwrap_or(&empty) {
                        if p3.address == p1.address || p3.address == p2.address || !p3.has_token(quote) {
                            continue;
                        }
                        if let Some(h3) = hop(p3, h2.token_out) {
                            routes.push(Route {
                                quote,
                                hops: vec![h1, h2, h3],
                            });
                        }
                    }
                }
            }
        }
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::view::{CanonicalView, SpeculativeView};
    use crate::contracts::IUniswapV2Router02;
    use crate::mempool::{MempoolPredictor, PendingTx, ShadowOverlay};
    use crate::pool::v3_math::{get_sqrt_ratio_at_tick, MAX_TICK, MIN_TICK};
    use crate::pool::PoolStateManager;
    use crate::types::{ConcentratedState, DexVariant, PoolState, VersionToken};
    use alloy::primitives::{address, b256, Bytes, TxHash};
    use alloy::sol_types::SolCall;
    use rust_decimal_macros::dec;

    const USDC: Address = address!("2791bca1f2de4661ed88a30c99a7a9449aa84174");
    const WETH: Address = address!("7ceb23fd6bc0add59e62ac25578270cff1b9f619");
    const WMATIC: Address = address!("0d500b1d8e8ef31e21c99d1db9a6444d3adf1270");
    const CL_POOL: Address = address!("45dda9cb7c25131df268515131f647d726f50608");
    const CP_POOL: Address = address!("853ee4b2a13f8a742d64c8f088be7ba2131f670d");
    const V2_ROUTER: Address = address!("a5e0829caced8ffdd4de3c43696c57f7d7a678ff");
    const TRIGGER: TxHash = b256!("2222222222222222222222222222222222222222222222222222222222222222");

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64.pow(18))
    }

    fn cl_pool() -> Pool {
        Pool {
            address: CL_POOL,
            variant: DexVariant::ConcentratedLiquidity,
            token0: USDC,
            token1: WETH,
            fee: 500,
            tick_spacing: 10,
            dex: "UniswapV3".into(),
            label: "WETH/USDC".into(),
        }
    }

    fn cp_pool() -> Pool {
        Pool {
            address: CP_POOL,
            variant: DexVariant::ConstantProduct,
            token0: USDC,
            token1: WETH,
            fee: 3000,
            tick_spacing: 0,
            dex: "QuickSwapV2".into(),
            label: "WETH/USDC".into(),
        }
    }

    /// ~2000 USDC per WETH, deep enough that 5k USDC barely moves it
    fn cl_state() -> PoolState {
        let tick = 200_310;
        PoolState::ConcentratedLiquidity(ConcentratedState {
            sqrt_price_x96: get_sqrt_ratio_at_tick(tick).unwrap(),
            liquidity: 200_000_000_000_000_000,
            tick,
            fee: 500,
            ticks: Default::default(),
            tick_window: (MIN_TICK, MAX_TICK),
        })
    }

    /// 1000 WETH against `usdc` whole USDC
    fn cp_state(usdc: u64) -> PoolState {
        PoolState::ConstantProduct {
            reserve0: U256::from(usdc) * U256::from(1_000_000u64),
            reserve1: e18(1_000),
        }
    }

    fn config(confirmed_bps: u32) -> DetectionConfig {
        DetectionConfig {
            max_hops: 2,
            gas_per_swap: 150_000,
            gas_overhead: 60_000,
            base_latency_ms: 40,
            per_hop_latency_ms: 5,
            confirmed: ProfitThreshold {
                min_profit_bps: confirmed_bps,
                min_profit_abs: dec!(1),
            },
            speculative: ProfitThreshold {
                min_profit_bps: 100,
                min_profit_abs: dec!(1),
            },
        }
    }

    fn quote_tokens() -> Vec<QuoteTokenConfig> {
        vec![QuoteTokenConfig {
            symbol: "USDC".into(),
            address: USDC,
            decimals: 6,
            trade_sizes: vec![dec!(1000), dec!(5000)],
            native_price: Some(dec!(0.5)),
        }]
    }

    fn setup(cp_usdc: u64) -> PoolStateManager {
        let manager = PoolStateManager::new();
        manager.register(cl_pool(), cl_state(), VersionToken::snapshot_at(1)).unwrap();
        manager.register(cp_pool(), cp_state(cp_usdc), VersionToken::snapshot_at(1)).unwrap();
        manager
    }

    fn detector(manager: &PoolStateManager, confirmed_bps: u32) -> ArbitrageDetector {
        ArbitrageDetector::new(&config(confirmed_bps), WMATIC, &quote_tokens(), &manager.pools()).unwrap()
    }

    fn gas() -> GasPricing {
        GasPricing {
            base_fee: 30_000_000_000,
            priority_fee: 30_000_000_000,
        }
    }

    #[test]
    fn test_pair_groups_and_two_hop_routes() {
        let manager = setup(2_060_000);
        let detector = detector(&manager, 100);
        assert_eq!(detector.groups().len(), 1);
        assert_eq!(detector.groups()[0].base, WETH);
        assert_eq!(detector.groups()[0].pools.len(), 2);
        // CL→CP and CP→CL
        assert_eq!(detector.route_count(), 2);
    }

    #[test]
    fn test_confirmed_cl_cp_spread_detected() {
        // CP prices WETH 3% above CL; threshold 1%
        let manager = setup(2_060_000);
        let detector = detector(&manager, 100);
        let opps = detector.detect(&CanonicalView::new(&manager), gas());

        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        assert_eq!(opp.source, OpportunitySource::Confirmed);
        assert!(opp.trigger.is_none());
        // Buy WETH on the cheap CL pool, sell on CP
        assert_eq!(opp.hops[0].pool, CL_POOL);
        assert_eq!(opp.hops[1].pool, CP_POOL);
        assert_eq!(opp.hops[0].token_in, USDC);
        assert_eq!(opp.hops[1].token_out, USDC);
        // Larger size wins on absolute profit
        assert_eq!(opp.amount_in, U256::from(5_000_000_000u64));
        assert!(opp.gross_spread_bps > 200 && opp.gross_spread_bps < 300);
        assert_eq!(opp.expected_out, opp.amount_in + opp.net_profit + opp.gas_cost_quote);
        // 360k gas at 60 gwei, 0.5 USDC per native token
        assert_eq!(opp.gas_cost_quote, U256::from(10_800u64));
    }

    #[test]
    fn test_nothing_below_threshold() {
        let manager = setup(2_060_000);
        let detector = detector(&manager, 500);
        assert!(detector.detect(&CanonicalView::new(&manager), gas()).is_empty());

        // No spread at all
        let flat = setup(2_000_000);
        let detector = self::detector(&flat, 100);
        assert!(detector.detect(&CanonicalView::new(&flat), gas()).is_empty());
    }

    #[test]
    fn test_threshold_requires_both_bounds() {
        let manager = setup(2_060_000);
        let detector = detector(&manager, 100);
        let amount = U256::from(1_000_000_000u64);
        // Each bound on its own
        assert!(detector.clears_threshold(USDC, OpportunitySource::Confirmed, amount, U256::from(20_000_000u64)));
        assert!(!detector.clears_threshold(USDC, OpportunitySource::Confirmed, amount, U256::from(9_000_000u64)));
        assert!(!detector.clears_threshold(
            USDC,
            OpportunitySource::Confirmed,
            U256::from(10_000_000u64),
            U256::from(900_000u64)
        ));
    }

    #[test]
    fn test_speculative_opportunity_disappears_after_ttl() {
        // Pools start level; a pending 31k USDC buy on CP lifts WETH there ~3%
        let manager = setup(2_000_000);
        let detector = detector(&manager, 100);
        let overlay = ShadowOverlay::new();
        let ttl = Duration::from_secs(2);
        let predictor = MempoolPredictor::new(
            manager.clone(),
            overlay.clone(),
            HashMap::from([(V2_ROUTER, "QuickSwapV2".to_string())]),
            ttl,
        );

        let input = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: U256::from(31_000_000_000u64),
            amountOutMin: U256::ZERO,
            path: vec![USDC, WETH],
            to: Address::ZERO,
            deadline: U256::MAX,
        }
        .abi_encode();
        let t0 = Instant::now();
        let prediction = predictor
            .on_pending_at(
                &PendingTx {
                    hash: TRIGGER,
                    to: Some(V2_ROUTER),
                    input: Bytes::from(input),
                    max_priority_fee: None,
                    seen_at: t0,
                },
                t0,
            )
            .unwrap();
        assert_eq!(prediction.pool, CP_POOL);

        // Nothing on confirmed state
        assert!(detector.detect(&CanonicalView::new(&manager), gas()).is_empty());

        let opps = detector.detect(&SpeculativeView::at(&manager, &overlay, t0), gas());
        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        assert_eq!(opp.source, OpportunitySource::Speculative);
        let trigger = opp.trigger.as_ref().unwrap();
        assert_eq!(trigger.tx_hash, TRIGGER);
        assert_eq!(trigger.pool, CP_POOL);
        assert_eq!(trigger.expires_at, t0 + ttl);
        assert!(!opp.is_expired_at(t0));
        assert!(opp.is_expired_at(t0 + ttl));

        // Past the TTL the shadow entry is gone and so is the opportunity
        let later = SpeculativeView::at(&manager, &overlay, t0 + ttl);
        assert!(detector.detect(&later, gas()).is_empty());
    }

    #[test]
    fn test_rank_order() {
        let manager = setup(2_060_000);
        let detector = detector(&manager, 100);
        let base = detector.detect(&CanonicalView::new(&manager), gas()).remove(0);

        let mut three_hop = base.clone();
        three_hop.hops.push(base.hops[0]);
        let mut slower = base.clone();
        slower.estimated_latency += Duration::from_millis(10);
        let mut richer = base.clone();
        richer.net_profit += U256::from(1u8);

        let mut opps = vec![three_hop, slower, base.clone(), richer];
        rank(&mut opps);
        assert_eq!(opps[0].net_profit, base.net_profit + U256::from(1u8));
        assert_eq!(opps[1].hop_count(), 2);
        assert_eq!(opps[1].estimated_latency, base.estimated_latency);
        assert_eq!(opps[2].estimated_latency, base.estimated_latency + Duration::from_millis(10));
        assert_eq!(opps[3].hop_count(), 3);
    }

    #[test]
    fn test_three_hop_triangles() {
        let usdt = address!("c2132d05d31c914a87c6611c10748aeb04b58e8f");
        let mut cfg = config(100);
        cfg.max_hops = 3;
        let tri = |addr: Address, t0: Address, t1: Address| {
            Arc::new(Pool {
                address: addr,
                variant: DexVariant::ConstantProduct,
                token0: t0,
                token1: t1,
                fee: 3000,
                tick_spacing: 0,
                dex: "QuickSwapV2".into(),
                label: String::new(),
            })
        };
        let pools = vec![
            tri(address!("0000000000000000000000000000000000000001"), USDC, WETH),
            tri(address!("0000000000000000000000000000000000000002"), WETH, usdt),
            tri(address!("0000000000000000000000000000000000000003"), USDC, usdt),
        ];
        let detector = ArbitrageDetector::new(&cfg, WMATIC, &quote_tokens(), &pools).unwrap();
        // No 2-hop routes (one pool per group), both triangle directions from USDC
        assert_eq!(detector.route_count(), 2);
    }

    #[test]
    fn test_spread_bps_sign() {
        assert_eq!(spread_bps(U256::from(10_000u64), U256::from(10_300u64)), 300);
        assert_eq!(spread_bps(U256::from(10_000u64), U256::from(9_900u64)), -100);
        assert_eq!(spread_bps(U256::ZERO, U256::from(1u8)), 0);
    }
}
