//! Best-price engine
//!
//! Builds the per-server view of one run. Only successful sources count, and
//! nothing is carried over from earlier runs: a server nobody quoted this run
//! simply does not appear.

use crate::models::{Offer, ServerBest, ServerId, SourceResult};
use crate::utils::money::{mean, round_to_cents};
use std::collections::BTreeMap;

/// Compute the best offer per known server.
///
/// Offers are sorted by buy price with a stable sort, so equal prices keep the
/// order of `results`. Pass results in a fixed order (the orchestrator returns
/// them in adapter registration order) to get identical output every time.
pub fn aggregate(results: &[SourceResult], known_servers: &[ServerId]) -> BTreeMap<ServerId, ServerBest> {
    let mut best_by_server = BTreeMap::new();

    for &server in known_servers {
        let mut offers = collect_offers(results, server);
        if offers.is_empty() {
            continue;
        }

        offers.sort_by(|a, b| a.buy_price_per_gb.total_cmp(&b.buy_price_per_gb));

        let prices: Vec<f64> = offers.iter().map(|o| o.buy_price_per_gb).collect();
        let min = prices[0];
        let max = prices[prices.len() - 1];
        let average = mean(&prices).unwrap_or(min);

        best_by_server.insert(
            server,
            ServerBest {
                best_source: offers[0].source_id.clone(),
                best_price: min,
                all_offers: offers,
                average_price: round_to_cents(average),
                price_range: round_to_cents(max - min),
            },
        );
    }

    best_by_server
}

/// First listing per successful source for `server`
fn collect_offers(results: &[SourceResult], server: ServerId) -> Vec<Offer> {
    results
        .iter()
        .filter(|result| result.is_success())
        .filter_map(|result| {
            result
                .products
                .iter()
                .find(|product| product.server == server)
                .map(|product| Offer {
                    source_id: result.source_id.clone(),
                    source_name: result.source_name.clone(),
                    buy_price_per_gb: product.buy_price_per_gb,
                    sell_price_per_gb: product.sell_price_per_gb,
                })
        })
        .collect()
}
