//! Raw record normalization
//!
//! Turns scraped listings into [`NormalizedProduct`]s on the canonical GB
//! basis. Records that cannot be trusted (unknown server, missing or
//! non-positive price) are dropped here and never reach the aggregator.

use crate::models::{NormalizedProduct, RawProductRecord, ServerId};
use crate::utils::money::{parse_price_text, round_to_cents};
use tracing::debug;

/// Convert one raw record, or `None` if it must be dropped.
///
/// Pure: the same record always produces the same result.
pub fn normalize(raw: &RawProductRecord) -> Option<NormalizedProduct> {
    let Some(server) = ServerId::find_in(&raw.server) else {
        debug!(
            source = %raw.source_id,
            server = %raw.server,
            "Dropping record for unknown server"
        );
        return None;
    };

    let Some(buy_price_per_gb) = to_gb_price(&raw.raw_buy_price, raw.raw_unit.multiplier()) else {
        debug!(
            source = %raw.source_id,
            price = %raw.raw_buy_price,
            "Dropping record with unusable buy price"
        );
        return None;
    };

    // A broken sell quote does not invalidate the buy side
    let sell_price_per_gb = raw
        .raw_sell_price
        .as_deref()
        .and_then(|text| to_gb_price(text, raw.raw_unit.multiplier()));

    Some(NormalizedProduct {
        server,
        buy_price_per_gb,
        sell_price_per_gb,
        source_id: raw.source_id.clone(),
    })
}

/// Normalize a batch, keeping input order
pub fn normalize_all(records: &[RawProductRecord]) -> Vec<NormalizedProduct> {
    records.iter().filter_map(normalize).collect()
}

fn to_gb_price(text: &str, multiplier: f64) -> Option<f64> {
    let price = parse_price_text(text)?;
    if price <= 0.0 {
        return None;
    }
    let converted = round_to_cents(price / multiplier);
    // Sub-cent quotes round to zero and carry no information
    (converted > 0.0).then_some(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawUnit;

    fn record(server: &str, buy: &str, sell: Option<&str>, unit: RawUnit) -> RawProductRecord {
        RawProductRecord {
            server: server.to_string(),
            raw_buy_price: buy.to_string(),
            raw_sell_price: sell.map(str::to_string),
            raw_unit: unit,
            source_id: "kopazar".to_string(),
        }
    }

    #[test]
    fn test_ten_million_unit_conversion() {
        let product = normalize(&record("Zero", "28.4", None, RawUnit::TenMillion)).unwrap();
        assert_eq!(product.server, ServerId::Zero);
        assert_eq!(product.buy_price_per_gb, 2.84);
        assert_eq!(product.source_id, "kopazar");
    }

    #[test]
    fn test_all_units_share_one_basis() {
        let one_m = normalize(&record("Zero", "2,84", None, RawUnit::OneMillion)).unwrap();
        let hundred_m = normalize(&record("Zero", "284", None, RawUnit::HundredMillion)).unwrap();
        let one_gb = normalize(&record("Zero", "284,00 TL", None, RawUnit::OneGb)).unwrap();
        assert_eq!(one_m.buy_price_per_gb, 2.84);
        assert_eq!(hundred_m.buy_price_per_gb, 2.84);
        assert_eq!(one_gb.buy_price_per_gb, 2.84);
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        let product = normalize(&record("Felis", "17.567", None, RawUnit::TenMillion)).unwrap();
        assert_eq!(product.buy_price_per_gb, 1.76);
    }

    #[test]
    fn test_server_matching_is_case_insensitive() {
        let product = normalize(&record("knight online OREADS gb", "31", None, RawUnit::TenMillion)).unwrap();
        assert_eq!(product.server, ServerId::Oreads);
    }

    #[test]
    fn test_unknown_server_dropped() {
        assert!(normalize(&record("Ares", "28.4", None, RawUnit::TenMillion)).is_none());
    }

    #[test]
    fn test_bad_prices_dropped() {
        assert!(normalize(&record("Zero", "0", None, RawUnit::TenMillion)).is_none());
        assert!(normalize(&record("Zero", "-28.4", None, RawUnit::TenMillion)).is_none());
        assert!(normalize(&record("Zero", "Tükendi", None, RawUnit::TenMillion)).is_none());
        assert!(normalize(&record("Zero", "0,001", None, RawUnit::OneGb)).is_none());
    }

    #[test]
    fn test_ambiguous_price_text_dropped() {
        assert!(normalize(&record("Zero", "10M 28,40 TL", None, RawUnit::TenMillion)).is_none());
        assert!(normalize(&record("Zero", "28,40 TL - 30,00 TL", None, RawUnit::TenMillion)).is_none());
    }

    #[test]
    fn test_bad_sell_price_keeps_record() {
        let product = normalize(&record("Zero", "28.4", Some("n/a"), RawUnit::TenMillion)).unwrap();
        assert_eq!(product.sell_price_per_gb, None);

        let product = normalize(&record("Zero", "28.4", Some("26,5"), RawUnit::TenMillion)).unwrap();
        assert_eq!(product.sell_price_per_gb, Some(2.65));
    }

    #[test]
    fn test_normalize_is_pure() {
        let raw = record("Pandora", "28,05", Some("25.5"), RawUnit::TenMillion);
        let first = normalize(&raw);
        let second = normalize(&raw);
        assert_eq!(first, second);
    }

    #[test]
    fn test_normalize_all_keeps_order_and_drops_invalid() {
        let records = vec![
            record("Zero", "28.4", None, RawUnit::TenMillion),
            record("Nowhere", "28.4", None, RawUnit::TenMillion),
            record("Felis", "18", None, RawUnit::TenMillion),
        ];
        let products = normalize_all(&records);
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].server, ServerId::Zero);
        assert_eq!(products[1].server, ServerId::Felis);
    }
}
