use crate::model::{Alert, Direction, PricePair};

/// Quote an alert is compared against. A user buying transacts at the bank's
/// sell price and vice versa.
pub fn quote_for(direction: Direction, pair: PricePair) -> i64 {
    match direction {
        Direction::Buy => pair.sell,
        Direction::Sell => pair.buy,
    }
}

/// Inclusive threshold check: BUY fires when `threshold <= sell`, SELL when
/// `threshold >= buy`.
///
/// Mirrors the `WHERE` clause of `SqliteAlertStore::find_matching`, which is
/// the authoritative filter; keep both in step.
pub fn is_satisfied(alert: &Alert, pair: PricePair) -> bool {
    let quote = quote_for(alert.direction, pair);
    match alert.direction {
        Direction::Buy => alert.threshold <= quote,
        Direction::Sell => alert.threshold >= quote,
    }
}

/// Keep the alerts that `pair` satisfies, in their original order.
pub fn satisfied(alerts: Vec<Alert>, pair: PricePair) -> Vec<Alert> {
    alerts
        .into_iter()
        .filter(|alert| is_satisfied(alert, pair))
        .collect()
}

/// Message pushed to the owner of a satisfied alert.
pub fn notification(alert: &Alert, pair: PricePair) -> String {
    let quote = quote_for(alert.direction, pair);
    match alert.direction {
        Direction::Buy => format!("您設定的買進價為:{} \n 玉山賣出價:{}", alert.threshold, quote),
        Direction::Sell => format!("您設定的賣出為:{}\n 玉山買進價:{}", alert.threshold, quote),
    }
}
