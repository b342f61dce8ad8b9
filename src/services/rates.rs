/// Tax and shipping rate calculation, kept behind a trait so the placeholder
/// rules can be swapped for a real rate service without touching checkout or
/// order code.
pub trait RateCalculator: Send + Sync {
    /// Tax in minor units for the given subtotal.
    fn tax(&self, subtotal: i64) -> i64;

    /// Shipping fee in minor units for the destination city. `None` before
    /// an address is attached.
    fn shipping_fee(&self, city: Option<&str>) -> i64;
}

/// Current business rules: flat 10% tax, two-tier shipping fee keyed by
/// destination city.
#[derive(Debug, Clone, Default)]
pub struct FlatRateCalculator;

const TAX_RATE_PERCENT: i64 = 10;
const SHIPPING_FEE_LOCAL: i64 = 10_000;
const SHIPPING_FEE_REMOTE: i64 = 20_000;
const LOCAL_CITY: &str = "Jakarta";

impl RateCalculator for FlatRateCalculator {
    fn tax(&self, subtotal: i64) -> i64 {
        subtotal * TAX_RATE_PERCENT / 100
    }

    fn shipping_fee(&self, city: Option<&str>) -> i64 {
        match city {
            None => 0,
            Some(city) if city.eq_ignore_ascii_case(LOCAL_CITY) => SHIPPING_FEE_LOCAL,
            Some(_) => SHIPPING_FEE_REMOTE,
        }
    }
}
