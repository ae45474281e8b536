use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;

use crate::decimal::{Money, Rate};
use crate::interest::{AccrualContext, InterestPricer, PricingError};

/// day count convention for interest calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
pub enum DayCountConvention {
    /// actual days / 365
    #[default]
    Actual365,
    /// actual days / 360
    Actual360,
    /// 30 days per month / 360 days per year
    Thirty360,
    /// actual days / actual days in year (handles leap years)
    ActualActual,
}

/// day-count arithmetic for simple interest
pub struct AccrualEngine {
    pub convention: DayCountConvention,
}

impl AccrualEngine {
    pub fn new(convention: DayCountConvention) -> Self {
        Self { convention }
    }

    /// days between two instants under the convention, including the part day
    pub fn elapsed_days(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Decimal {
        if end <= start {
            return Decimal::ZERO;
        }
        let seconds_per_day = Decimal::from(SECONDS_PER_DAY);
        match self.convention {
            DayCountConvention::Actual365
            | DayCountConvention::Actual360
            | DayCountConvention::ActualActual => Decimal::from((end - start).num_seconds()) / seconds_per_day,
            DayCountConvention::Thirty360 => {
                let whole = i64::from(self.days_30_360(start.date_naive(), end.date_naive()));
                let intraday =
                    i64::from(end.num_seconds_from_midnight()) - i64::from(start.num_seconds_from_midnight());
                (Decimal::from(whole) + Decimal::from(intraday) / seconds_per_day).max(Decimal::ZERO)
            }
        }
    }

    /// calculate 30/360 days between dates
    fn days_30_360(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        let y1 = start.year();
        let y2 = end.year();
        let m1 = start.month() as i32;
        let m2 = end.month() as i32;
        let d1 = start.day().min(30) as i32;
        let d2 = if d1 == 30 { end.day().min(30) as i32 } else { end.day() as i32 };

        let days = 360 * (y2 - y1) + 30 * (m2 - m1) + (d2 - d1);
        days.max(0) as u32
    }

    /// get year basis for the convention
    pub fn year_basis(&self, year: i32) -> u32 {
        match self.convention {
            DayCountConvention::Actual365 => 365,
            DayCountConvention::Actual360 | DayCountConvention::Thirty360 => 360,
            DayCountConvention::ActualActual => {
                if is_leap_year(year) { 366 } else { 365 }
            }
        }
    }

    /// calculate simple interest (no compounding); `None` when out of range
    pub fn calculate_simple_interest(
        &self,
        principal: Money,
        annual_rate: Rate,
        days: Decimal,
        year_basis: u32,
    ) -> Option<Money> {
        let daily_rate = annual_rate.as_decimal() / Decimal::from(year_basis);
        principal.checked_mul(daily_rate)?.checked_mul(days)
    }
}

/// default pricer: simple interest on outstanding principal over the exact elapsed time
#[derive(Debug, Clone, Copy, Default)]
pub struct DayCountPricer;

impl InterestPricer for DayCountPricer {
    fn interest_due(&self, ctx: &AccrualContext) -> Result<Money, PricingError> {
        if ctx.period_end < ctx.period_start {
            return Err(PricingError::InvalidPeriod {
                start: ctx.period_start,
                end: ctx.period_end,
            });
        }
        if !ctx.principal.is_positive() {
            return Ok(Money::ZERO);
        }

        let engine = AccrualEngine::new(ctx.convention);
        let days = engine.elapsed_days(ctx.period_start, ctx.period_end);
        let year_basis = engine.year_basis(ctx.period_end.year());
        engine
            .calculate_simple_interest(ctx.principal, ctx.annual_rate, days, year_basis)
            .ok_or(PricingError::Overflow { principal: ctx.principal })
    }
}

const SECONDS_PER_DAY: i64 = 86_400;

/// check if year is a leap year
fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
