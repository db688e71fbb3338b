use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::str::FromStr;

use crate::Error;

/// Unit of time a [`Rate`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    /// An average Gregorian month.
    Month,
    /// An average Gregorian year.
    Year,
}

impl Unit {
    /// Number of seconds in one unit.
    pub const fn seconds(self) -> f64 {
        match self {
            Unit::Microsecond => 0.000_001,
            Unit::Millisecond => 0.001,
            Unit::Second => 1.0,
            Unit::Minute => 60.0,
            Unit::Hour => 3_600.0,
            Unit::Day => 86_400.0,
            Unit::Week => 604_800.0,
            Unit::Month => 2_629_743.83,
            Unit::Year => 31_556_926.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Unit::Microsecond => "microsecond",
            Unit::Millisecond => "millisecond",
            Unit::Second => "second",
            Unit::Minute => "minute",
            Unit::Hour => "hour",
            Unit::Day => "day",
            Unit::Week => "week",
            Unit::Month => "month",
            Unit::Year => "year",
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "microsecond" => Unit::Microsecond,
            "millisecond" => Unit::Millisecond,
            "second" => Unit::Second,
            "minute" => Unit::Minute,
            "hour" => Unit::Hour,
            "day" => Unit::Day,
            "week" => Unit::Week,
            "month" => Unit::Month,
            "year" => Unit::Year,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "'{other}' is not a valid unit"
                )));
            }
        })
    }
}

/// Token production rate: `amount` tokens per `unit` of time.
///
/// # Examples
///
/// ```rust
/// use clepsydra::{Rate, Unit};
/// use std::num::NonZeroU32;
///
/// // 100 tokens per second
/// let rate = Rate::per_second(NonZeroU32::new(100).unwrap());
/// assert_eq!(rate.tokens_per_second(), 100.0);
///
/// // 1 token per millisecond, validated at runtime
/// let rate = Rate::new(1.0, Unit::Millisecond).unwrap();
/// assert_eq!(rate.tokens_per_second(), 1000.0);
///
/// assert!(Rate::new(0.0, Unit::Second).is_err());
/// ```
#[derive(Clone, Copy, PartialEq)]
pub struct Rate {
    amount: f64,
    unit: Unit,
}

impl std::fmt::Debug for Rate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate({} per {}, tokens_per_second={})",
            self.amount,
            self.unit,
            self.tokens_per_second()
        )
    }
}

impl Rate {
    /// Creates a rate of `amount` tokens per `unit`.
    ///
    /// Fails with [`Error::InvalidConfiguration`] unless `amount` is a finite
    /// number greater than zero.
    pub fn new(amount: f64, unit: Unit) -> Result<Self, Error> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "amount of tokens per {unit} should be greater than 0, got {amount}"
            )));
        }
        Ok(Self { amount, unit })
    }

    /// Like [`Rate::new`] with the unit given by name, e.g. `"minute"`.
    pub fn parse(amount: f64, unit: &str) -> Result<Self, Error> {
        Self::new(amount, unit.parse()?)
    }

    /// Creates a rate with the specified tokens per second.
    pub const fn per_second(rate: NonZeroU32) -> Self {
        Self {
            amount: rate.get() as f64,
            unit: Unit::Second,
        }
    }

    /// Creates a rate with the specified tokens per minute.
    ///
    /// ```rust
    /// use clepsydra::Rate;
    /// use std::num::NonZeroU32;
    ///
    /// let rate = Rate::per_minute(NonZeroU32::new(60).unwrap());
    /// assert_eq!(rate.tokens_per_second(), 1.0);
    /// ```
    pub const fn per_minute(rate: NonZeroU32) -> Self {
        Self {
            amount: rate.get() as f64,
            unit: Unit::Minute,
        }
    }

    /// Creates a rate with the specified tokens per hour.
    pub const fn per_hour(rate: NonZeroU32) -> Self {
        Self {
            amount: rate.get() as f64,
            unit: Unit::Hour,
        }
    }

    pub const fn amount(&self) -> f64 {
        self.amount
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    /// Returns the rate in tokens per second.
    pub const fn tokens_per_second(&self) -> f64 {
        self.amount / self.unit.seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_per_second() {
        let cases = [
            (1.0, Unit::Microsecond, 1_000_000.0),
            (1.0, Unit::Millisecond, 1_000.0),
            (10.0, Unit::Second, 10.0),
            (30.0, Unit::Minute, 0.5),
            (7_200.0, Unit::Hour, 2.0),
            (86_400.0, Unit::Day, 1.0),
            (604_800.0, Unit::Week, 1.0),
            (31_556_926.0, Unit::Year, 1.0),
        ];
        for (amount, unit, expected) in cases {
            let rate = Rate::new(amount, unit).unwrap();
            assert_eq!(expected, rate.tokens_per_second(), "{rate:?}");
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        for amount in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Rate::new(amount, Unit::Second),
                Err(Error::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn parses_units() {
        let rate = Rate::parse(2.0, "minute").unwrap();
        assert_eq!(Unit::Minute, rate.unit());
        assert_eq!(2.0, rate.amount());
        assert!(matches!(
            Rate::parse(2.0, "fortnight"),
            Err(Error::InvalidConfiguration(_))
        ));
        for unit in [Unit::Microsecond, Unit::Month, Unit::Year] {
            assert_eq!(unit, unit.to_string().parse().unwrap());
        }
    }

    #[test]
    fn const_constructors() {
        let rate = Rate::per_hour(NonZeroU32::new(3600).unwrap());
        assert_eq!(1.0, rate.tokens_per_second());
        assert_eq!(Unit::Hour, rate.unit());
        assert_eq!(
            Rate::new(5.0, Unit::Second).unwrap(),
            Rate::per_second(NonZeroU32::new(5).unwrap())
        );
    }
}
