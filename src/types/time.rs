//! Conversions between wire temporal values and [`time`] types.
use time::{Duration, PrimitiveDateTime, UtcDateTime};

use crate::common::unit_error;
use crate::value::{Date, Time, Timestamp};

unit_error! {
    /// A `date` or timestamp infinity has no [`time`] representation.
    pub struct InfiniteValue("value is infinite");
}

const PRIMITIVE_PG_EPOCH: PrimitiveDateTime = {
    // source: `from_julian_day` docs
    let date = match time::Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("julian day of 2000-01-01 is valid"),
    };
    PrimitiveDateTime::new(date, time::Time::MIDNIGHT)
};

const UTC_PG_EPOCH: UtcDateTime = {
    let date = match time::Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("julian day of 2000-01-01 is valid"),
    };
    UtcDateTime::new(date, time::Time::MIDNIGHT)
};

impl From<time::Date> for Date {
    fn from(date: time::Date) -> Self {
        Date::Finite(date.to_julian_day() - 2_451_545)
    }
}

impl TryFrom<Date> for time::Date {
    type Error = InfiniteValue;

    fn try_from(date: Date) -> Result<Self, Self::Error> {
        match date {
            Date::Finite(days) => {
                time::Date::from_julian_day(days.saturating_add(2_451_545)).map_err(|_| InfiniteValue)
            }
            _ => Err(InfiniteValue),
        }
    }
}

impl From<time::Time> for Time {
    fn from(t: time::Time) -> Self {
        let since_midnight = t - time::Time::MIDNIGHT;
        Time { micros: since_midnight.whole_microseconds() as i64 }
    }
}

impl TryFrom<Time> for time::Time {
    type Error = InfiniteValue;

    fn try_from(t: Time) -> Result<Self, Self::Error> {
        let (h, rem) = (t.micros / 3_600_000_000, t.micros % 3_600_000_000);
        let (m, rem) = (rem / 60_000_000, rem % 60_000_000);
        let (s, micro) = (rem / 1_000_000, rem % 1_000_000);
        time::Time::from_hms_micro(h as u8, m as u8, s as u8, micro as u32)
            .map_err(|_| InfiniteValue)
    }
}

impl From<PrimitiveDateTime> for Timestamp {
    fn from(dt: PrimitiveDateTime) -> Self {
        Timestamp::Finite((dt - PRIMITIVE_PG_EPOCH).whole_microseconds() as i64)
    }
}

impl TryFrom<Timestamp> for PrimitiveDateTime {
    type Error = InfiniteValue;

    fn try_from(ts: Timestamp) -> Result<Self, Self::Error> {
        match ts {
            Timestamp::Finite(micros) => {
                Ok(PRIMITIVE_PG_EPOCH.saturating_add(Duration::microseconds(micros)))
            }
            _ => Err(InfiniteValue),
        }
    }
}

impl From<UtcDateTime> for Timestamp {
    fn from(dt: UtcDateTime) -> Self {
        Timestamp::Finite((dt - UTC_PG_EPOCH).whole_microseconds() as i64)
    }
}

impl TryFrom<Timestamp> for UtcDateTime {
    type Error = InfiniteValue;

    fn try_from(ts: Timestamp) -> Result<Self, Self::Error> {
        match ts {
            Timestamp::Finite(micros) => {
                Ok(UTC_PG_EPOCH.saturating_add(Duration::microseconds(micros)))
            }
            _ => Err(InfiniteValue),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn epoch_is_day_zero() {
        let epoch = time::Date::from_julian_day(2_451_545).unwrap();
        assert_eq!(Date::from(epoch), Date::Finite(0));
        assert_eq!(time::Date::try_from(Date::Finite(0)).unwrap(), epoch);
    }

    #[test]
    fn timestamp_roundtrip() {
        let dt = PRIMITIVE_PG_EPOCH.saturating_add(Duration::seconds(90));
        let ts = Timestamp::from(dt);
        assert_eq!(ts, Timestamp::Finite(90_000_000));
        assert_eq!(PrimitiveDateTime::try_from(ts).unwrap(), dt);
    }

    #[test]
    fn infinity_has_no_conversion() {
        assert!(time::Date::try_from(Date::PosInfinity).is_err());
        assert!(PrimitiveDateTime::try_from(Timestamp::NegInfinity).is_err());
    }

    #[test]
    fn time_of_day_roundtrip() {
        let t = time::Time::from_hms_micro(13, 37, 5, 250_000).unwrap();
        let wire = Time::from(t);
        assert_eq!(wire.micros, ((13 * 3600 + 37 * 60 + 5) as i64) * 1_000_000 + 250_000);
        assert_eq!(time::Time::try_from(wire).unwrap(), t);
    }
}
