use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::FrappeError;
use crate::types::PricePoint;
use crate::FrappeResult;

/// Percentage change between the first observation on or after `start` and
/// the last observation on or before `end`.
///
/// `points` need not be sorted. A window holding a single observation
/// returns zero.
pub fn period_return(points: &[PricePoint], start: NaiveDate, end: NaiveDate) -> FrappeResult<Decimal> {
    if end < start {
        return Err(FrappeError::Validation {
            field: "end".into(),
            reason: format!("Window end {end} precedes start {start}"),
        });
    }

    let in_window = points.iter().filter(|p| p.date >= start && p.date <= end);
    let first = in_window.clone().min_by_key(|p| p.date);
    let last = in_window.max_by_key(|p| p.date);

    let (first, last) = match (first, last) {
        (Some(f), Some(l)) => (f, l),
        _ => {
            return Err(FrappeError::InsufficientData(format!(
                "No observations between {start} and {end}"
            )))
        }
    };

    if first.price.is_zero() {
        return Err(FrappeError::InsufficientData(format!(
            "Zero price at window start {}",
            first.date
        )));
    }

    Ok((last.price - first.price) / first.price * dec!(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn p(date: NaiveDate, price: Decimal) -> PricePoint {
        PricePoint { date, price }
    }

    #[test]
    fn test_basic_return() {
        let pts = vec![
            p(d(2021, 1, 4), dec!(100)),
            p(d(2021, 2, 1), dec!(105)),
            p(d(2021, 3, 1), dec!(110)),
        ];
        let r = period_return(&pts, d(2021, 1, 1), d(2021, 3, 31)).unwrap();
        assert_eq!(r, dec!(10));
    }

    #[test]
    fn test_boundaries_are_inside_window() {
        let pts = vec![
            p(d(2020, 12, 28), dec!(50)),
            p(d(2021, 1, 4), dec!(100)),
            p(d(2021, 2, 1), dec!(80)),
            p(d(2021, 4, 5), dec!(200)),
        ];
        let r = period_return(&pts, d(2021, 1, 1), d(2021, 3, 31)).unwrap();
        assert_eq!(r, dec!(-20));
    }

    #[test]
    fn test_unsorted_input() {
        let pts = vec![p(d(2021, 3, 1), dec!(90)), p(d(2021, 1, 4), dec!(100))];
        let r = period_return(&pts, d(2021, 1, 1), d(2021, 3, 31)).unwrap();
        assert_eq!(r, dec!(-10));
    }

    #[test]
    fn test_single_observation_is_flat() {
        let pts = vec![p(d(2021, 2, 1), dec!(100))];
        let r = period_return(&pts, d(2021, 1, 1), d(2021, 3, 31)).unwrap();
        assert_eq!(r, Decimal::ZERO);
    }

    #[test]
    fn test_empty_window_is_insufficient() {
        let pts = vec![p(d(2020, 2, 1), dec!(100))];
        let err = period_return(&pts, d(2021, 1, 1), d(2021, 3, 31)).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_zero_start_price() {
        let pts = vec![p(d(2021, 1, 4), dec!(0)), p(d(2021, 2, 1), dec!(10))];
        assert!(matches!(
            period_return(&pts, d(2021, 1, 1), d(2021, 3, 31)),
            Err(FrappeError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        assert!(matches!(
            period_return(&[], d(2021, 3, 1), d(2021, 1, 1)),
            Err(FrappeError::Validation { .. })
        ));
    }
}
