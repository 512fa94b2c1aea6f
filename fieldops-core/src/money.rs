use rust_decimal::Decimal;

use crate::{CoreError, CoreResult};

fn out_of_range(what: &str) -> CoreError {
    CoreError::Validation(format!("{} is out of range", what))
}

/// quantity × unit_price
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> CoreResult<Decimal> {
    quantity
        .checked_mul(unit_price)
        .ok_or_else(|| out_of_range("Line total"))
}

pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> CoreResult<Decimal> {
    values.into_iter().try_fold(Decimal::ZERO, |acc, value| {
        acc.checked_add(value).ok_or_else(|| out_of_range("Sum"))
    })
}

/// `net` plus `percent` percent of it.
pub fn add_percent(net: Decimal, percent: Decimal) -> CoreResult<Decimal> {
    net.checked_mul(percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|extra| net.checked_add(extra))
        .ok_or_else(|| out_of_range("Total"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(Decimal::from(3), Decimal::new(2550, 2)), Ok(Decimal::new(7650, 2)));
    }

    #[test]
    fn test_overflow_is_validation() {
        let err = line_total(Decimal::MAX, Decimal::from(2)).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = checked_sum([Decimal::MAX, Decimal::ONE]).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        assert!(add_percent(Decimal::MAX, Decimal::from(10)).is_err());
    }

    #[test]
    fn test_add_percent() {
        assert_eq!(add_percent(Decimal::from(180), Decimal::from(10)), Ok(Decimal::from(198)));
        assert_eq!(checked_sum([]), Ok(Decimal::ZERO));
    }
}
