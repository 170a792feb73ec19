// src/extractors/number.rs

/// Coerces a free-text table cell into a price.
/// Thousands separators and whitespace are removed before conversion;
/// anything that is still not a finite number becomes `None`.
pub fn parse_price(cell: Option<&str>) -> Option<f64> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }

    let cleaned: String = cell
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_cells_have_no_value() {
        assert_eq!(parse_price(None), None);
        assert_eq!(parse_price(Some("")), None);
        assert_eq!(parse_price(Some("   ")), None);
        assert_eq!(parse_price(Some("\n\t")), None);
    }

    #[test]
    fn test_thousands_separator_and_spacing() {
        assert_eq!(parse_price(Some("1,234.50")), Some(1234.5));
        assert_eq!(parse_price(Some(" 1 234 ")), Some(1234.0));
        assert_eq!(parse_price(Some("850")), Some(850.0));
    }

    #[test]
    fn test_non_numeric_text_is_absorbed() {
        assert_eq!(parse_price(Some("N/A")), None);
        assert_eq!(parse_price(Some("-")), None);
        assert_eq!(parse_price(Some("nan")), None);
        assert_eq!(parse_price(Some("inf")), None);
    }
}
