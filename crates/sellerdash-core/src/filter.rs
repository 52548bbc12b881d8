use chrono::NaiveDate;

/// Range and equality filters for report queries.
///
/// Date bounds are inclusive and apply to the descriptor's date column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sku: Option<String>,
    pub asin: Option<String>,
}

impl ReportFilter {
    #[must_use]
    pub fn between(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Self::default()
        }
    }

    /// Whether a row with the given date, sku and asin passes the filter.
    #[must_use]
    pub fn matches(&self, date: Option<NaiveDate>, sku: Option<&str>, asin: Option<&str>) -> bool {
        let date_ok = match (date, self.start_date, self.end_date) {
            (None, None, None) => true,
            (None, _, _) => false,
            (Some(d), start, end) => start.is_none_or(|s| d >= s) && end.is_none_or(|e| d <= e),
        };
        let sku_ok = self.sku.as_deref().is_none_or(|want| sku == Some(want));
        let asin_ok = self.asin.as_deref().is_none_or(|want| asin == Some(want));
        date_ok && sku_ok && asin_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let filter = ReportFilter::between(d(2), d(4));
        assert!(!filter.matches(Some(d(1)), None, None));
        assert!(filter.matches(Some(d(2)), None, None));
        assert!(filter.matches(Some(d(4)), None, None));
        assert!(!filter.matches(Some(d(5)), None, None));
    }

    #[test]
    fn sku_and_asin_are_exact() {
        let filter = ReportFilter {
            sku: Some("SKU1".into()),
            ..ReportFilter::default()
        };
        assert!(filter.matches(Some(d(1)), Some("SKU1"), Some("B1")));
        assert!(!filter.matches(Some(d(1)), Some("sku1"), Some("B1")));
        assert!(!filter.matches(Some(d(1)), None, None));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(ReportFilter::default().matches(None, None, None));
        assert!(ReportFilter::default().matches(Some(d(9)), Some("x"), None));
    }
}
