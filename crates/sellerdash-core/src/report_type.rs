use serde::{Deserialize, Serialize};

use crate::CoreError;

/// The closed set of Seller Central exports the system ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Business,
    Advertising,
    Inventory,
    Returns,
}

impl ReportType {
    pub const ALL: [ReportType; 4] = [
        ReportType::Business,
        ReportType::Advertising,
        ReportType::Inventory,
        ReportType::Returns,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Business => "business",
            ReportType::Advertising => "advertising",
            ReportType::Inventory => "inventory",
            ReportType::Returns => "returns",
        }
    }

    /// Name of the table holding persisted rows of this type.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            ReportType::Business => "business_reports",
            ReportType::Advertising => "advertising_reports",
            ReportType::Inventory => "inventory_reports",
            ReportType::Returns => "return_reports",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportType {
    type Err = CoreError;

    /// Accepts the short names and the legacy `*_report` spellings,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "business" | "business_report" => Ok(ReportType::Business),
            "advertising" | "advertising_report" => Ok(ReportType::Advertising),
            "inventory" | "inventory_report" => Ok(ReportType::Inventory),
            "returns" | "return" | "return_report" | "returns_report" => Ok(ReportType::Returns),
            _ => Err(CoreError::UnknownReportType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_legacy_names() {
        assert_eq!("business".parse::<ReportType>().unwrap(), ReportType::Business);
        assert_eq!(
            "Advertising_Report".parse::<ReportType>().unwrap(),
            ReportType::Advertising
        );
        assert_eq!("return_report".parse::<ReportType>().unwrap(), ReportType::Returns);
        assert_eq!(" INVENTORY ".parse::<ReportType>().unwrap(), ReportType::Inventory);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = "orders".parse::<ReportType>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownReportType(ref s) if s == "orders"));
    }

    #[test]
    fn display_matches_as_str() {
        for report_type in ReportType::ALL {
            assert_eq!(report_type.to_string(), report_type.as_str());
            assert_eq!(report_type.as_str().parse::<ReportType>().unwrap(), report_type);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ReportType::Returns).unwrap();
        assert_eq!(json, "\"returns\"");
    }
}
