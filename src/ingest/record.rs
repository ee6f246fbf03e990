use chrono::NaiveDateTime;

/// Number of tracked measurements per observation.
pub const FEATURE_COUNT: usize = 3;

/// The tracked measurements, in canonical column order.
///
/// The order is fixed for an entire run so per-row score vectors stay
/// aligned across strategies, and it doubles as the tie-break order
/// when two features deviate equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Usage,
    Emissions,
    PowerFactor,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [Feature::Usage, Feature::Emissions, Feature::PowerFactor];

    /// CSV column name for this measurement.
    pub fn column_name(self) -> &'static str {
        match self {
            Feature::Usage => "usage_kwh",
            Feature::Emissions => "co2_tco2",
            Feature::PowerFactor => "power_factor",
        }
    }

    /// Anomaly label emitted when this feature is the primary issue.
    pub fn anomaly_label(self) -> &'static str {
        match self {
            Feature::Usage => "Energy Consumption Anomaly",
            Feature::Emissions => "CO2 Emissions Anomaly",
            Feature::PowerFactor => "Power Factor Anomaly",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Feature::Usage => 0,
            Feature::Emissions => 1,
            Feature::PowerFactor => 2,
        }
    }
}

/// One cleaned input row: a timestamp plus a numeric value for every
/// tracked feature, ordered as [`Feature::ALL`].
///
/// Constructed once during ingestion (after coercion and mean
/// imputation) and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub values: [f64; FEATURE_COUNT],
}

impl Observation {
    pub fn new(timestamp: NaiveDateTime, values: [f64; FEATURE_COUNT]) -> Self {
        Observation { timestamp, values }
    }

    pub fn value(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    /// Timestamp formatted the way the output contract expects.
    pub fn formatted_date(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_canonical_order() {
        assert_eq!(Feature::ALL[0].column_name(), "usage_kwh");
        assert_eq!(Feature::ALL[1].column_name(), "co2_tco2");
        assert_eq!(Feature::ALL[2].column_name(), "power_factor");
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
        }
    }

    #[test]
    fn test_date_format() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let obs = Observation::new(ts, [1.0, 2.0, 3.0]);
        assert_eq!(obs.formatted_date(), "2024-03-05 14:30:00");
    }
}
