//! The output entity and its exact wire shape.

use crate::ingest::record::{Feature, Observation};
use serde::{Deserialize, Serialize};

/// One flagged observation, annotated and ready for JSON output.
///
/// Field names on the wire follow the reporting contract verbatim,
/// including the historical capitalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub date: String,
    #[serde(rename = "Usage_kWh")]
    pub usage_kwh: f64,
    #[serde(rename = "CO2(tCO2)")]
    pub co2_tco2: f64,
    #[serde(rename = "Lagging_Current_Power_Factor")]
    pub power_factor: f64,
    #[serde(rename = "Anomaly_Label")]
    pub anomaly_label: String,
    #[serde(rename = "FMEA_Diagnosis")]
    pub fmea_diagnosis: String,
    #[serde(rename = "Alert_Level")]
    pub alert_level: u8,
}

impl AnomalyRecord {
    /// Join an observation's identifying fields with its annotation.
    pub fn assemble(
        observation: &Observation,
        anomaly_label: String,
        fmea_diagnosis: String,
        alert_level: u8,
    ) -> Self {
        AnomalyRecord {
            date: observation.formatted_date(),
            usage_kwh: observation.value(Feature::Usage),
            co2_tco2: observation.value(Feature::Emissions),
            power_factor: observation.value(Feature::PowerFactor),
            anomaly_label,
            fmea_diagnosis,
            alert_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_wire_keys_are_exact() {
        let ts = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let obs = Observation::new(ts, [120.5, 0.07, 0.83]);
        let record = AnomalyRecord::assemble(
            &obs,
            "Power Factor Anomaly".to_string(),
            "Poor power factor indicating reactive power issues".to_string(),
            2,
        );

        let value = serde_json::to_value(&record).expect("serialize");
        let object = value.as_object().expect("object");
        assert_eq!(object.len(), 7);
        for key in [
            "date",
            "Usage_kWh",
            "CO2(tCO2)",
            "Lagging_Current_Power_Factor",
            "Anomaly_Label",
            "FMEA_Diagnosis",
            "Alert_Level",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert_eq!(object["date"], "2024-06-01 12:00:00");
        assert_eq!(object["Alert_Level"], 2);
    }
}
