use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

/// One day of forecast, in the wire shape the endpoint returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyForecast {
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(rename = "temperatureC")]
    pub temperature_c: i16,
    pub summary: String,
}

/// Source of forecast data behind the `/weather-forecast` endpoint.
pub trait WeatherForecaster: Send + Sync {
    fn forecast(&self) -> Vec<DailyForecast>;
}

const SUMMARIES: &[&str] = &[
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

/// Default forecaster: five days of random weather starting tomorrow.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleForecaster;

impl WeatherForecaster for SampleForecaster {
    fn forecast(&self) -> Vec<DailyForecast> {
        let today = OffsetDateTime::now_utc().date();
        let mut rng = rand::rng();

        (1..=5)
            .map(|day| DailyForecast {
                date: today + Duration::days(day),
                temperature_c: rng.random_range(-20..=55),
                summary: SUMMARIES[rng.random_range(0..SUMMARIES.len())].to_string(),
            })
            .collect()
    }
}

mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use time::Date;
    use time::macros::format_description;

    const FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
        format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).map_err(serde::ser::Error::custom)?)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let s = String::deserialize(deserializer)?;
        Date::parse(&s, FORMAT).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_forecast_is_five_future_days_in_range() {
        let today = OffsetDateTime::now_utc().date();
        let forecast = SampleForecaster.forecast();

        assert_eq!(forecast.len(), 5);
        for (i, day) in forecast.iter().enumerate() {
            assert_eq!(day.date, today + Duration::days(i as i64 + 1));
            assert!((-20..=55).contains(&day.temperature_c));
            assert!(SUMMARIES.contains(&day.summary.as_str()));
        }
    }

    #[test]
    fn forecast_serializes_in_wire_shape() {
        let day = DailyForecast {
            date: Date::from_calendar_date(2026, time::Month::August, 7).unwrap(),
            temperature_c: 21,
            summary: "Mild".into(),
        };
        assert_eq!(
            serde_json::to_string(&day).unwrap(),
            r#"{"date":"2026-08-07","temperatureC":21,"summary":"Mild"}"#
        );
        let parsed: DailyForecast = serde_json::from_str(
            r#"{"date":"2026-08-07","temperatureC":21,"summary":"Mild"}"#,
        )
        .unwrap();
        assert_eq!(parsed, day);
    }
}
