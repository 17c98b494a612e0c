use crate::document::WeatherSettings;
use crate::error::{IronDashError, Result};
use serde::{Deserialize, Serialize};

/// Current conditions shown by the weather widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub temperature: f64,
    pub units: String,
    pub wind_speed: f64,
    /// WMO weather interpretation code
    pub weather_code: u16,
    pub is_day: bool,
    pub observed_at: String,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: u16,
    #[serde(default)]
    is_day: u8,
    #[serde(default)]
    time: String,
}

/// Request URL for the configured location; also the cache key for the report.
///
/// # Errors
///
/// Returns a validation error if `api` is not a valid URL.
pub fn forecast_url(api: &str, settings: &WeatherSettings) -> Result<String> {
    let unit = if settings.units.eq_ignore_ascii_case("fahrenheit") {
        "fahrenheit"
    } else {
        "celsius"
    };
    let url = url::Url::parse_with_params(
        api,
        &[
            ("latitude", settings.latitude.to_string()),
            ("longitude", settings.longitude.to_string()),
            ("current_weather", "true".to_string()),
            ("temperature_unit", unit.to_string()),
        ],
    )
    .map_err(|e| IronDashError::Validation(format!("Invalid weather API URL: {e}")))?;
    Ok(url.into())
}

/// Fetch the current conditions from a forecast endpoint.
///
/// # Errors
///
/// Returns [`IronDashError::Upstream`] if the request fails or the response
/// does not contain current conditions.
pub async fn fetch_weather(client: &reqwest::Client, url: &str, units: &str) -> Result<WeatherReport> {
    let body = crate::content::fetch_text(client, url).await?;
    let forecast: ForecastResponse = serde_json::from_str(&body)
        .map_err(|e| IronDashError::Upstream(format!("Unexpected weather response: {e}")))?;
    let current = forecast.current_weather;

    Ok(WeatherReport {
        temperature: current.temperature,
        units: units.to_string(),
        wind_speed: current.windspeed,
        weather_code: current.weathercode,
        is_day: current.is_day == 1,
        observed_at: current.time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_url_includes_location_and_units() {
        let settings = WeatherSettings {
            enabled: true,
            latitude: 52.52,
            longitude: 13.41,
            units: "Fahrenheit".to_string(),
        };
        let url = forecast_url("https://api.open-meteo.com/v1/forecast", &settings).unwrap();

        assert!(url.starts_with("https://api.open-meteo.com/v1/forecast?"));
        assert!(url.contains("latitude=52.52"));
        assert!(url.contains("longitude=13.41"));
        assert!(url.contains("current_weather=true"));
        assert!(url.contains("temperature_unit=fahrenheit"));
    }

    #[test]
    fn test_forecast_url_rejects_bad_base() {
        let err = forecast_url("not a url", &WeatherSettings::default()).unwrap_err();
        assert!(matches!(err, IronDashError::Validation(_)));
    }
}
