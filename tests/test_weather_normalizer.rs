mod common;

use chrono::{Duration, NaiveDate};
use common::{forecast_window_response, hourly_response, init_logging, now, FakeWeather};
use hydrosat::core::weather::{current_weather, daily_forecast};
use hydrosat::core::WeatherNormalizer;
use hydrosat::io::open_meteo::{requested_forecast_days, SeriesBlock};
use hydrosat::io::{WeatherField, WeatherResponse};
use hydrosat::Reported;

#[test]
fn test_current_picks_latest_sample_not_after_now() {
    init_logging();
    let t = now().timestamp();
    let times = vec![t - 7200, t - 3600, t + 3600];
    let variables = WeatherField::ALL
        .iter()
        .map(|f| (f.api_name().to_string(), vec![Some(1.0), Some(2.0), Some(3.0)]))
        .collect();
    let response = WeatherResponse {
        hourly: Some(SeriesBlock { time: times, variables }),
        ..Default::default()
    };

    let current = current_weather(&response, now()).available().expect("Current weather missing");
    assert_eq!(current.time, now() - Duration::hours(1));
    assert_eq!(current.temperature_2m, 2.0);
    assert_eq!(current.evapotranspiration, 2.0);
    assert!(current.is_complete());
}

#[test]
fn test_forecast_has_one_entry_per_day_from_next_midnight() {
    init_logging();
    // Series starts two days back, like a forecast request with past_days
    let start = now() - Duration::days(2);
    let response = hourly_response(start, 24 * 10, 0.25);

    let days = daily_forecast(&response, now(), 7).available().expect("Forecast missing");
    assert_eq!(days.len(), 7);
    assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 5, 9).unwrap());
    assert_eq!(days[6].date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
    for day in &days {
        assert!(day.is_complete(), "{} defaulted {:?}", day.date, day.defaulted);
        assert!((day.precipitation_total_mm - 6.0).abs() < 1e-9);
        assert!((day.temperature_mean_c - 0.25).abs() < 1e-12);
    }
}

#[test]
fn test_failed_request_is_unavailable() {
    init_logging();
    let weather = FakeWeather::new(None, None);
    let report = WeatherNormalizer::new(&weather).report(now());
    assert_eq!(report.current, Reported::Unavailable);
    assert_eq!(report.forecast, Reported::Unavailable);
}

#[test]
fn test_report_uses_configured_horizon() {
    init_logging();
    let mut weather = FakeWeather::new(Some(hourly_response(now() - Duration::hours(3), 24 * 5, 1.0)), None);
    weather.forecast_days = 3;

    let report = WeatherNormalizer::new(&weather).report(now());
    assert!(report.current.is_available());
    match report.forecast {
        Reported::Available(days) => {
            assert_eq!(days.len(), 3);
            assert!(days.iter().all(|d| d.is_complete()));
        }
        Reported::Unavailable => panic!("forecast should be available"),
    }
}

#[test]
fn test_forecast_complete_over_requested_api_window() {
    init_logging();
    let mut weather = FakeWeather::new(None, None);
    let requested = requested_forecast_days(weather.forecast_days);
    weather.forecast = Some(forecast_window_response(now(), weather.past_days, requested, 0.5));

    let report = WeatherNormalizer::new(&weather).report(now());
    let days = report.forecast.available().expect("Forecast missing");
    assert_eq!(days.len(), 7);
    assert_eq!(days[6].date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
    for day in &days {
        assert!(day.is_complete(), "{} defaulted {:?}", day.date, day.defaulted);
        assert!((day.precipitation_total_mm - 12.0).abs() < 1e-9);
    }

    // Asking only for the horizon leaves the last bucket without samples
    let short = forecast_window_response(now(), weather.past_days, weather.forecast_days, 0.5);
    let days = daily_forecast(&short, now(), weather.forecast_days).available().expect("Forecast missing");
    assert!(!days[6].is_complete());
}
