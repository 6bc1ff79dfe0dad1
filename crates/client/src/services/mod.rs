mod weather;

pub use weather::WeatherForecastService;
