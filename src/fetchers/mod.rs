pub mod open_meteo;

pub use open_meteo::{Fetcher, ForecastPayload, OpenMeteoClient};
