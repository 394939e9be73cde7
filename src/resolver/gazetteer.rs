use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One row of the static city gazetteer.
#[derive(Debug, Clone)]
pub struct CityRecord {
    pub city: &'static str,
    pub region: &'static str,
    pub country: &'static str,
    pub country_code: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

/// Static gazetteer of cities the resolver recognizes without any external
/// call. Country names are stored the way local listings spell them.
pub static CITIES: &[CityRecord] = &[
    CityRecord { city: "Barcelona", region: "Cataluña", country: "España", country_code: "ES", latitude: 41.3874, longitude: 2.1686 },
    CityRecord { city: "Madrid", region: "Comunidad de Madrid", country: "España", country_code: "ES", latitude: 40.4168, longitude: -3.7038 },
    CityRecord { city: "Valencia", region: "Comunidad Valenciana", country: "España", country_code: "ES", latitude: 39.4699, longitude: -0.3763 },
    CityRecord { city: "Sevilla", region: "Andalucía", country: "España", country_code: "ES", latitude: 37.3891, longitude: -5.9845 },
    CityRecord { city: "Buenos Aires", region: "Ciudad Autónoma", country: "Argentina", country_code: "AR", latitude: -34.6037, longitude: -58.3816 },
    CityRecord { city: "Mendoza", region: "Mendoza", country: "Argentina", country_code: "AR", latitude: -32.8895, longitude: -68.8458 },
    CityRecord { city: "Córdoba", region: "Córdoba", country: "Argentina", country_code: "AR", latitude: -31.4201, longitude: -64.1888 },
    CityRecord { city: "Rosario", region: "Santa Fe", country: "Argentina", country_code: "AR", latitude: -32.9442, longitude: -60.6505 },
    CityRecord { city: "Ciudad de México", region: "CDMX", country: "México", country_code: "MX", latitude: 19.4326, longitude: -99.1332 },
    CityRecord { city: "Berlin", region: "Berlin", country: "Germany", country_code: "DE", latitude: 52.5200, longitude: 13.4050 },
    CityRecord { city: "München", region: "Bayern", country: "Germany", country_code: "DE", latitude: 48.1351, longitude: 11.5820 },
    CityRecord { city: "London", region: "England", country: "United Kingdom", country_code: "GB", latitude: 51.5074, longitude: -0.1278 },
    CityRecord { city: "Manchester", region: "England", country: "United Kingdom", country_code: "GB", latitude: 53.4808, longitude: -2.2426 },
    CityRecord { city: "Paris", region: "Île-de-France", country: "France", country_code: "FR", latitude: 48.8566, longitude: 2.3522 },
    CityRecord { city: "Lisboa", region: "Lisboa", country: "Portugal", country_code: "PT", latitude: 38.7223, longitude: -9.1393 },
    CityRecord { city: "Seattle", region: "Washington", country: "United States", country_code: "US", latitude: 47.6062, longitude: -122.3321 },
    CityRecord { city: "New York", region: "New York", country: "United States", country_code: "US", latitude: 40.7128, longitude: -74.0060 },
    CityRecord { city: "San Francisco", region: "California", country: "United States", country_code: "US", latitude: 37.7749, longitude: -122.4194 },
    CityRecord { city: "Austin", region: "Texas", country: "United States", country_code: "US", latitude: 30.2672, longitude: -97.7431 },
    CityRecord { city: "Toronto", region: "Ontario", country: "Canada", country_code: "CA", latitude: 43.6532, longitude: -79.3832 },
];

/// O(1) alias table, checked before any gazetteer scan or external call.
pub static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("bcn", "Barcelona");
    m.insert("nyc", "New York");
    m.insert("ny", "New York");
    m.insert("sf", "San Francisco");
    m.insert("cdmx", "Ciudad de México");
    m.insert("df", "Ciudad de México");
    m.insert("bsas", "Buenos Aires");
    m.insert("baires", "Buenos Aires");
    m.insert("caba", "Buenos Aires");
    m.insert("ldn", "London");
    m
});

/// Exact lookup by canonical city name, case-insensitive.
pub fn find_city(name: &str) -> Option<&'static CityRecord> {
    let needle = name.trim().to_lowercase();
    CITIES.iter().find(|c| c.city.to_lowercase() == needle)
}

/// Scan a lowercased query for any known city name.
/// Longer names are tried first so "San Francisco" beats "Francisco".
pub fn scan_query(query_lower: &str) -> Option<&'static CityRecord> {
    let mut by_len: Vec<&CityRecord> = CITIES.iter().collect();
    by_len.sort_by_key(|c| std::cmp::Reverse(c.city.len()));
    by_len
        .into_iter()
        .find(|c| query_lower.contains(&c.city.to_lowercase()))
}

/// City-scale distance in kilometers. ~111km per degree latitude; the
/// longitude factor shrinks with latitude.
pub fn distance_km(a: &CityRecord, b: &CityRecord) -> f64 {
    coord_distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

pub fn coord_distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let lat_diff = (lat_a - lat_b) * 111.0;
    let mid_lat = ((lat_a + lat_b) / 2.0).to_radians();
    let lng_diff = (lon_a - lon_b) * 111.0 * mid_lat.cos();
    (lat_diff * lat_diff + lng_diff * lng_diff).sqrt()
}

/// Closest known city to a coordinate pair, for lat/lon location hints.
pub fn nearest_to(lat: f64, lon: f64) -> Option<&'static CityRecord> {
    CITIES.iter().min_by(|a, b| {
        let da = coord_distance_km(lat, lon, a.latitude, a.longitude);
        let db = coord_distance_km(lat, lon, b.latitude, b.longitude);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    })
}
