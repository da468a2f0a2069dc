// geo_utils.rs
use reqwest::Client;
use serde_json::Value;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Default public boundary file: Colombian departments as GeoJSON.
pub const DEFAULT_BOUNDARIES_URL: &str =
    "https://raw.githubusercontent.com/caticoa3/colombia_mapa/master/co_2018_MGN_DPTO_POLITICO.geojson";

/// Where and how often to fetch the boundary reference.
#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub url: String,
    pub cache_minutes: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            url: DEFAULT_BOUNDARIES_URL.to_string(),
            cache_minutes: 24 * 60,
        }
    }
}

/// One named boundary polygon. The geometry is passed through untouched; only the
/// chart layer interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoBoundary {
    pub name: String,
    pub geometry: Value,
}

/// Extracts named boundaries from a GeoJSON feature collection. Features without a
/// recognizable name property are skipped with a warning.
pub fn parse_boundaries(raw: &str) -> Result<Vec<GeoBoundary>, Box<dyn Error>> {
    let value: Value = serde_json::from_str(raw)?;
    let features = value["features"]
        .as_array()
        .ok_or("Boundary file is missing the 'features' array")?;

    let mut boundaries = Vec::with_capacity(features.len());
    for feature in features {
        let properties = &feature["properties"];
        let name = ["NOMBRE_DPT", "DPTO_CNMBR", "name"]
            .iter()
            .find_map(|key| properties[*key].as_str());
        match name {
            Some(name) => boundaries.push(GeoBoundary {
                name: name.to_string(),
                geometry: feature["geometry"].clone(),
            }),
            None => eprintln!("Skipping boundary feature without a name property"),
        }
    }
    Ok(boundaries)
}

fn cache_file_path(url: &str) -> Result<PathBuf, Box<dyn Error>> {
    let cache_dir = dirs::home_dir()
        .ok_or("Could not find home directory")?
        .join(".attriml")
        .join("cache");
    if !cache_dir.exists() {
        fs::create_dir_all(&cache_dir)?;
    }
    let stem: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    Ok(cache_dir.join(format!("geo_{}.json", stem)))
}

fn cached_body(path: &PathBuf, cache_minutes: u64) -> Option<String> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    let age = modified.elapsed().ok()?;
    if age.as_secs() / 60 < cache_minutes {
        fs::read_to_string(path).ok()
    } else {
        None
    }
}

/// Connector for the geographic reference file.
pub struct GeoConnect;

impl GeoConnect {
    /// Fetches the boundary reference, serving it from the on-disk cache while the
    /// cached copy is younger than `cache_minutes`. A fetch failure is reported to
    /// the caller; the dependent map view degrades, nothing else does.
    pub async fn fetch_boundaries(config: &GeoConfig) -> Result<Vec<GeoBoundary>, Box<dyn Error>> {
        let cache_path = cache_file_path(&config.url)?;
        if let Some(body) = cached_body(&cache_path, config.cache_minutes) {
            return parse_boundaries(&body);
        }

        let client = Client::new();
        let response = client.get(&config.url).send().await?;
        if !response.status().is_success() {
            return Err(format!(
                "Boundary fetch failed with status {}",
                response.status()
            )
            .into());
        }
        let body = response.text().await?;
        let boundaries = parse_boundaries(&body)?;
        fs::write(&cache_path, &body)?;
        Ok(boundaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_features_and_skips_anonymous_ones() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "properties": {"NOMBRE_DPT": "ATLANTICO"},
                    "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0]]]}
                },
                {
                    "properties": {"name": "BOLIVAR"},
                    "geometry": {"type": "Polygon", "coordinates": [[[1.0, 1.0]]]}
                },
                {
                    "properties": {"codigo": 99},
                    "geometry": {"type": "Polygon", "coordinates": [[[2.0, 2.0]]]}
                }
            ]
        }"#;
        let boundaries = parse_boundaries(raw).unwrap();
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].name, "ATLANTICO");
        assert_eq!(boundaries[1].name, "BOLIVAR");
        assert_eq!(boundaries[0].geometry["type"], "Polygon");
    }

    #[test]
    fn missing_features_array_is_an_error() {
        assert!(parse_boundaries(r#"{"type": "FeatureCollection"}"#).is_err());
    }
}
