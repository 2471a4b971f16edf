//! WKT <-> GeoJSON conversion for geometry values.

use geozero::geojson::GeoJson;
use geozero::wkt::Wkt;
use geozero::{ToJson, ToWkt};
use serde_json::Value as JsonValue;

use crate::{KairosError, KairosResult};

pub fn wkt_to_geojson(wkt: &str) -> KairosResult<JsonValue> {
    let json = Wkt(wkt)
        .to_json()
        .map_err(|err| KairosError::storage(format!("invalid stored geometry '{wkt}': {err}")))?;
    Ok(serde_json::from_str(&json)?)
}

pub fn geojson_to_wkt(geometry: &JsonValue) -> KairosResult<String> {
    let raw = geometry.to_string();
    GeoJson(&raw)
        .to_wkt()
        .map_err(|err| KairosError::bad_request(format!("invalid GeoJSON geometry: {err}")))
}

/// Accepts a GeoJSON geometry object or a WKT string and returns WKT.
pub fn normalize_geometry(value: &JsonValue) -> KairosResult<String> {
    match value {
        JsonValue::Object(_) => geojson_to_wkt(value),
        JsonValue::String(wkt) => {
            // Re-encode to reject malformed WKT at write time.
            wkt_to_geojson(wkt)
                .map_err(|_| KairosError::bad_request(format!("invalid WKT geometry '{wkt}'")))?;
            Ok(wkt.clone())
        }
        _ => Err(KairosError::bad_request(
            "a geometry must be a GeoJSON object or a WKT string",
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn converts_point_both_ways() {
        let wkt = geojson_to_wkt(&json!({ "type": "Point", "coordinates": [24.30623, 60.07966] }))
            .expect("to wkt");
        assert!(wkt.starts_with("POINT"));
        let geojson = wkt_to_geojson(&wkt).expect("to geojson");
        assert_eq!(geojson["type"], json!("Point"));
        assert_eq!(geojson["coordinates"], json!([24.30623, 60.07966]));
    }

    #[test]
    fn normalizes_wkt_strings() {
        let wkt = normalize_geometry(&json!("POINT(1 2)")).expect("wkt");
        assert_eq!(wkt, "POINT(1 2)");
        assert!(normalize_geometry(&json!("POINT(")).is_err());
        assert!(normalize_geometry(&json!(12)).is_err());
    }
}
