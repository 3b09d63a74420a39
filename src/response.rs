//! JSON shapes handed to the serving layer.

use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::pipeline::TextRegion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBoxJson {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
    /// Corners clockwise from top-left, as `[x, y]`.
    pub points: [[i32; 2]; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionJson {
    pub text: String,
    pub confidence: f32,
    pub bbox: BBoxJson,
}

impl From<&TextRegion> for RegionJson {
    fn from(region: &TextRegion) -> Self {
        // Coordinates truncate toward zero; extremes come from the truncated corners.
        let points = region.quad.points.map(|p| [p.x as i32, p.y as i32]);
        let xs = points.map(|p| p[0]);
        let ys = points.map(|p| p[1]);
        let bbox = BBoxJson {
            xmin: xs.iter().copied().min().unwrap_or(0),
            ymin: ys.iter().copied().min().unwrap_or(0),
            xmax: xs.iter().copied().max().unwrap_or(0),
            ymax: ys.iter().copied().max().unwrap_or(0),
            points,
        };
        Self {
            text: region.text.clone(),
            confidence: region.confidence,
            bbox,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrData {
    pub text_count: usize,
    pub results: Vec<RegionJson>,
}

impl OcrData {
    pub fn from_regions(regions: &[TextRegion]) -> Self {
        let results: Vec<RegionJson> = regions.iter().map(RegionJson::from).collect();
        Self {
            text_count: results.len(),
            results,
        }
    }
}

/// `{"success": true, "data": {...}}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<OcrData>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl OcrResponse {
    pub fn ok(regions: &[TextRegion]) -> Self {
        Self {
            success: true,
            data: Some(OcrData::from_regions(regions)),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn from_result(result: &Result<Vec<TextRegion>, OcrError>) -> Self {
        match result {
            Ok(regions) => Self::ok(regions),
            Err(e) => Self::err(e.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String, OcrError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, OcrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::EngineError;
    use crate::geometry::{Point2f, QuadBox};

    fn region() -> TextRegion {
        TextRegion {
            quad: QuadBox::new([
                Point2f::new(10.7, 5.2),
                Point2f::new(50.9, 6.8),
                Point2f::new(50.1, 20.5),
                Point2f::new(9.9, 19.0),
            ]),
            text: "hello".to_string(),
            confidence: 0.875,
        }
    }

    #[test]
    fn test_region_json_truncates_coordinates() {
        let json = RegionJson::from(&region());
        assert_eq!(json.bbox.points, [[10, 5], [50, 6], [50, 20], [9, 19]]);
        assert_eq!((json.bbox.xmin, json.bbox.ymin), (9, 5));
        assert_eq!((json.bbox.xmax, json.bbox.ymax), (50, 20));
    }

    #[test]
    fn test_success_envelope() {
        let value = serde_json::to_value(OcrResponse::ok(&[region()])).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"]["text_count"], json!(1));
        assert_eq!(value["data"]["results"][0]["text"], json!("hello"));
        assert_eq!(value["data"]["results"][0]["bbox"]["xmax"], json!(50));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_empty_result_is_success() {
        let value = serde_json::to_value(OcrResponse::from_result(&Ok(Vec::new()))).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"]["text_count"], json!(0));
    }

    #[test]
    fn test_compact_json_is_one_line() {
        let text = OcrResponse::ok(&[region()]).to_json().unwrap();
        assert!(!text.contains('\n'));
        assert!(text.starts_with(r#"{"success":true"#));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["results"][0]["confidence"], json!(0.875));
    }

    #[test]
    fn test_error_envelope() {
        let failed: Result<Vec<TextRegion>, OcrError> =
            Err(EngineError::Inference("shape mismatch".to_string()).into());
        let value = serde_json::to_value(OcrResponse::from_result(&failed)).unwrap();
        assert_eq!(value["success"], json!(false));
        assert!(value["error"].as_str().unwrap().contains("shape mismatch"));
        assert!(value.get("data").is_none());
    }
}
