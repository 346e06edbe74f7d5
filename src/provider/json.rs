//! JSON parsing helper for provider responses.

use anyhow::Result;

/// Parse JSON, reporting the serde path of the failing field on error so a
/// provider contract drift is diagnosable from a single log line.
pub fn parse_json_with_path<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.inner();
        if path.is_empty() || path == "." {
            anyhow::anyhow!("{inner}")
        } else {
            anyhow::anyhow!("at '{path}': {inner}")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Fare {
        code: String,
        #[serde(rename = "priceMinor")]
        price_minor: u64,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Reply {
        fares: Vec<Fare>,
    }

    #[test]
    fn reports_path_of_failing_field() {
        let body = r#"{"fares": [{"code": "FLY", "priceMinor": null}]}"#;
        let err = parse_json_with_path::<Reply>(body).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("fares[0].priceMinor"), "got: {msg}");
    }

    #[test]
    fn valid_body_parses() {
        let body = r#"{"fares": [{"code": "FLY", "priceMinor": 19900}]}"#;
        let reply = parse_json_with_path::<Reply>(body).unwrap();
        assert_eq!(reply.fares.len(), 1);
    }
}
