use pipecall_peer::{encode_payload, RawValue};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// Envelope addressing one method through a [`Router`](crate::Router).
///
/// Sent as the payload of an ordinary endpoint call.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoutedRequest {
    #[serde(rename = "type", default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
}

/// Build a [`RoutedRequest`] for `method`, serializing `value` as its payload.
pub fn new_request<T: Serialize + ?Sized>(method: &str, value: &T) -> Result<RoutedRequest> {
    if method.is_empty() {
        return Err(RouterError::EmptyMethod);
    }
    let payload = encode_payload(value).map_err(RouterError::Payload)?;
    Ok(RoutedRequest {
        method: method.to_string(),
        payload: Some(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_type_field() {
        let req = new_request("ping", &json!({ "text": "x" })).unwrap();
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"type":"ping","payload":{"text":"x"}}"#
        );
    }

    #[test]
    fn empty_method_is_rejected() {
        assert!(matches!(
            new_request("", &()),
            Err(RouterError::EmptyMethod)
        ));
    }

    #[test]
    fn null_and_missing_payload_decode_to_none() {
        let missing: RoutedRequest = serde_json::from_str(r#"{"type":"a"}"#).unwrap();
        assert!(missing.payload.is_none());

        let null: RoutedRequest = serde_json::from_str(r#"{"type":"a","payload":null}"#).unwrap();
        assert!(null.payload.is_none());
    }

    #[test]
    fn missing_type_decodes_to_empty_method() {
        let req: RoutedRequest = serde_json::from_str(r#"{"payload":1}"#).unwrap();
        assert!(req.method.is_empty());
    }
}
