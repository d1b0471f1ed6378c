use serde::{Serialize, de::DeserializeOwned};

use crate::common::{ByteStr, unit_error};
use crate::value::Value;

unit_error! {
    /// The value does not carry json.
    pub struct NotJson("value is not json");
}

/// Serde wrapper over the json and jsonb codecs.
///
/// ```no_run
/// use postwire::types::Json;
/// # #[derive(serde::Serialize, serde::Deserialize)]
/// # struct Payload { id: u32 }
/// # fn app(row_value: postwire::Value) -> Result<(), Box<dyn std::error::Error>> {
/// let arg = Json(Payload { id: 7 }).to_value()?;
/// let back: Json<Payload> = Json::from_value(&row_value)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> Json<T> {
    /// Serialize into a bindable [`Value::Json`].
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        Ok(Value::Json(ByteStr::from(serde_json::to_string(&self.0)?)))
    }
}

impl<T: DeserializeOwned> Json<T> {
    /// Deserialize out of a decoded json, jsonb or text value.
    pub fn from_value(value: &Value) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let text = value.as_str().ok_or(NotJson)?;
        Ok(Json(serde_json::from_str(text)?))
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Payload {
        id: u32,
        tag: String,
    }

    #[test]
    fn json_value_roundtrip() {
        let value = Json(Payload { id: 7, tag: "x".into() }).to_value().unwrap();
        assert!(matches!(value, Value::Json(_)));
        let back: Json<Payload> = Json::from_value(&value).unwrap();
        assert_eq!(back.0, Payload { id: 7, tag: "x".into() });
    }

    #[test]
    fn non_json_is_refused() {
        assert!(Json::<Payload>::from_value(&Value::Int4(1)).is_err());
    }
}
