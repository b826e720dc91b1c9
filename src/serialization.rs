use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

// CoinCap sends every numeric field as a JSON string ("42000.5"), but
// tolerate plain numbers as well.
fn value_to_f64<E: de::Error>(v: Value) -> Result<Option<f64>, E> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(|_| {
                    E::custom(format!("could not parse f64 from string: {s}"))
                })
            }
        }
        other => Err(E::custom(format!(
            "expected number or string, got: {other}"
        ))),
    }
}

/// Required float. `null` or an empty string is an error.
pub(crate) fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    value_to_f64(v)?.ok_or_else(|| de::Error::custom("expected a number, got null"))
}

/// Nullable float. `null`, a missing key (with `#[serde(default)]`) and an
/// empty string all map to `None`.
pub(crate) fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    match v {
        None => Ok(None),
        Some(v) => value_to_f64(v),
    }
}

/// Integer sent either as a number or as a numeric string.
pub(crate) fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("expected integer, got: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("could not parse integer from string: {s}"))),
        other => Err(de::Error::custom(format!(
            "expected integer or string, got: {other}"
        ))),
    }
}

/// `null` becomes the empty string.
pub(crate) fn de_string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
