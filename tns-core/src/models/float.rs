/// (De)serialization for floats that may legitimately be infinite.
///
/// Marginal prices of hard-limit vertices are `±∞`, which JSON cannot express
/// as a number (`serde_json` would silently write `null`). Infinite values are
/// therefore written as the strings `"inf"` and `"-inf"`, while finite values
/// remain plain numbers. Deserialization accepts either form.
pub mod extended {
    use serde::{Deserializer, Serializer};

    /// Serialize a float, writing infinities as strings
    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    /// Deserialize a float from a number or one of the infinity spellings
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        serde_untagged::UntaggedEnumVisitor::new()
            .f64(Ok)
            .i64(|x| Ok(x as f64))
            .u64(|x| Ok(x as f64))
            .string(|s| parse(s).ok_or_else(|| serde::de::Error::custom(format!("not a number: {s}"))))
            .deserialize(deserializer)
    }

    fn parse(raw: &str) -> Option<f64> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
            "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Price(#[serde(with = "super::extended")] f64);

    #[test]
    fn infinity_survives_json() {
        let raw = serde_json::to_string(&Price(f64::INFINITY)).unwrap();
        assert_eq!(raw, r#""inf""#);
        assert_eq!(serde_json::from_str::<Price>(&raw).unwrap(), Price(f64::INFINITY));
        assert_eq!(
            serde_json::from_str::<Price>(r#""-inf""#).unwrap(),
            Price(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn finite_values_stay_numeric() {
        assert_eq!(serde_json::to_string(&Price(0.25)).unwrap(), "0.25");
        assert_eq!(serde_json::from_str::<Price>("3").unwrap(), Price(3.0));
        assert!(serde_json::from_str::<Price>(r#""cheap""#).is_err());
    }
}
