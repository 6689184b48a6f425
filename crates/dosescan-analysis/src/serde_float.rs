//! Serde adapters for `f64` fields that may hold NaN or infinities.
//!
//! JSON has no representation for non-finite numbers, so they are written as
//! the strings `"NaN"`, `"inf"` and `"-inf"` and read back losslessly.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Text(String),
}

impl Repr {
    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            Repr::Number(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                _ => Err(E::custom(format!("invalid number: {s:?}"))),
            },
        }
    }
}

struct Float(f64);

impl Serialize for Float {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

#[expect(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Float(*value).serialize(serializer)
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Repr::deserialize(deserializer)?.into_f64()
}

pub(crate) mod option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Float, Repr};

    #[expect(clippy::ref_option)]
    pub(crate) fn serialize<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(Float).serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Repr>::deserialize(deserializer)?
            .map(Repr::into_f64)
            .transpose()
    }
}

pub(crate) mod vec {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Float, Repr};

    pub(crate) fn serialize<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|&v| Float(v)))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(Repr::into_f64)
            .collect()
    }
}

/// Replicate vectors where NaN marks a missing value, written as `null`.
pub(crate) mod missing {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Float, Repr};

    pub(crate) fn serialize<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|&v| (!v.is_nan()).then_some(Float(v))))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Option<Repr>>::deserialize(deserializer)?
            .into_iter()
            .map(|v| v.map_or(Ok(f64::NAN), Repr::into_f64))
            .collect()
    }
}
