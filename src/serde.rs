use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::{self, value::MapAccessDeserializer, MapAccess, Unexpected, Visitor};
use serde::{Deserialize, Deserializer};
use void::Void;

/// Deserializes a topology host entry written either as a bare host string
/// (`worker1`) or as a mapping (`{host: worker1, port: 2222}`).
/// https://serde.rs/string-or-struct.html
pub fn host_or_mapping<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Deserialize<'de> + FromStr<Err = Void>,
    D: Deserializer<'de>,
{
    struct HostOrMapping<T>(PhantomData<fn() -> T>);

    impl<'de, T> Visitor<'de> for HostOrMapping<T>
    where
        T: Deserialize<'de> + FromStr<Err = Void>,
    {
        type Value = T;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a host string or a mapping with a 'host' key")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if value.trim().is_empty() {
                return Err(E::invalid_value(Unexpected::Str(value), &self));
            }
            T::from_str(value.trim()).map_err(|v| void::unreachable(v))
        }

        fn visit_map<M>(self, map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            Deserialize::deserialize(MapAccessDeserializer::new(map))
        }
    }

    deserializer.deserialize_any(HostOrMapping(PhantomData))
}
