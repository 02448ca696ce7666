use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Identity key for one subscription stream: a channel name plus its
/// argument set.
///
/// Arguments live in a `BTreeMap`, so two topics compare equal regardless of
/// the order their arguments were supplied in, while the wire form
/// (`{"channel": ..., ...args}`) always serializes the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    channel: String,
    args: BTreeMap<String, String>,
}

impl Topic {
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            args: BTreeMap::new(),
        }
    }

    /// Builder-style argument, e.g. `Topic::new("tickers").arg("instId", "BTC-USDT")`.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    /// True when every argument of `self` appears with the same value in
    /// `other`. Used for routing frames whose `arg` object carries extra
    /// server-added keys.
    pub(crate) fn args_subset_of(&self, other: &Self) -> bool {
        self.args
            .iter()
            .all(|(k, v)| other.args.get(k).map(String::as_str) == Some(v.as_str()))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel)?;
        for (k, v) in &self.args {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

impl Serialize for Topic {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.args.len() + 1))?;
        map.serialize_entry("channel", &self.channel)?;
        for (k, v) in &self.args {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TopicVisitor;

        impl<'de> Visitor<'de> for TopicVisitor {
            type Value = Topic;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a channel argument object")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Topic, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut channel = None;
                let mut args = BTreeMap::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    // Non-string values never occur in channel args; skip
                    // them rather than failing the whole envelope.
                    let Some(value) = value.as_str().map(str::to_string) else {
                        continue;
                    };
                    if key == "channel" {
                        channel = Some(value);
                    } else {
                        args.insert(key, value);
                    }
                }
                let channel =
                    channel.ok_or_else(|| serde::de::Error::missing_field("channel"))?;
                Ok(Topic { channel, args })
            }
        }

        deserializer.deserialize_map(TopicVisitor)
    }
}
