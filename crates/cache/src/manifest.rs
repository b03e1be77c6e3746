use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Per-page record of which cached file replaces which stylesheet.
///
/// Stored as `lookup.json` in the page's directory and overwritten as a
/// whole whenever the page is processed again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Absolute stylesheet URL to cached file name.
    #[serde(deserialize_with = "lenient::map")]
    pub lookup: BTreeMap<String, String>,
    pub source_url: String,
    #[serde(default, deserialize_with = "lenient::id")]
    pub post_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub post_types: Vec<String>,
}

impl CacheManifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::InvalidManifest("not a manifest".to_string()))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).or_raise(|| ErrorKind::InvalidManifest("could not serialize".to_string()))
    }

    /// Cached file name for the stylesheet at `url`.
    pub fn get(&self, url: &str) -> Option<&str> {
        self.lookup.get(url).map(String::as_str)
    }
}

/// Manifests written by older releases store an empty lookup as `[]`,
/// numeric post ids, and `null` for missing post types.
mod lenient {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList {
        Map(BTreeMap<String, String>),
        List(Vec<String>),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    pub(super) fn map<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<BTreeMap<String, String>, D::Error> {
        match MapOrList::deserialize(de)? {
            MapOrList::Map(map) => Ok(map),
            MapOrList::List(list) if list.is_empty() => Ok(BTreeMap::new()),
            MapOrList::List(_) => Err(serde::de::Error::custom("lookup must be an object")),
        }
    }

    pub(super) fn id<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Option<String>, D::Error> {
        Ok(Option::<Id>::deserialize(de)?.map(|id| match id {
            Id::Text(text) => text,
            Id::Number(number) => number.to_string(),
        }))
    }

    pub(super) fn list<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Vec<String>, D::Error> {
        Ok(Option::<Vec<String>>::deserialize(de)?.unwrap_or_default())
    }
}
