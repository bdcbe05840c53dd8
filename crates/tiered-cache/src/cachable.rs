//! Conversion of typed values to and from cached payload bytes

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can be stored as a cache payload
pub trait Cachable: Sized {
    fn to_cache_bytes(&self) -> Result<Vec<u8>>;

    fn from_cache_bytes(bytes: &[u8]) -> Result<Self>;
}

impl Cachable for Vec<u8> {
    fn to_cache_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn from_cache_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

/// Invalid UTF-8 is replaced rather than rejected.
impl Cachable for String {
    fn to_cache_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn from_cache_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Stores any serde value as JSON
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Cachable for Json<T>
where
    T: Serialize + DeserializeOwned,
{
    fn to_cache_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn from_cache_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}
