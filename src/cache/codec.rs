//! External serialization boundary for the disk tier.
//!
//! The disk tier never assumes a wire format for `V`; callers supply a
//! [`ValueCodec`]. [`JsonCodec`] is provided as the default/example
//! implementation.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

pub trait ValueCodec<V>: Send + Sync {
    fn encode(&self, value: &V) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<V>;
}

#[derive(Debug, Default)]
pub struct JsonCodec<V>(PhantomData<V>);

impl<V> JsonCodec<V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V: Serialize + DeserializeOwned + Send + Sync> ValueCodec<V> for JsonCodec<V> {
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}
