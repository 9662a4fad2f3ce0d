// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Codecs
//!
//! A codec turns a typed value into message bytes plus the content-type tag that
//! travels with them, and turns bytes back into a typed value. Two codecs are
//! provided: [`JsonCodec`] for interoperable text payloads and [`BitcodeCodec`]
//! for compact binary payloads. The two are not cross-compatible; a queue is
//! expected to carry a single encoding.

use crate::errors::AmqpError;
use serde::{de::DeserializeOwned, Serialize};

/// Content type tag for JSON payloads
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type tag for bitcode payloads
pub const BITCODE_CONTENT_TYPE: &str = "application/x-bitcode";

/// Encoding selected explicitly at each publish/subscribe call site.
///
/// Implementations must satisfy `decode(encode(v)) == v` for every value they
/// can encode.
pub trait Codec: Send + Sync + 'static {
    /// Tag written to the `content_type` property of published messages.
    fn content_type(&self) -> &'static str;

    /// Serializes `value`, failing with [`AmqpError::EncodeError`].
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, AmqpError>
    where
        T: Serialize;

    /// Deserializes `data`, failing with [`AmqpError::DecodeError`].
    fn decode<T>(&self, data: &[u8]) -> Result<T, AmqpError>
    where
        T: DeserializeOwned;
}

/// Text codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, AmqpError>
    where
        T: Serialize,
    {
        serde_json::to_vec(value).map_err(|err| AmqpError::EncodeError(err.to_string()))
    }

    fn decode<T>(&self, data: &[u8]) -> Result<T, AmqpError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(data).map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}

/// Binary codec backed by `bitcode`'s serde integration.
///
/// Bitcode is not self-describing, so types relying on `deserialize_any`
/// (untagged enums, `serde_json::Value`) cannot be decoded with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitcodeCodec;

impl Codec for BitcodeCodec {
    fn content_type(&self) -> &'static str {
        BITCODE_CONTENT_TYPE
    }

    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, AmqpError>
    where
        T: Serialize,
    {
        bitcode::serialize(value).map_err(|err| AmqpError::EncodeError(err.to_string()))
    }

    fn decode<T>(&self, data: &[u8]) -> Result<T, AmqpError>
    where
        T: DeserializeOwned,
    {
        bitcode::deserialize(data).map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Unit {
        id: u32,
        rank: Rank,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Rank {
        Infantry,
        Cavalry,
        Artillery,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ArmyMove {
        player: String,
        units: Vec<Unit>,
        to_location: Option<String>,
        morale: f64,
    }

    fn army_move() -> ArmyMove {
        ArmyMove {
            player: "alice".to_owned(),
            units: vec![
                Unit { id: 1, rank: Rank::Infantry },
                Unit { id: 2, rank: Rank::Cavalry },
                Unit { id: 3, rank: Rank::Artillery },
            ],
            to_location: Some("europe".to_owned()),
            morale: 0.75,
        }
    }

    #[test]
    fn json_round_trips_nested_values() {
        let codec = JsonCodec;
        let value = army_move();

        let bytes = codec.encode(&value).unwrap();
        let decoded: ArmyMove = codec.decode(&bytes).unwrap();

        assert_eq!(decoded, value);
        assert_eq!(codec.content_type(), JSON_CONTENT_TYPE);
    }

    #[test]
    fn json_round_trips_primitives_and_arrays() {
        let codec = JsonCodec;

        let bytes = codec.encode(&42_i64).unwrap();
        assert_eq!(codec.decode::<i64>(&bytes).unwrap(), 42);

        let bytes = codec.encode(&vec!["a", "b"]).unwrap();
        assert_eq!(codec.decode::<Vec<String>>(&bytes).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn bitcode_round_trips_nested_values() {
        let codec = BitcodeCodec;
        let value = army_move();

        let bytes = codec.encode(&value).unwrap();
        let decoded: ArmyMove = codec.decode(&bytes).unwrap();

        assert_eq!(decoded, value);
        assert_eq!(codec.content_type(), BITCODE_CONTENT_TYPE);
    }

    #[test]
    fn json_rejects_non_string_map_keys() {
        let mut value = HashMap::new();
        value.insert(vec![1_u8, 2], "units");

        let err = JsonCodec.encode(&value).unwrap_err();
        assert!(matches!(err, AmqpError::EncodeError(_)));
    }

    #[test]
    fn json_decode_failure_is_reported() {
        let err = JsonCodec.decode::<ArmyMove>(b"{\"player\":").unwrap_err();
        assert!(matches!(err, AmqpError::DecodeError(_)));

        let err = JsonCodec.decode::<ArmyMove>(b"{\"unknown\": true}").unwrap_err();
        assert!(matches!(err, AmqpError::DecodeError(_)));
    }

    #[test]
    fn bitcode_decode_failure_is_reported() {
        let err = BitcodeCodec.decode::<ArmyMove>(&[]).unwrap_err();
        assert!(matches!(err, AmqpError::DecodeError(_)));
    }
}
