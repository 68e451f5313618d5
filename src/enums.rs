use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, VariantNames};

/// Payload decoders selectable from configuration.
#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Default,
    EnumString,
    VariantNames,
    Display,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CodecKind {
    #[default]
    Json,
    Plain,
    Line,
}

/// What a partition worker does with a message whose payload cannot be decoded.
#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Default,
    EnumString,
    VariantNames,
    Display,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DecodeFailurePolicy {
    /// Log the failure and stop the worker.
    #[default]
    Fail,
    /// Log the failure, skip the message and keep consuming.
    Skip,
}
