//! Host value classification.

use uast_engine::NodeKind;

use crate::host::{HostData, HostValue};

/// Assigns the node kind of a host value. Total: anything that is not a
/// scalar or a sequence is treated as an object.
///
/// Booleans are matched on their own variant, so they can never be taken
/// for integers. Integers above `i64::MAX` that still fit in a `u64` are
/// `Uint`, so they encode the same way they were decoded.
pub fn classify(value: &HostValue) -> NodeKind {
    match value.data() {
        HostData::None => NodeKind::Null,
        HostData::Str(_) => NodeKind::String,
        HostData::Int(v) if *v > i64::MAX as i128 && *v <= u64::MAX as i128 => NodeKind::Uint,
        HostData::Int(_) => NodeKind::Int,
        HostData::Float(_) => NodeKind::Float,
        HostData::Bool(_) => NodeKind::Bool,
        HostData::List(_) | HostData::Tuple(_) => NodeKind::Array,
        HostData::Bytes(_) | HostData::Dict(_) | HostData::Capsule(_) => NodeKind::Object,
    }
}
