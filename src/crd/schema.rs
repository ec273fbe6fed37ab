//! Schema helpers for fields whose content the controller never interprets.

use schemars::{json_schema, Schema, SchemaGenerator};

/// A single opaque Kubernetes object.
pub(crate) fn opaque_object(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// A list of opaque Kubernetes objects.
pub(crate) fn opaque_object_list(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}
