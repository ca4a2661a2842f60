//! The materialized route model.
//!
//! Everything in this module is the *output* side of route resolution: baked
//! message schemas with precomputed lookup indices, field bindings lifted
//! from the HTTP surface, and the routes themselves. All types are immutable
//! once resolution finishes and safe to share across threads.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::ser::Serializer;
use serde::Serialize;

/// Middleware names are restricted to a conservative identifier alphabet.
static MIDDLEWARE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("middleware name regex is valid"));

/// Whether `name` is a usable middleware name (non-empty, `[A-Za-z0-9_-]+`).
pub fn check_middleware_name(name: &str) -> bool {
    MIDDLEWARE_NAME_REGEX.is_match(name)
}

/// The serialization kind of a baked field.
///
/// Protobuf scalar kinds plus `Message` and `Map`. Enum fields are projected
/// to `Int32` during resolution; unsupported kinds (group) never reach a
/// baked schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message,
    Map,
}

/// The HTTP surface a bound request field is populated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindSource {
    Query,
    Params,
    Header,
    Context,
}

/// When a body field is left out of serialized output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Omit {
    /// Omit when the value equals the protobuf zero value (the default).
    #[default]
    ProtoEmpty,
    /// Omit only when explicitly requested via the `omit_empty` annotation.
    Empty,
}

/// A request field lifted out of the body and bound to an HTTP surface.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldBinding {
    pub name: String,
    pub kind: Kind,
    pub tag: u32,
    pub bind: BindSource,
}

/// One body field of a baked message.
#[derive(Clone, Debug, Serialize)]
pub struct Field {
    pub name: String,
    pub kind: Kind,
    /// The referent schema for `Message` and `Map` kinds.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRef>,
    pub tag: u32,
    pub repeated: bool,
    pub omit: Omit,
}

/// A baked message schema: ordered body fields, the bindings extracted from
/// it, and the lookup indices computed once all fields are fixed.
#[derive(Debug, Default)]
pub struct Message {
    pub name: String,
    pub fields: Vec<Field>,
    pub bindings: Vec<FieldBinding>,
    tag_index: HashMap<u32, usize>,
    name_index: HashMap<String, usize>,
}

impl Message {
    pub fn new(name: String) -> Self {
        Message {
            name,
            ..Default::default()
        }
    }

    /// Compute the `tag -> field` and `name -> field` indices. Must be called
    /// exactly once, after the field list is final.
    pub fn bake_indices(&mut self) {
        self.tag_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.tag, i))
            .collect();
        self.name_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
    }

    pub fn field_by_tag(&self, tag: u32) -> Option<&Field> {
        self.tag_index.get(&tag).map(|&i| &self.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.name_index.get(name).map(|&i| &self.fields[i])
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        // Bindings are serialized at the call level, indices are derived.
        let mut s = serializer.serialize_struct("Message", 2)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("fields", &self.fields)?;
        s.end()
    }
}

/// A shared handle to a baked [`Message`].
///
/// Handles are published into the resolving cache *before* the message's
/// fields are walked, so cyclic message graphs resolve: an inner reference
/// to a message still being baked receives the same handle, which the outer
/// frame fills exactly once when its fields are final.
#[derive(Clone, Debug, Default)]
pub struct MessageRef(Arc<OnceLock<Message>>);

impl MessageRef {
    /// A handle whose message has not been baked yet.
    pub fn unresolved() -> Self {
        MessageRef::default()
    }

    /// Publish the baked message. The resolving cache guarantees a single
    /// fill per handle.
    pub(crate) fn fill(&self, msg: Message) {
        self.0
            .set(msg)
            .expect("message handle filled exactly once by its resolving frame");
    }

    /// The baked message. Panics if resolution has not completed, which
    /// cannot happen for handles obtained from finished route resolution.
    pub fn get(&self) -> &Message {
        self.0
            .get()
            .expect("message handle read after resolution completed")
    }

    pub fn try_get(&self) -> Option<&Message> {
        self.0.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.0.get().is_some()
    }

    /// Whether two handles share the same underlying message.
    pub fn same_as(&self, other: &MessageRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for MessageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.get() {
            Some(msg) => msg.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// The RPC side of a route.
#[derive(Clone, Debug, Serialize)]
pub struct Call {
    pub server: String,
    pub handler: String,
    /// Full RPC method path: `/<service full name>/<method name>`.
    pub method: String,
    #[serde(rename = "in")]
    pub input: MessageRef,
    #[serde(rename = "out")]
    pub output: MessageRef,
    /// Bindings of the input message, duplicated here for dispatch without a
    /// schema lookup.
    pub bindings: Vec<FieldBinding>,
    #[serde(rename = "timeout_ns", serialize_with = "serialize_duration_nanos")]
    pub timeout: Duration,
}

/// One HTTP endpoint mapped to one RPC method.
#[derive(Clone, Debug, Serialize)]
pub struct Route {
    pub method: String,
    pub path: String,
    /// Service-level middlewares followed by method-level middlewares, order
    /// preserved, duplicates permitted.
    #[serde(rename = "use")]
    pub middlewares: Vec<String>,
    pub call: Call,
}

fn serialize_duration_nanos<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_nanos())
}
