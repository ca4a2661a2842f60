//! Vendored protobuf types for route extraction.
//!
//! This module carries a wire-compatible subset of the `google.protobuf`
//! descriptor messages together with the protogate annotation extensions.
//! The annotations are protobuf *extensions* of the standard options
//! messages; extensions share the wire format of ordinary optional fields,
//! so declaring them inline (at their fixed extension tags) lets plain
//! `prost` read them without a reflection stack. Only the descriptor fields
//! the control plane consumes are retained.

/// Describes a complete .proto file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDescriptorProto {
    /// File name, relative to root of source tree.
    #[prost(string, optional, tag = "1")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,
    /// e.g. "foo", "foo.bar", etc.
    #[prost(string, optional, tag = "2")]
    pub package: ::core::option::Option<::prost::alloc::string::String>,
    /// Names of files imported by this file.
    #[prost(string, repeated, tag = "3")]
    pub dependency: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// All top-level definitions in this file.
    #[prost(message, repeated, tag = "4")]
    pub message_type: ::prost::alloc::vec::Vec<DescriptorProto>,
    #[prost(message, repeated, tag = "6")]
    pub service: ::prost::alloc::vec::Vec<ServiceDescriptorProto>,
    /// The syntax of the proto file: "proto2" or "proto3".
    #[prost(string, optional, tag = "12")]
    pub syntax: ::core::option::Option<::prost::alloc::string::String>,
}

/// Describes a message type.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, repeated, tag = "2")]
    pub field: ::prost::alloc::vec::Vec<FieldDescriptorProto>,
    #[prost(message, repeated, tag = "3")]
    pub nested_type: ::prost::alloc::vec::Vec<DescriptorProto>,
    #[prost(message, optional, tag = "7")]
    pub options: ::core::option::Option<MessageOptions>,
}

/// Describes a field within a message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(int32, optional, tag = "3")]
    pub number: ::core::option::Option<i32>,
    #[prost(enumeration = "field_descriptor_proto::Label", optional, tag = "4")]
    pub label: ::core::option::Option<i32>,
    /// If type_name is set, this need not be set.
    #[prost(enumeration = "field_descriptor_proto::Type", optional, tag = "5")]
    pub r#type: ::core::option::Option<i32>,
    /// For message and enum types, this is the name of the type. If the name
    /// starts with a '.', it is fully-qualified. Otherwise, C++-like scoping
    /// rules are used to find the type.
    #[prost(string, optional, tag = "6")]
    pub type_name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "8")]
    pub options: ::core::option::Option<FieldOptions>,
}
/// Nested message and enum types in `FieldDescriptorProto`.
pub mod field_descriptor_proto {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Type {
        /// 0 is reserved for errors.
        Double = 1,
        Float = 2,
        Int64 = 3,
        Uint64 = 4,
        Int32 = 5,
        Fixed64 = 6,
        Fixed32 = 7,
        Bool = 8,
        String = 9,
        /// Tag-delimited aggregate.
        Group = 10,
        /// Length-delimited aggregate.
        Message = 11,
        Bytes = 12,
        Uint32 = 13,
        Enum = 14,
        Sfixed32 = 15,
        Sfixed64 = 16,
        Sint32 = 17,
        Sint64 = 18,
    }
    impl Type {
        /// String value of the enum field names used in the ProtoBuf definition.
        pub fn as_str_name(&self) -> &'static str {
            match self {
                Self::Double => "TYPE_DOUBLE",
                Self::Float => "TYPE_FLOAT",
                Self::Int64 => "TYPE_INT64",
                Self::Uint64 => "TYPE_UINT64",
                Self::Int32 => "TYPE_INT32",
                Self::Fixed64 => "TYPE_FIXED64",
                Self::Fixed32 => "TYPE_FIXED32",
                Self::Bool => "TYPE_BOOL",
                Self::String => "TYPE_STRING",
                Self::Group => "TYPE_GROUP",
                Self::Message => "TYPE_MESSAGE",
                Self::Bytes => "TYPE_BYTES",
                Self::Uint32 => "TYPE_UINT32",
                Self::Enum => "TYPE_ENUM",
                Self::Sfixed32 => "TYPE_SFIXED32",
                Self::Sfixed64 => "TYPE_SFIXED64",
                Self::Sint32 => "TYPE_SINT32",
                Self::Sint64 => "TYPE_SINT64",
            }
        }
    }
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Label {
        /// 0 is reserved for errors.
        Optional = 1,
        Required = 2,
        Repeated = 3,
    }
    impl Label {
        /// String value of the enum field names used in the ProtoBuf definition.
        pub fn as_str_name(&self) -> &'static str {
            match self {
                Self::Optional => "LABEL_OPTIONAL",
                Self::Required => "LABEL_REQUIRED",
                Self::Repeated => "LABEL_REPEATED",
            }
        }
    }
}

/// Options attached to a message declaration.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageOptions {
    /// Whether the message is an automatically generated map entry type for a
    /// map field.
    #[prost(bool, optional, tag = "7")]
    pub map_entry: ::core::option::Option<bool>,
}

/// Options attached to a field declaration, including the protogate
/// binding extensions.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldOptions {
    /// Extension `(protogate.alias)`: JSON name override for the field.
    #[prost(string, optional, tag = "51501")]
    pub alias: ::core::option::Option<::prost::alloc::string::String>,
    /// Extension `(protogate.bind)`: HTTP surface the field is lifted from.
    #[prost(enumeration = "FieldBind", optional, tag = "51502")]
    pub bind: ::core::option::Option<i32>,
    /// Extension `(protogate.omit_empty)`: drop the field from JSON output
    /// when it holds its zero value.
    #[prost(bool, optional, tag = "51503")]
    pub omit_empty: ::core::option::Option<bool>,
}

/// Describes a service.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, repeated, tag = "2")]
    pub method: ::prost::alloc::vec::Vec<MethodDescriptorProto>,
    #[prost(message, optional, tag = "3")]
    pub options: ::core::option::Option<ServiceOptions>,
}

/// Options attached to a service declaration, including the protogate
/// routing extensions.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceOptions {
    /// Extension `(protogate.server)`: backend server the service's routes
    /// dispatch to.
    #[prost(string, optional, tag = "51511")]
    pub server: ::core::option::Option<::prost::alloc::string::String>,
    /// Extension `(protogate.default_handler)`: handler used by methods that
    /// name none.
    #[prost(string, optional, tag = "51512")]
    pub default_handler: ::core::option::Option<::prost::alloc::string::String>,
    /// Extension `(protogate.default_timeout)`: per-call timeout in
    /// milliseconds used by methods that set none.
    #[prost(int64, optional, tag = "51513")]
    pub default_timeout: ::core::option::Option<i64>,
    /// Extension `(protogate.path_prefix)`: prefix prepended to every method
    /// path.
    #[prost(string, optional, tag = "51514")]
    pub path_prefix: ::core::option::Option<::prost::alloc::string::String>,
    /// Extension `(protogate.use)`: middleware chain shared by all methods.
    #[prost(string, repeated, tag = "51515")]
    pub r#use: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Describes a method of a service.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MethodDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,
    /// Input and output type names. These are resolved in the same way as
    /// `FieldDescriptorProto.type_name`, but must refer to a message type.
    #[prost(string, optional, tag = "2")]
    pub input_type: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "3")]
    pub output_type: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "4")]
    pub options: ::core::option::Option<MethodOptions>,
    /// Identifies if client streams multiple client messages.
    #[prost(bool, optional, tag = "5")]
    pub client_streaming: ::core::option::Option<bool>,
    /// Identifies if server streams multiple server messages.
    #[prost(bool, optional, tag = "6")]
    pub server_streaming: ::core::option::Option<bool>,
}

/// Options attached to a method declaration, including the protogate HTTP
/// extension.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MethodOptions {
    /// Extension `(protogate.http)`: the HTTP pattern exposing this method.
    #[prost(message, optional, tag = "51500")]
    pub http: ::core::option::Option<Http>,
}

/// The HTTP annotation: one verb/path pattern plus per-method routing
/// options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Http {
    /// Handler dispatching this route; falls back to the service's
    /// `default_handler` when empty.
    #[prost(string, tag = "7")]
    pub handler: ::prost::alloc::string::String,
    /// Middleware chain appended after the service-level chain.
    #[prost(string, repeated, tag = "8")]
    pub r#use: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Per-call timeout in milliseconds; falls back to the service's
    /// `default_timeout` when zero.
    #[prost(int64, tag = "9")]
    pub timeout: i64,
    #[prost(oneof = "http::Pattern", tags = "1, 2, 3, 4, 5, 6")]
    pub pattern: ::core::option::Option<http::Pattern>,
}
/// Nested message and enum types in `Http`.
pub mod http {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Pattern {
        /// Maps to HTTP GET.
        #[prost(string, tag = "1")]
        Get(::prost::alloc::string::String),
        /// Maps to HTTP POST.
        #[prost(string, tag = "2")]
        Post(::prost::alloc::string::String),
        /// Maps to HTTP PUT.
        #[prost(string, tag = "3")]
        Put(::prost::alloc::string::String),
        /// Maps to HTTP DELETE.
        #[prost(string, tag = "4")]
        Delete(::prost::alloc::string::String),
        /// Maps to HTTP PATCH.
        #[prost(string, tag = "5")]
        Patch(::prost::alloc::string::String),
        /// Custom pattern for verbs outside the standard five.
        #[prost(message, tag = "6")]
        Custom(super::CustomPattern),
    }
}

/// A custom HTTP pattern carrying an arbitrary verb.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CustomPattern {
    #[prost(string, tag = "1")]
    pub method: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub path: ::prost::alloc::string::String,
}

/// The HTTP surface a request field is populated from. `Default` keeps the
/// field in the protobuf request body; every other source lifts it out of
/// the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FieldBind {
    Default = 0,
    Query = 1,
    Params = 2,
    Header = 3,
    Context = 4,
}
impl FieldBind {
    /// String value of the enum field names used in the ProtoBuf definition.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Default => "FIELD_BIND_FROM_DEFAULT",
            Self::Query => "FIELD_BIND_FROM_QUERY",
            Self::Params => "FIELD_BIND_FROM_PARAMS",
            Self::Header => "FIELD_BIND_FROM_HEADER",
            Self::Context => "FIELD_BIND_FROM_CONTEXT",
        }
    }
}
