//! Route resolution.
//!
//! Walks parsed [`ServiceDesc`]s, validates their routing options, and emits
//! the fully-baked [`Route`] list. Request/response schemas are materialized
//! once per fully-qualified name through a [`ResolvingCache`], so message
//! types shared between methods (or between files of one server) bake a
//! single [`Message`].

use std::collections::HashMap;
use std::time::Duration;

use crate::descriptor::{MessageId, Parser, ServiceDesc};
use crate::error::{Error, Result};
use crate::metadata::{
    check_middleware_name, BindSource, Call, Field, FieldBinding, Kind, Message, MessageRef, Omit,
    Route,
};
use crate::pb::field_descriptor_proto::{Label, Type};
use crate::pb::FieldBind;

/// Memoizes baked messages by fully-qualified name.
///
/// The handle for a message is inserted *before* its fields are walked;
/// a cyclic reference therefore receives the shared handle of the frame
/// still in flight, which fills it once that frame completes.
#[derive(Default)]
pub struct ResolvingCache {
    messages: HashMap<String, MessageRef>,
}

impl ResolvingCache {
    pub fn new() -> Self {
        ResolvingCache::default()
    }

    /// Bake the schema for `id`, reusing the cached handle when present.
    pub fn resolve(&mut self, parser: &Parser, id: MessageId) -> MessageRef {
        let desc = parser.message(id);
        if let Some(handle) = self.messages.get(&desc.name) {
            return handle.clone();
        }

        let handle = MessageRef::unresolved();
        self.messages.insert(desc.name.clone(), handle.clone());

        let mut msg = Message::new(desc.name.clone());
        msg.fields.reserve(desc.fields.len());
        for fd in &desc.fields {
            let Some(mut kind) = kind_of(fd.ty) else {
                continue;
            };
            let name = if fd.alias.is_empty() {
                fd.name.clone()
            } else {
                fd.alias.clone()
            };

            if fd.bind == FieldBind::Default {
                let mut repeated = fd.label == Label::Repeated;
                let mut message = None;
                if kind == Kind::Message {
                    let ref_id = fd
                        .message
                        .expect("message-kind field carries a referent handle");
                    message = Some(self.resolve(parser, ref_id));
                    if parser.message(ref_id).map_entry {
                        kind = Kind::Map;
                        repeated = false;
                    }
                }
                let omit = if fd.omit_empty {
                    Omit::Empty
                } else {
                    Omit::ProtoEmpty
                };
                msg.fields.push(Field {
                    name,
                    kind,
                    message,
                    tag: fd.tag as u32,
                    repeated,
                    omit,
                });
            } else {
                let bind = match fd.bind {
                    FieldBind::Query => BindSource::Query,
                    FieldBind::Params => BindSource::Params,
                    FieldBind::Header => BindSource::Header,
                    FieldBind::Context => BindSource::Context,
                    FieldBind::Default => unreachable!("default bind is a body field"),
                };
                msg.bindings.push(FieldBinding {
                    name,
                    kind,
                    tag: fd.tag as u32,
                    bind,
                });
            }
        }

        msg.fields.shrink_to_fit();
        msg.bindings.shrink_to_fit();
        msg.bake_indices();
        handle.fill(msg);
        handle
    }
}

/// Resolve every eligible method of `services` into a route.
///
/// In lenient mode a failing service or method is silently dropped and
/// iteration continues; in strict mode the first failure is returned with
/// the offending name. The same validation applies in both modes.
pub fn resolve_routes(
    cache: &mut ResolvingCache,
    parser: &Parser,
    services: &[ServiceDesc],
    lenient: bool,
) -> Result<Vec<Route>> {
    let mut route_count = 0;
    for svc in services {
        if svc.opts.server.is_empty() {
            continue;
        }
        for m in &svc.methods {
            if m.streaming || m.opts.method.is_empty() || m.opts.path.is_empty() {
                continue;
            }
            route_count += 1;
        }
    }

    let mut routes = Vec::with_capacity(route_count);
    'services: for svc in services {
        let server = &svc.opts.server;
        if server.is_empty() {
            if lenient {
                continue;
            }
            return Err(Error::InvalidService(svc.name.clone()));
        }
        for name in &svc.opts.middlewares {
            if !check_middleware_name(name) {
                if lenient {
                    continue 'services;
                }
                return Err(Error::InvalidMiddleware(name.clone()));
            }
        }

        'methods: for m in &svc.methods {
            // Streaming methods never become routes, in either mode.
            if m.streaming {
                continue;
            }

            for name in &m.opts.middlewares {
                if !check_middleware_name(name) {
                    if lenient {
                        continue 'methods;
                    }
                    return Err(Error::InvalidMiddleware(name.clone()));
                }
            }

            let handler = if m.opts.handler.is_empty() {
                svc.opts.default_handler.as_str()
            } else {
                m.opts.handler.as_str()
            };
            let input = parser.message(m.input);
            let output = parser.message(m.output);
            if handler.is_empty()
                || m.opts.method.is_empty()
                || m.opts.path.is_empty()
                || input.incomplete
                || output.incomplete
            {
                if lenient {
                    continue;
                }
                return Err(Error::InvalidMethod(m.name.clone()));
            }

            let timeout = if m.opts.timeout != 0 {
                m.opts.timeout
            } else {
                svc.opts.default_timeout
            };

            let input = cache.resolve(parser, m.input);
            let bindings = input.get().bindings.clone();
            routes.push(Route {
                method: m.opts.method.clone(),
                path: format!("{}{}", svc.opts.path_prefix, m.opts.path),
                middlewares: svc
                    .opts
                    .middlewares
                    .iter()
                    .chain(m.opts.middlewares.iter())
                    .cloned()
                    .collect(),
                call: Call {
                    server: server.clone(),
                    handler: handler.to_string(),
                    method: full_method_name(&svc.full_name, &m.name),
                    input,
                    output: cache.resolve(parser, m.output),
                    bindings,
                    timeout: Duration::from_millis(u64::try_from(timeout).unwrap_or(0)),
                },
            });
        }
    }

    Ok(routes)
}

fn full_method_name(service: &str, method: &str) -> String {
    format!("/{service}/{method}")
}

/// Map a descriptor field type to a serialization [`Kind`]. Enums flatten to
/// `Int32`; unsupported kinds (group) answer `None` and are skipped.
fn kind_of(ty: Type) -> Option<Kind> {
    match ty {
        Type::Double => Some(Kind::Double),
        Type::Float => Some(Kind::Float),
        Type::Int64 => Some(Kind::Int64),
        Type::Uint64 => Some(Kind::Uint64),
        Type::Int32 => Some(Kind::Int32),
        Type::Fixed64 => Some(Kind::Fixed64),
        Type::Fixed32 => Some(Kind::Fixed32),
        Type::Bool => Some(Kind::Bool),
        Type::String => Some(Kind::String),
        Type::Message => Some(Kind::Message),
        Type::Bytes => Some(Kind::Bytes),
        Type::Uint32 => Some(Kind::Uint32),
        Type::Enum => Some(Kind::Int32),
        Type::Sfixed32 => Some(Kind::Sfixed32),
        Type::Sfixed64 => Some(Kind::Sfixed64),
        Type::Sint32 => Some(Kind::Sint32),
        Type::Sint64 => Some(Kind::Sint64),
        Type::Group => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb;
    use crate::pb::field_descriptor_proto::{Label, Type};

    fn field(name: &str, tag: i32, ty: Type) -> pb::FieldDescriptorProto {
        pb::FieldDescriptorProto {
            name: Some(name.into()),
            number: Some(tag),
            label: Some(Label::Optional as i32),
            r#type: Some(ty as i32),
            ..Default::default()
        }
    }

    fn message(name: &str, fields: Vec<pb::FieldDescriptorProto>) -> pb::DescriptorProto {
        pb::DescriptorProto {
            name: Some(name.into()),
            field: fields,
            ..Default::default()
        }
    }

    fn unary_method(name: &str, input: &str, output: &str, http: pb::Http) -> pb::MethodDescriptorProto {
        pb::MethodDescriptorProto {
            name: Some(name.into()),
            input_type: Some(input.into()),
            output_type: Some(output.into()),
            options: Some(pb::MethodOptions { http: Some(http) }),
            ..Default::default()
        }
    }

    fn get_http(path: &str, handler: &str) -> pb::Http {
        pb::Http {
            pattern: Some(pb::http::Pattern::Get(path.into())),
            handler: handler.into(),
            ..Default::default()
        }
    }

    fn parse(files: &[pb::FileDescriptorProto]) -> Parser {
        let mut parser = Parser::new();
        for f in files {
            parser.add_file(f).unwrap();
        }
        parser
    }

    fn user_service_file() -> pb::FileDescriptorProto {
        pb::FileDescriptorProto {
            name: Some("user.proto".into()),
            package: Some("pkg".into()),
            message_type: vec![
                message(
                    "GetReq",
                    vec![pb::FieldDescriptorProto {
                        name: Some("id".into()),
                        number: Some(1),
                        label: Some(Label::Optional as i32),
                        r#type: Some(Type::String as i32),
                        options: Some(pb::FieldOptions {
                            bind: Some(pb::FieldBind::Params as i32),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                ),
                message("GetResp", vec![]),
            ],
            service: vec![pb::ServiceDescriptorProto {
                name: Some("UserService".into()),
                options: Some(pb::ServiceOptions {
                    server: Some("user".into()),
                    path_prefix: Some("/v1".into()),
                    ..Default::default()
                }),
                method: vec![unary_method(
                    "Get",
                    ".pkg.GetReq",
                    ".pkg.GetResp",
                    get_http("/u/{id}", "jsonapi"),
                )],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn minimal_route() {
        let parser = parse(&[user_service_file()]);
        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap();
        assert_eq!(routes.len(), 1);

        let route = &routes[0];
        assert_eq!(route.method, "GET");
        assert_eq!(route.path, "/v1/u/{id}");
        assert!(route.middlewares.is_empty());
        assert_eq!(route.call.server, "user");
        assert_eq!(route.call.handler, "jsonapi");
        assert_eq!(route.call.method, "/pkg.UserService/Get");
        assert_eq!(route.call.timeout, Duration::ZERO);

        let input = route.call.input.get();
        assert_eq!(input.name, "pkg.GetReq");
        // The bound field left the body schema entirely.
        assert!(input.fields.is_empty());
        assert_eq!(
            route.call.bindings,
            vec![FieldBinding {
                name: "id".into(),
                kind: Kind::String,
                tag: 1,
                bind: BindSource::Params,
            }]
        );
        assert_eq!(route.call.output.get().name, "pkg.GetResp");
        assert!(route.call.output.get().fields.is_empty());
    }

    #[test]
    fn alias_and_omit_empty() {
        let file = pb::FileDescriptorProto {
            name: Some("r.proto".into()),
            package: Some("pkg".into()),
            message_type: vec![message(
                "Req",
                vec![pb::FieldDescriptorProto {
                    name: Some("user_name".into()),
                    number: Some(1),
                    label: Some(Label::Optional as i32),
                    r#type: Some(Type::String as i32),
                    options: Some(pb::FieldOptions {
                        alias: Some("user".into()),
                        omit_empty: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
            )],
            ..Default::default()
        };

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let resolved = cache.resolve(&parser, parser.message_id(".pkg.Req").unwrap());
        let msg = resolved.get();
        assert_eq!(msg.fields.len(), 1);
        assert_eq!(msg.fields[0].name, "user");
        assert_eq!(msg.fields[0].omit, Omit::Empty);
        assert!(msg.field_by_name("user").is_some());
        assert!(msg.field_by_name("user_name").is_none());
    }

    #[test]
    fn map_field_promotes_to_map_kind() {
        let file = pb::FileDescriptorProto {
            name: Some("m.proto".into()),
            package: Some("pkg".into()),
            message_type: vec![pb::DescriptorProto {
                name: Some("Req".into()),
                field: vec![pb::FieldDescriptorProto {
                    name: Some("tags".into()),
                    number: Some(1),
                    label: Some(Label::Repeated as i32),
                    r#type: Some(Type::Message as i32),
                    type_name: Some("TagsEntry".into()),
                    ..Default::default()
                }],
                nested_type: vec![pb::DescriptorProto {
                    name: Some("TagsEntry".into()),
                    field: vec![
                        field("key", 1, Type::String),
                        field("value", 2, Type::Int32),
                    ],
                    options: Some(pb::MessageOptions {
                        map_entry: Some(true),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let resolved = cache.resolve(&parser, parser.message_id(".pkg.Req").unwrap());
        let msg = resolved.get();
        assert_eq!(msg.fields.len(), 1);
        let f = &msg.fields[0];
        assert_eq!(f.kind, Kind::Map);
        assert!(!f.repeated);
        let entry = f.message.as_ref().unwrap().get();
        assert_eq!(entry.name, "pkg.Req.TagsEntry");
        assert_eq!(entry.fields.len(), 2);
    }

    #[test]
    fn enum_fields_flatten_and_groups_are_dropped() {
        let file = pb::FileDescriptorProto {
            name: Some("k.proto".into()),
            package: Some("pkg".into()),
            message_type: vec![message(
                "Req",
                vec![
                    field("status", 1, Type::Enum),
                    field("legacy", 2, Type::Group),
                    field("count", 3, Type::Uint32),
                ],
            )],
            ..Default::default()
        };

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let resolved = cache.resolve(&parser, parser.message_id(".pkg.Req").unwrap());
        let msg = resolved.get();
        assert_eq!(msg.fields.len(), 2);
        assert_eq!(msg.fields[0].kind, Kind::Int32);
        assert_eq!(msg.fields[1].kind, Kind::Uint32);
        assert!(msg.field_by_name("legacy").is_none());
    }

    #[test]
    fn cyclic_messages_share_one_handle() {
        let file = pb::FileDescriptorProto {
            name: Some("c.proto".into()),
            package: Some("pkg".into()),
            message_type: vec![message(
                "Node",
                vec![
                    field("name", 1, Type::String),
                    {
                        let mut f = field("next", 2, Type::Message);
                        f.type_name = Some(".pkg.Node".into());
                        f
                    },
                ],
            )],
            ..Default::default()
        };

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let resolved = cache.resolve(&parser, parser.message_id(".pkg.Node").unwrap());
        let msg = resolved.get();
        assert_eq!(msg.fields.len(), 2);
        let next = msg.fields[1].message.as_ref().unwrap();
        // The self-reference is the very same allocation.
        assert!(next.same_as(&resolved));
        assert_eq!(next.get().name, "pkg.Node");
    }

    #[test]
    fn shared_input_is_baked_once() {
        let mut file = user_service_file();
        file.service[0].method.push(unary_method(
            "GetAgain",
            ".pkg.GetReq",
            ".pkg.GetResp",
            get_http("/u2/{id}", "jsonapi"),
        ));

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap();
        assert_eq!(routes.len(), 2);
        assert!(routes[0].call.input.same_as(&routes[1].call.input));
    }

    #[test]
    fn streaming_methods_are_filtered() {
        let mut file = user_service_file();
        file.service[0].method.push(pb::MethodDescriptorProto {
            name: Some("Tail".into()),
            input_type: Some(".pkg.GetReq".into()),
            output_type: Some(".pkg.GetResp".into()),
            client_streaming: Some(true),
            options: Some(pb::MethodOptions {
                http: Some(get_http("/tail", "jsonapi")),
            }),
            ..Default::default()
        });

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        // Lenient: the streaming method is dropped, the unary one survives.
        let routes = resolve_routes(&mut cache, &parser, parser.services(), true).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].call.method, "/pkg.UserService/Get");

        // Strict mode filters it the same way, even with an http annotation.
        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].call.method, "/pkg.UserService/Get");
    }

    #[test]
    fn lenient_mode_skips_invalid_services() {
        let mut bad = user_service_file();
        bad.name = Some("bad.proto".into());
        bad.package = Some("bad".into());
        bad.service[0].options.as_mut().unwrap().server = None;

        let files = [user_service_file(), bad];
        let parser = parse(&files);

        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), true).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].call.server, "user");

        let mut cache = ResolvingCache::new();
        let err = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap_err();
        assert!(matches!(err, Error::InvalidService(name) if name == "UserService"));
    }

    #[test]
    fn invalid_middleware_names_are_rejected() {
        let mut file = user_service_file();
        file.service[0].options.as_mut().unwrap().r#use = vec!["not a name!".into()];

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let err = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap_err();
        assert!(matches!(err, Error::InvalidMiddleware(name) if name == "not a name!"));

        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), true).unwrap();
        assert!(routes.is_empty());
    }

    #[test]
    fn middleware_order_is_service_then_method() {
        let mut file = user_service_file();
        file.service[0].options.as_mut().unwrap().r#use = vec!["auth".into(), "trace".into()];
        if let Some(opts) = &mut file.service[0].method[0].options {
            if let Some(http) = &mut opts.http {
                http.r#use = vec!["trace".into(), "limit".into()];
            }
        }

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap();
        assert_eq!(
            routes[0].middlewares,
            vec![
                "auth".to_string(),
                "trace".to_string(),
                "trace".to_string(),
                "limit".to_string(),
            ]
        );
    }

    #[test]
    fn handler_and_timeout_fall_back_to_service_defaults() {
        let mut file = user_service_file();
        {
            let opts = file.service[0].options.as_mut().unwrap();
            opts.default_handler = Some("grpc".into());
            opts.default_timeout = Some(2500);
        }
        if let Some(opts) = &mut file.service[0].method[0].options {
            if let Some(http) = &mut opts.http {
                http.handler = String::new();
            }
        }

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap();
        assert_eq!(routes[0].call.handler, "grpc");
        assert_eq!(routes[0].call.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn incomplete_input_rejects_the_method() {
        let mut file = user_service_file();
        // Point the method at a message that is never declared.
        file.service[0].method[0].input_type = Some(".pkg.Missing".into());

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let err = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(name) if name == "Get"));

        let mut cache = ResolvingCache::new();
        let routes = resolve_routes(&mut cache, &parser, parser.services(), true).unwrap();
        assert!(routes.is_empty());
    }

    #[test]
    fn missing_handler_rejects_the_method() {
        let mut file = user_service_file();
        if let Some(opts) = &mut file.service[0].method[0].options {
            if let Some(http) = &mut opts.http {
                http.handler = String::new();
            }
        }

        let parser = parse(&[file]);
        let mut cache = ResolvingCache::new();
        let err = resolve_routes(&mut cache, &parser, parser.services(), false).unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(name) if name == "Get"));
    }
}
