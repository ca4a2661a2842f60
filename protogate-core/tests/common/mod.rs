// Each integration test file is compiled as its own binary crate with its
// own copy of this module; helpers used by one binary but not another would
// otherwise trigger false dead-code warnings.
#![allow(dead_code)]

use std::io::Read;

use protogate_core::pb;
use protogate_core::pb::field_descriptor_proto::{Label, Type};

/// A file descriptor for one annotated service:
/// `GET <path_prefix><path>` on server `server`, input `<package>.GetReq`
/// with a params-bound `id` field, output `<package>.GetResp`.
pub fn service_file(package: &str, server: &str, path: &str) -> pb::FileDescriptorProto {
    pb::FileDescriptorProto {
        name: Some(format!("{package}.proto")),
        package: Some(package.into()),
        syntax: Some("proto3".into()),
        message_type: vec![
            pb::DescriptorProto {
                name: Some("GetReq".into()),
                field: vec![pb::FieldDescriptorProto {
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
                ..Default::default()
            },
            pb::DescriptorProto {
                name: Some("GetResp".into()),
                ..Default::default()
            },
        ],
        service: vec![pb::ServiceDescriptorProto {
            name: Some("UserService".into()),
            options: Some(pb::ServiceOptions {
                server: Some(server.into()),
                path_prefix: Some("/v1".into()),
                ..Default::default()
            }),
            method: vec![pb::MethodDescriptorProto {
                name: Some("Get".into()),
                input_type: Some(format!(".{package}.GetReq")),
                output_type: Some(format!(".{package}.GetResp")),
                options: Some(pb::MethodOptions {
                    http: Some(pb::Http {
                        pattern: Some(pb::http::Pattern::Get(path.into())),
                        handler: "jsonapi".into(),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Gzip-decompress published registry bytes.
pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).expect("valid gzip data");
    out
}
