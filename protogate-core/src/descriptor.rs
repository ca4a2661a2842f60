//! Descriptor parsing.
//!
//! Consumes [`pb::FileDescriptorProto`] values and builds the intermediate
//! message/service graph that route resolution works from. Files may arrive
//! in any order and may reference messages declared in sibling files:
//! referencing a type creates an incomplete placeholder that is completed in
//! place when its declaration is parsed. After a whole file set has been
//! added, [`Parser::check_incomplete`] reports any names that were
//! referenced but never declared.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::pb;
use crate::pb::field_descriptor_proto::{Label, Type};

/// Stable handle to a [`MessageDesc`] inside its [`Parser`].
///
/// Handles are plain indices into the parser's message table, so forward
/// references and reference cycles cost nothing to represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(usize);

/// A parsed message declaration (or a placeholder for one).
#[derive(Debug)]
pub struct MessageDesc {
    /// Fully-qualified name without the leading dot.
    pub name: String,
    pub fields: Vec<FieldDesc>,
    /// Set for the protobuf compiler's synthetic map entry messages.
    pub map_entry: bool,
    /// True until the declaration for this name has been parsed.
    pub incomplete: bool,
}

/// A parsed field declaration.
#[derive(Debug)]
pub struct FieldDesc {
    pub name: String,
    pub ty: Type,
    /// Referent message for `Type::Message` fields.
    pub message: Option<MessageId>,
    pub tag: i32,
    pub label: Label,
    /// JSON name override from the `alias` annotation; empty when unset.
    pub alias: String,
    pub bind: pb::FieldBind,
    pub omit_empty: bool,
}

/// Service-level routing options.
#[derive(Debug, Default)]
pub struct ServiceOptions {
    pub server: String,
    pub default_handler: String,
    /// Milliseconds; zero means unset.
    pub default_timeout: i64,
    pub path_prefix: String,
    pub middlewares: Vec<String>,
}

/// A parsed service declaration.
#[derive(Debug)]
pub struct ServiceDesc {
    pub name: String,
    /// Fully-qualified name without the leading dot.
    pub full_name: String,
    pub methods: Vec<MethodDesc>,
    pub opts: ServiceOptions,
}

/// Method-level routing options, projected from the `http` annotation.
/// Methods without the annotation keep empty strings.
#[derive(Debug, Default)]
pub struct MethodOptions {
    pub method: String,
    pub path: String,
    pub middlewares: Vec<String>,
    /// Milliseconds; zero means unset.
    pub timeout: i64,
    pub handler: String,
}

/// A parsed method declaration.
#[derive(Debug)]
pub struct MethodDesc {
    pub name: String,
    pub input: MessageId,
    pub output: MessageId,
    /// Client or server streaming; streaming methods never become routes.
    pub streaming: bool,
    pub opts: MethodOptions,
}

/// Parses file descriptors into a message/service graph.
///
/// The parser owns every descriptor it creates; [`MessageId`] handles stay
/// valid for the parser's lifetime.
pub struct Parser {
    ns: Vec<String>,
    prefix: String,
    messages: Vec<MessageDesc>,
    by_name: HashMap<String, MessageId>,
    services: Vec<ServiceDesc>,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            ns: Vec::new(),
            prefix: String::new(),
            messages: Vec::new(),
            by_name: HashMap::new(),
            services: Vec::new(),
        }
    }

    fn enter(&mut self, ns: &str) {
        self.ns.push(ns.to_string());
        self.prefix = format!(".{}", self.ns.join("."));
    }

    fn leave(&mut self) {
        self.ns.pop();
        self.prefix = format!(".{}", self.ns.join("."));
    }

    /// Look up a message by its dotted fully-qualified name, creating an
    /// incomplete placeholder on first reference.
    fn get_message(&mut self, full_name: &str) -> MessageId {
        if let Some(&id) = self.by_name.get(full_name) {
            return id;
        }
        let id = MessageId(self.messages.len());
        self.messages.push(MessageDesc {
            name: normal_name(full_name).to_string(),
            fields: Vec::new(),
            map_entry: false,
            incomplete: true,
        });
        self.by_name.insert(full_name.to_string(), id);
        id
    }

    fn parse_message(&mut self, md: &pb::DescriptorProto) -> Result<()> {
        self.enter(md.name());
        let result = self.parse_message_body(md);
        self.leave();
        result
    }

    fn parse_message_body(&mut self, md: &pb::DescriptorProto) -> Result<()> {
        let full_name = self.prefix.clone();
        let id = self.get_message(&full_name);
        if !self.messages[id.0].incomplete {
            return Err(Error::DuplicateMessage(normal_name(&full_name).to_string()));
        }

        // Nested declarations first, so map entries and nested referents are
        // complete before the enclosing fields are walked.
        for nested in &md.nested_type {
            self.parse_message(nested)?;
        }

        let mut fields = Vec::with_capacity(md.field.len());
        for fd in &md.field {
            let ty = fd.r#type();
            let mut message = None;
            if ty == Type::Message {
                let ref_name = fd.type_name();
                // An unqualified referent resolves against the current
                // nesting scope only; outer scopes are not searched. Known
                // limitation, kept for compatibility with descriptor sets
                // produced against the same rule.
                let key = if ref_name.starts_with('.') {
                    ref_name.to_string()
                } else {
                    format!("{}.{}", self.prefix, ref_name)
                };
                message = Some(self.get_message(&key));
            }

            let opts = fd.options.clone().unwrap_or_default();
            fields.push(FieldDesc {
                name: fd.name().to_string(),
                ty,
                message,
                tag: fd.number(),
                label: fd.label(),
                alias: opts.alias().to_string(),
                bind: opts.bind(),
                omit_empty: opts.omit_empty(),
            });
        }

        let msg = &mut self.messages[id.0];
        msg.fields = fields;
        msg.map_entry = md.options.as_ref().is_some_and(|o| o.map_entry());
        msg.incomplete = false;
        Ok(())
    }

    fn parse_method(&mut self, md: &pb::MethodDescriptorProto) -> MethodDesc {
        let mut opts = MethodOptions::default();
        if let Some(http) = md.options.as_ref().and_then(|o| o.http.as_ref()) {
            let (method, path) = match &http.pattern {
                Some(pb::http::Pattern::Get(p)) => ("GET".to_string(), p.clone()),
                Some(pb::http::Pattern::Post(p)) => ("POST".to_string(), p.clone()),
                Some(pb::http::Pattern::Put(p)) => ("PUT".to_string(), p.clone()),
                Some(pb::http::Pattern::Delete(p)) => ("DELETE".to_string(), p.clone()),
                Some(pb::http::Pattern::Patch(p)) => ("PATCH".to_string(), p.clone()),
                Some(pb::http::Pattern::Custom(c)) => (c.method.clone(), c.path.clone()),
                None => (String::new(), String::new()),
            };
            opts = MethodOptions {
                method,
                path,
                middlewares: http.r#use.clone(),
                timeout: http.timeout,
                handler: http.handler.clone(),
            };
        }

        MethodDesc {
            name: md.name().to_string(),
            input: self.get_message(md.input_type()),
            output: self.get_message(md.output_type()),
            streaming: md.client_streaming() || md.server_streaming(),
            opts,
        }
    }

    fn parse_service(&mut self, sd: &pb::ServiceDescriptorProto) {
        let sopts = sd.options.clone().unwrap_or_default();
        let mut svc = ServiceDesc {
            name: sd.name().to_string(),
            full_name: normal_name(&format!("{}.{}", self.prefix, sd.name())).to_string(),
            methods: Vec::with_capacity(sd.method.len()),
            opts: ServiceOptions {
                server: sopts.server().to_string(),
                default_handler: sopts.default_handler().to_string(),
                default_timeout: sopts.default_timeout(),
                path_prefix: sopts.path_prefix().to_string(),
                middlewares: sopts.r#use.clone(),
            },
        };
        for md in &sd.method {
            let method = self.parse_method(md);
            svc.methods.push(method);
        }
        self.services.push(svc);
    }

    /// Parse one file into the shared graph.
    ///
    /// Returns [`Error::DuplicateMessage`] if the file redeclares an already
    /// parsed message; any other malformed input surfaces either through
    /// [`Parser::check_incomplete`] or during route resolution.
    pub fn add_file(&mut self, fd: &pb::FileDescriptorProto) -> Result<()> {
        self.enter(fd.package());
        let result = self.add_file_body(fd);
        self.leave();
        result
    }

    fn add_file_body(&mut self, fd: &pb::FileDescriptorProto) -> Result<()> {
        for dp in &fd.message_type {
            self.parse_message(dp)?;
        }
        for sd in &fd.service {
            self.parse_service(sd);
        }
        Ok(())
    }

    pub fn message(&self, id: MessageId) -> &MessageDesc {
        &self.messages[id.0]
    }

    /// Look up a message handle by dotted fully-qualified name (with the
    /// leading dot, as descriptor type references are written).
    pub fn message_id(&self, full_name: &str) -> Option<MessageId> {
        self.by_name.get(full_name).copied()
    }

    pub fn services(&self) -> &[ServiceDesc] {
        &self.services
    }

    /// Fully-qualified names of messages that were referenced but whose
    /// declaration has not been parsed.
    pub fn check_incomplete(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.incomplete)
            .map(|m| m.name.clone())
            .collect()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

fn normal_name(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}
