//! WordPress over XML-RPC.
//!
//! Requests are written with `quick_xml::Writer`, responses read with
//! `quick_xml::Reader` into a small element tree and then into [`Value`].
//! Calls are blocking; the publisher runs them on its `spawn_blocking`
//! thread.

use super::{Category, ContentHost, HostError, Post, PostKind, Tag};
use crate::config::AccountConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    Base64(Vec<u8>),
    DateTime(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Ids come back as ints from some endpoints and strings from others.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(name),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────

fn write_simple_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_value<W: Write>(writer: &mut Writer<W>, value: &Value) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new("value")))?;
    match value {
        Value::Int(i) => write_simple_element(writer, "int", &i.to_string())?,
        Value::Bool(b) => write_simple_element(writer, "boolean", if *b { "1" } else { "0" })?,
        Value::Str(s) => write_simple_element(writer, "string", s)?,
        Value::Double(d) => write_simple_element(writer, "double", &d.to_string())?,
        Value::Base64(bytes) => write_simple_element(writer, "base64", &STANDARD.encode(bytes))?,
        Value::DateTime(s) => write_simple_element(writer, "dateTime.iso8601", s)?,
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new("array")))?;
            writer.write_event(Event::Start(BytesStart::new("data")))?;
            for item in items {
                write_value(writer, item)?;
            }
            writer.write_event(Event::End(BytesEnd::new("data")))?;
            writer.write_event(Event::End(BytesEnd::new("array")))?;
        }
        Value::Struct(members) => {
            writer.write_event(Event::Start(BytesStart::new("struct")))?;
            for (name, member) in members {
                writer.write_event(Event::Start(BytesStart::new("member")))?;
                write_simple_element(writer, "name", name)?;
                write_value(writer, member)?;
                writer.write_event(Event::End(BytesEnd::new("member")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("struct")))?;
        }
        Value::Nil => writer.write_event(Event::Empty(BytesStart::new("nil")))?,
    }
    writer.write_event(Event::End(BytesEnd::new("value")))?;
    Ok(())
}

/// Serialise a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, HostError> {
    let encode = || -> Result<Vec<u8>, quick_xml::Error> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        writer.write_event(Event::Start(BytesStart::new("methodCall")))?;
        write_simple_element(&mut writer, "methodName", method)?;
        writer.write_event(Event::Start(BytesStart::new("params")))?;
        for param in params {
            writer.write_event(Event::Start(BytesStart::new("param")))?;
            write_value(&mut writer, param)?;
            writer.write_event(Event::End(BytesEnd::new("param")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("params")))?;
        writer.write_event(Event::End(BytesEnd::new("methodCall")))?;
        Ok(writer.into_inner().into_inner())
    };
    let bytes = encode().map_err(|e| HostError::Malformed(format!("encoding {method}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| HostError::Malformed(e.to_string()))
}

// ── Decoding ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Default::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<Node, HostError> {
    let malformed = |e: quick_xml::Error| HostError::Malformed(e.to_string());
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut stack = vec![Node::named(b"#document")];

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => stack.push(Node::named(e.local_name().as_ref())),
            Event::Empty(e) => {
                let node = Node::named(e.local_name().as_ref());
                if let Some(top) = stack.last_mut() {
                    top.children.push(node);
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(malformed)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(HostError::Malformed("unbalanced end tag".into()));
                }
                if let (Some(node), Some(parent)) = (stack.pop(), stack.last_mut()) {
                    parent.children.push(node);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(root), true) => Ok(root),
        _ => Err(HostError::Malformed("unclosed element".into())),
    }
}

fn value_from(node: &Node) -> Result<Value, HostError> {
    let Some(typed) = node.children.first() else {
        // Untyped values are strings.
        return Ok(Value::Str(node.text.clone()));
    };
    let text = typed.text.trim();
    let bad = |what: &str| HostError::Malformed(format!("bad {what} value '{text}'"));

    Ok(match typed.name.as_str() {
        "int" | "i4" | "i8" => Value::Int(text.parse().map_err(|_| bad("int"))?),
        "boolean" => match text {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            _ => return Err(bad("boolean")),
        },
        "string" => Value::Str(typed.text.clone()),
        "double" => Value::Double(text.parse().map_err(|_| bad("double"))?),
        "base64" => {
            let compact: String = text.split_whitespace().collect();
            Value::Base64(STANDARD.decode(compact).map_err(|_| bad("base64"))?)
        }
        "dateTime.iso8601" => Value::DateTime(text.to_string()),
        "nil" => Value::Nil,
        "array" => {
            let data = typed
                .child("data")
                .ok_or_else(|| HostError::Malformed("array without data".into()))?;
            Value::Array(
                data.children
                    .iter()
                    .filter(|c| c.name == "value")
                    .map(value_from)
                    .collect::<Result<_, _>>()?,
            )
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member
                    .child("name")
                    .map(|n| n.text.trim().to_string())
                    .ok_or_else(|| HostError::Malformed("member without name".into()))?;
                let value = member
                    .child("value")
                    .ok_or_else(|| HostError::Malformed(format!("member '{name}' without value")))?;
                members.insert(name, value_from(value)?);
            }
            Value::Struct(members)
        }
        other => return Err(HostError::Malformed(format!("unknown type <{other}>"))),
    })
}

/// Parse a `methodResponse`; a fault becomes [`HostError::Fault`].
pub fn parse_response(xml: &str) -> Result<Value, HostError> {
    let root = parse_tree(xml)?;
    let response = root
        .child("methodResponse")
        .ok_or_else(|| HostError::Malformed("no methodResponse".into()))?;

    if let Some(fault) = response.child("fault") {
        let value = fault
            .child("value")
            .map(value_from)
            .transpose()?
            .unwrap_or(Value::Nil);
        return Err(HostError::Fault {
            code: value.member("faultCode").and_then(Value::as_i64).unwrap_or(0),
            message: value
                .member("faultString")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    let value = response
        .child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .ok_or_else(|| HostError::Malformed("response without params".into()))?;
    value_from(value)
}

// ── Client ───────────────────────────────────────────────────────────────

/// A WordPress blog reached through its `xmlrpc.php` endpoint.
pub struct WordPressClient {
    http: reqwest::blocking::Client,
    url: String,
    username: String,
    password: String,
    blog_id: String,
    tags: Mutex<Option<Vec<Tag>>>,
    categories: Mutex<Option<Vec<Category>>>,
}

impl std::fmt::Debug for WordPressClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordPressClient")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("blog_id", &self.blog_id)
            .finish()
    }
}

impl WordPressClient {
    /// Connect with `account`, picking the user's first blog when no
    /// `blog_id` is configured.
    pub fn connect(account: &AccountConfig, timeout_secs: u64) -> Result<Self, HostError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("pressmark/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostError::Transport {
                method: "connect".into(),
                reason: e.to_string(),
            })?;
        let mut client = Self {
            http,
            url: account.url.clone(),
            username: account.username.clone(),
            password: account.password.clone(),
            blog_id: account.blog_id.clone().unwrap_or_default(),
            tags: Mutex::new(None),
            categories: Mutex::new(None),
        };
        if client.blog_id.is_empty() {
            client.blog_id = client.first_blog()?;
        }
        info!("Connected to {} (blog {})", client.url, client.blog_id);
        Ok(client)
    }

    fn first_blog(&self) -> Result<String, HostError> {
        let blogs = self.call(
            "wp.getUsersBlogs",
            vec![self.username.as_str().into(), self.password.as_str().into()],
        )?;
        let list = blogs
            .as_array()
            .ok_or_else(|| HostError::Malformed("wp.getUsersBlogs: expected an array".into()))?;
        if list.len() > 1 {
            warn!("User has {} blogs; posting to the first one", list.len());
        }
        list.first()
            .and_then(|b| b.member("blogid"))
            .and_then(Value::to_text)
            .ok_or_else(|| HostError::Malformed("user has no blogs".into()))
    }

    /// Perform one XML-RPC call.
    pub fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, HostError> {
        let transport = |reason: String| HostError::Transport {
            method: method.to_string(),
            reason,
        };
        let body = encode_call(method, &params)?;
        debug!("XML-RPC {} ({} bytes)", method, body.len());
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .map_err(|e| transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(transport(format!("HTTP {}", response.status())));
        }
        let text = response.text().map_err(|e| transport(e.to_string()))?;
        parse_response(&text)
    }

    fn auth(&self) -> Vec<Value> {
        vec![
            self.blog_id.as_str().into(),
            self.username.as_str().into(),
            self.password.as_str().into(),
        ]
    }
}

fn post_struct(post: &Post) -> Value {
    let mut members = BTreeMap::new();
    members.insert("title".to_string(), Value::Str(post.title.clone()));
    members.insert("description".to_string(), Value::Str(post.body.clone()));
    members.insert(
        "categories".to_string(),
        Value::Array(post.categories.iter().map(|c| Value::Str(c.clone())).collect()),
    );
    members.insert("mt_keywords".to_string(), Value::Str(post.tags.join(", ")));
    Value::Struct(members)
}

impl ContentHost for WordPressClient {
    fn upload_file(&self, path: &Path, overwrite: bool) -> Result<String, HostError> {
        let bits = std::fs::read(path).map_err(|e| HostError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();
        info!("Uploading {} ({}, {} bytes)", name, mime, bits.len());

        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::Str(name));
        data.insert("type".to_string(), Value::Str(mime));
        data.insert("bits".to_string(), Value::Base64(bits));
        data.insert("overwrite".to_string(), Value::Bool(overwrite));

        let mut params = self.auth();
        params.push(Value::Struct(data));
        let result = self.call("wp.uploadFile", params)?;
        result
            .member("url")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| HostError::Malformed("wp.uploadFile: no url in response".into()))
    }

    fn tags(&self) -> Result<Vec<Tag>, HostError> {
        let mut cached = self.tags.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tags) = cached.as_ref() {
            return Ok(tags.clone());
        }
        let result = self.call("wp.getTags", self.auth())?;
        let tags: Vec<Tag> = result
            .as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(|t| {
                Some(Tag {
                    name: t.member("name")?.to_text()?,
                    count: t.member("count").and_then(Value::as_i64).unwrap_or(0).max(0) as u64,
                })
            })
            .collect();
        *cached = Some(tags.clone());
        Ok(tags)
    }

    fn categories(&self) -> Result<Vec<Category>, HostError> {
        let mut cached = self.categories.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(categories) = cached.as_ref() {
            return Ok(categories.clone());
        }
        let result = self.call("wp.getCategories", self.auth())?;
        let categories: Vec<Category> = result
            .as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(|c| {
                Some(Category {
                    name: c.member("categoryName")?.to_text()?,
                    description: c
                        .member("description")
                        .and_then(Value::to_text)
                        .unwrap_or_default(),
                })
            })
            .collect();
        *cached = Some(categories.clone());
        Ok(categories)
    }

    fn new_post(&self, post: &Post, publish: bool) -> Result<String, HostError> {
        let mut params = self.auth();
        params.push(post_struct(post));
        params.push(publish.into());
        let method = match post.kind {
            PostKind::Post => "metaWeblog.newPost",
            PostKind::Page => "wp.newPage",
        };
        let id = self
            .call(method, params)?
            .to_text()
            .ok_or_else(|| HostError::Malformed(format!("{method}: expected an id")))?;
        info!("Created {:?} {}", post.kind, id);
        Ok(id)
    }

    fn edit_post(&self, id: &str, post: &Post, publish: bool) -> Result<(), HostError> {
        let (method, mut params) = match post.kind {
            PostKind::Post => (
                "metaWeblog.editPost",
                vec![
                    id.into(),
                    self.username.as_str().into(),
                    self.password.as_str().into(),
                ],
            ),
            PostKind::Page => (
                "wp.editPage",
                vec![
                    self.blog_id.as_str().into(),
                    id.into(),
                    self.username.as_str().into(),
                    self.password.as_str().into(),
                ],
            ),
        };
        params.push(post_struct(post));
        params.push(publish.into());
        self.call(method, params)?;
        info!("Updated {:?} {}", post.kind, id);
        Ok(())
    }
}
