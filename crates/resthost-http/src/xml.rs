//! XML codec over structured values.
//!
//! Maps between `serde_json::Value` and a plain element-per-field XML
//! shape:
//!
//! ```text
//! {"id": 7, "tags": ["a", "b"]}
//! ```
//!
//! becomes
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <response><id>7</id><tags><item>a</item><item>b</item></tags></response>
//! ```
//!
//! On the way in, leaf elements decode as strings and repeated sibling
//! names collapse into arrays; the binding stage treats all parameter
//! values as strings anyway.

use bytes::Bytes;
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

use resthost_model::{HostError, HostResult};

use crate::codecs::{Deserializer, Serializer};

/// Root element wrapping serialized response values.
const ROOT_ELEMENT: &str = "response";

/// Element name used for array items.
const ITEM_ELEMENT: &str = "item";

/// Built-in XML codec backed by `quick-xml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl Serializer for XmlCodec {
    fn serialize(&self, value: &Value) -> HostResult<Bytes> {
        let mut buf = Vec::with_capacity(256);
        let mut writer = Writer::new(&mut buf);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(ser_err)?;

        write_element(&mut writer, ROOT_ELEMENT, value)?;
        Ok(Bytes::from(buf))
    }
}

impl Deserializer for XmlCodec {
    fn deserialize(&self, body: &[u8]) -> HostResult<Value> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text(true);

        // Skip the declaration and any prolog content up to the root.
        loop {
            match reader.read_event().map_err(de_err)? {
                Event::Start(_) => return read_element(&mut reader),
                Event::Eof => return Err(HostError::binding("XML body has no root element")),
                _ => {}
            }
        }
    }
}

fn ser_err(e: impl std::fmt::Display) -> HostError {
    HostError::pipeline(format!("XML serialization failed: {e}"))
}

fn de_err(e: impl std::fmt::Display) -> HostError {
    HostError::binding(format!("invalid XML body: {e}"))
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &Value,
) -> HostResult<()> {
    if !is_valid_element_name(name) {
        return Err(ser_err(format!("invalid XML element name {name:?}")));
    }

    match value {
        Value::Null => {
            writer.create_element(name).write_empty().map_err(ser_err)?;
        }
        Value::Bool(b) => write_text(writer, name, if *b { "true" } else { "false" })?,
        Value::Number(n) => write_text(writer, name, &n.to_string())?,
        Value::String(s) => write_text(writer, name, s)?,
        Value::Array(items) => {
            writer
                .create_element(name)
                .write_inner_content(|w| {
                    for item in items {
                        write_element(w, ITEM_ELEMENT, item)
                            .map_err(|e| std::io::Error::other(e.to_string()))?;
                    }
                    Ok::<_, std::io::Error>(())
                })
                .map_err(ser_err)?;
        }
        Value::Object(fields) => {
            writer
                .create_element(name)
                .write_inner_content(|w| {
                    for (key, field) in fields {
                        write_element(w, key, field)
                            .map_err(|e| std::io::Error::other(e.to_string()))?;
                    }
                    Ok::<_, std::io::Error>(())
                })
                .map_err(ser_err)?;
        }
    }
    Ok(())
}

fn write_text<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> HostResult<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))
        .map_err(ser_err)?;
    Ok(())
}

fn is_valid_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Read the current element's content. The reader is positioned just after
/// its `Start` event; the matching `End` event is consumed.
fn read_element(reader: &mut Reader<&[u8]>) -> HostResult<Value> {
    let mut text = String::new();
    let mut children: Vec<(String, Value)> = Vec::new();

    loop {
        match reader.read_event().map_err(de_err)? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                children.push((name, read_element(reader)?));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                children.push((name, Value::Null));
            }
            Event::Text(t) => {
                let decoded = t.decode().map_err(de_err)?;
                let unescaped = quick_xml::escape::unescape(&decoded).map_err(de_err)?;
                text.push_str(&unescaped);
            }
            Event::End(_) => break,
            Event::Eof => return Err(HostError::binding("unexpected end of XML body")),
            _ => {}
        }
    }

    if children.is_empty() {
        return Ok(Value::String(text));
    }

    // Repeated <item> children read back as an array.
    if children.iter().all(|(name, _)| name == ITEM_ELEMENT) {
        return Ok(Value::Array(children.into_iter().map(|(_, v)| v).collect()));
    }

    let mut fields = Map::new();
    for (name, value) in children {
        match fields.get_mut(&name) {
            Some(Value::Array(existing)) => existing.push(value),
            Some(_) => {
                let prior = fields.remove(&name).unwrap_or(Value::Null);
                fields.insert(name, Value::Array(vec![prior, value]));
            }
            None => {
                fields.insert(name, value);
            }
        }
    }
    Ok(Value::Object(fields))
}
