//! Hoptoad v2 XML notices.
//!
//! ```xml
//! <notice version="2.0">
//!   <api-key>--- {:project: shop, :tracker: Bug, :api_key: secret}</api-key>
//!   <error>
//!     <class>RuntimeError</class>
//!     <message>RuntimeError: boom</message>
//!     <backtrace>
//!       <line method="index" file="[PROJECT_ROOT]/app/x.rb" number="6"/>
//!     </backtrace>
//!   </error>
//!   <request>
//!     <url>https://shop.example/</url>
//!     <params><var key="action">index</var></params>
//!     <session><var key="user_id">7</var></session>
//!   </request>
//!   <server-environment>
//!     <environment-name>production</environment-name>
//!   </server-environment>
//! </notice>
//! ```
//!
//! The document is first read into a small element tree, then mapped onto
//! the canonical notice. Element values become strings; `<var key=..>`
//! children become mappings keyed by their `key` attribute.
//!
//! Text is kept as sent: `<message>` and parameter values reach the notice
//! verbatim, only the class and the api-key mapping are trimmed.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde_json::Value;
use tracing::warn;

use super::routing::parse_routing;
use super::{DecodeError, Decoder, body_text};
use crate::model::notice::{Frame, Notice, Params};

/// Decoder for the Hoptoad v2 XML protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Decoder;

/// Deepest element nesting accepted, counting `<notice>` itself.
pub const MAX_DEPTH: usize = 64;

impl Decoder for V2Decoder {
    fn decode(&self, body: &[u8]) -> Result<Notice, DecodeError> {
        let root = parse_tree(body_text(body)?)?;
        if root.name != "notice" {
            return Err(DecodeError::Shape(format!(
                "expected <notice> root element, found <{}>",
                root.name
            )));
        }
        notice_from_tree(&root)
    }
}

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }
}

fn syntax(err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Syntax(err.to_string())
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, DecodeError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(syntax)?
        .to_string();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(syntax)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(syntax)?
            .to_string();
        let value = attr.unescape_value().map_err(syntax)?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

fn parse_tree(xml: &str) -> Result<Element, DecodeError> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(syntax)? {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(DecodeError::Shape(format!(
                        "elements nested deeper than {MAX_DEPTH} levels"
                    )));
                }
                stack.push(open_element(&start)?);
            }
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DecodeError::Syntax("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(syntax)?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let raw = data.into_inner();
                    top.text.push_str(std::str::from_utf8(&raw).map_err(syntax)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DecodeError::Syntax("document ended inside an element".into()));
    }
    root.ok_or_else(|| DecodeError::Syntax("document has no root element".into()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DecodeError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(DecodeError::Syntax("multiple root elements".into()))
    }
}

// ---------------------------------------------------------------------------
// Tree -> Notice
// ---------------------------------------------------------------------------

fn notice_from_tree(root: &Element) -> Result<Notice, DecodeError> {
    let routing = parse_routing(root.child_text("api-key").unwrap_or_default().trim())?;

    let error = root
        .child("error")
        .ok_or(DecodeError::MissingField("error"))?;
    let error_class = error.child_text("class").unwrap_or_default().trim();
    if error_class.is_empty() {
        return Err(DecodeError::MissingField("error.class"));
    }

    let backtrace = error
        .child("backtrace")
        .map(|bt| {
            bt.children
                .iter()
                .filter(|c| c.name == "line")
                .filter_map(frame_from_line)
                .collect()
        })
        .unwrap_or_default();

    let mut request = root.child("request").map(mapping_of).unwrap_or_default();
    let session = match root.child("session") {
        Some(session) => mapping_of(session),
        None => match request.remove("session") {
            Some(Value::Object(map)) => map,
            _ => Params::new(),
        },
    };

    Ok(Notice {
        error_class: error_class.to_string(),
        error_message: error.child_text("message").unwrap_or_default().to_string(),
        backtrace,
        request,
        session,
        server_environment: root
            .child("server-environment")
            .map(mapping_of)
            .unwrap_or_default(),
        environment: root.child("environment").map(mapping_of).unwrap_or_default(),
        environment_name: routing.environment.clone().unwrap_or_default(),
        routing,
    })
}

fn frame_from_line(line: &Element) -> Option<Frame> {
    let number = line.attribute("number").unwrap_or_default();
    let Ok(number) = number.trim().parse::<u32>() else {
        warn!(
            file = line.attribute("file").unwrap_or_default(),
            number, "dropping backtrace line with unparseable line number"
        );
        return None;
    };
    Some(Frame::new(
        line.attribute("file").unwrap_or_default(),
        number,
        line.attribute("method").unwrap_or_default(),
    ))
}

/// Children of `element` as a mapping.
fn mapping_of(element: &Element) -> Params {
    let mut map = Params::new();
    for child in &element.children {
        if child.name == "var" {
            let key = child.attribute("key").unwrap_or_default().to_string();
            map.insert(key, value_of(child));
        } else {
            map.insert(child.name.clone(), value_of(child));
        }
    }
    map
}

/// Leaf text verbatim; a leaf holding only layout whitespace is empty.
fn value_of(element: &Element) -> Value {
    if element.children.is_empty() {
        if element.text.trim().is_empty() {
            return Value::String(String::new());
        }
        Value::String(element.text.clone())
    } else {
        Value::Object(mapping_of(element))
    }
}
