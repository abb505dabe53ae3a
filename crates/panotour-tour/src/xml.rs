//! Owned XML tree.
//!
//! The tour document is small and rewritten in full on every change, so it is
//! parsed into plain owned nodes rather than kept as borrowed events.
//! Whitespace-only text between elements is dropped on read and the writer
//! re-indents with two spaces. Other text is kept verbatim.
//!
//! Attribute values escape `\t`, `\n` and `\r` as character references so
//! any conforming parser reads them back unchanged. Characters XML 1.0 does
//! not allow are refused with [`TourError::IllegalChar`].

use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::TourError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

/// An element with attributes kept in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn first_child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.name == name)
    }
}

/// `<?xml ...?>` declaration, kept only when the source had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

#[derive(Debug)]
pub(crate) struct ParsedXml {
    pub decl: Option<XmlDecl>,
    pub root: XmlElement,
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn syntax(position: usize, source: quick_xml::Error) -> TourError {
    TourError::Syntax { position, source }
}

fn read_decl(decl: &BytesDecl<'_>, position: usize) -> Result<XmlDecl, TourError> {
    let version = decl.version().map_err(|e| syntax(position, e.into()))?;
    let encoding = decl
        .encoding()
        .transpose()
        .map_err(|e| syntax(position, e.into()))?;
    let standalone = decl
        .standalone()
        .transpose()
        .map_err(|e| syntax(position, e.into()))?;
    Ok(XmlDecl {
        version: lossy(&version),
        encoding: encoding.as_deref().map(lossy),
        standalone: standalone.as_deref().map(lossy),
    })
}

fn element_from_start(start: &BytesStart<'_>, position: usize) -> Result<XmlElement, TourError> {
    let mut element = XmlElement::new(lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| syntax(position, e.into()))?;
        let value = attr.unescape_value().map_err(|e| syntax(position, e))?;
        element
            .attributes
            .push((lossy(attr.key.as_ref()), value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), TourError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if let Some(existing) = root.as_ref() {
        return Err(TourError::Malformed(format!(
            "second root element `{}` after `{}`",
            element.name, existing.name
        )));
    }
    *root = Some(element);
    Ok(())
}

pub(crate) fn parse_document(xml: &str) -> Result<ParsedXml, TourError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut decl = None;
    let mut root: Option<XmlElement> = None;
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| syntax(reader.buffer_position(), e))?;
        let position = reader.buffer_position();
        match event {
            Event::Decl(d) => decl = Some(read_decl(&d, position)?),
            Event::Start(start) => stack.push(element_from_start(&start, position)?),
            Event::Empty(start) => {
                let element = element_from_start(&start, position)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    TourError::Malformed(format!("unexpected closing tag at byte {position}"))
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if text.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                if let Some(parent) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| syntax(position, e))?;
                    if !text.is_empty() {
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::CData(lossy(&data.into_inner())));
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Comment(lossy(&comment.into_inner())));
                }
            }
            Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.last() {
        return Err(TourError::Malformed(format!("unclosed element `{}`", open.name)));
    }
    let root = root.ok_or(TourError::MissingRoot)?;
    Ok(ParsedXml { decl, root })
}

/// Tab, newline, carriage return, and the ranges XML 1.0 calls `Char`.
fn is_xml_char(ch: char) -> bool {
    matches!(
        ch,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

fn check_chars(text: &str) -> Result<(), TourError> {
    match text.chars().find(|&ch| !is_xml_char(ch)) {
        Some(ch) => Err(TourError::IllegalChar { code: ch as u32 }),
        None => Ok(()),
    }
}

fn escape_attr_value(value: &str) -> Result<String, TourError> {
    check_chars(value)?;
    let mut out = String::with_capacity(value.len());
    for ch in escape(value).chars() {
        match ch {
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Only `<`, `>` and `&` are escaped in text, so script bodies keep their
/// quotes. `\r` becomes a reference since parsers fold it into `\n`.
fn escape_text(text: &str) -> Result<Cow<'_, str>, TourError> {
    check_chars(text)?;
    let escaped = partial_escape(text);
    if escaped.contains('\r') {
        Ok(Cow::Owned(escaped.replace('\r', "&#xD;")))
    } else {
        Ok(escaped)
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), TourError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        let value = escape_attr_value(value)?;
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Owned(value.into_bytes()),
        });
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(el) => write_element(writer, el)?,
            XmlNode::Text(text) => {
                writer.write_event(Event::Text(BytesText::from_escaped(escape_text(text)?)))?
            }
            XmlNode::CData(data) => {
                check_chars(data)?;
                writer.write_event(Event::CData(BytesCData::new(data.as_str())))?
            }
            XmlNode::Comment(comment) => {
                check_chars(comment)?;
                writer.write_event(Event::Comment(BytesText::from_escaped(Cow::Borrowed(
                    comment.as_str(),
                ))))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

pub(crate) fn write_document(decl: Option<&XmlDecl>, root: &XmlElement) -> Result<String, TourError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    if let Some(decl) = decl {
        writer.write_event(Event::Decl(BytesDecl::new(
            &decl.version,
            decl.encoding.as_deref(),
            decl.standalone.as_deref(),
        )))?;
    }
    write_element(&mut writer, root)?;

    let mut out = String::from_utf8(writer.into_inner())?;
    out.push('\n');
    Ok(out)
}
