//! XML text form of nodes.
//!
//! ```text
//! <root>
//!   <dict name="counter">
//!     <str name="status">ISSUED</str>
//!     <int name="priority">1</int>
//!     <ref name="output_path">/products/counter</ref>
//!   </dict>
//! </root>
//! ```
//!
//! `<root>` is a dictionary without a name. Whitespace-only text between
//! elements is insignificant; the content of `<str>` is kept verbatim.
//! A document without exactly one top-level element is wrapped in a
//! synthetic `<root>` before parsing.

use crate::{CodecError, CodecResult};
use arbor_core::{MAX_DEPTH, Node, Value};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

const ROOT_TAG: &str = "root";
const NAME_ATTR: &str = "name";

/// Encode a node as a single-line XML fragment
///
/// # Errors
///
/// Returns `Malformed` if the writer fails
pub fn to_xml(node: &Node) -> CodecResult<String> {
    render(node, None)
}

/// Encode a node as indented XML, one element per line
///
/// # Errors
///
/// Returns `Malformed` if the writer fails
pub fn to_xml_pretty(node: &Node) -> CodecResult<String> {
    let mut text = render(node, Some(0))?;
    text.push('\n');
    Ok(text)
}

/// Decode an XML document into a node
///
/// # Errors
///
/// Returns `Malformed` for unknown elements, bad integers, duplicate
/// children or XML syntax errors
pub fn from_xml(text: &str) -> CodecResult<Node> {
    let body = strip_declaration(text);
    let node = if has_single_root(body)? {
        parse_document(body)?
    } else {
        parse_document(&format!("<{ROOT_TAG}>{body}</{ROOT_TAG}>"))?
    };
    node.validate().map_err(CodecError::xml)?;
    Ok(node)
}

fn render(node: &Node, indent: Option<usize>) -> CodecResult<String> {
    let mut writer = Writer::new(Vec::new());
    write_node(&mut writer, node, indent)?;
    String::from_utf8(writer.into_inner()).map_err(CodecError::xml)
}

fn tag_of(node: &Node) -> &'static str {
    match node.value() {
        Value::Dict(_) if node.name().is_empty() => ROOT_TAG,
        value => value.kind(),
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node, indent: Option<usize>) -> CodecResult<()> {
    let tag = tag_of(node);
    let mut start = BytesStart::new(tag);
    if !node.name().is_empty() {
        start.push_attribute((NAME_ATTR, node.name()));
    }

    let text = match node.value() {
        Value::Dict(children) if children.is_empty() => {
            return emit(writer, Event::Empty(start));
        }
        Value::Dict(children) => {
            emit(writer, Event::Start(start))?;
            let depth = indent.map(|d| d + 1);
            for child in children.values() {
                line_break(writer, depth)?;
                write_node(writer, child, depth)?;
            }
            line_break(writer, indent)?;
            return emit(writer, Event::End(BytesEnd::new(tag)));
        }
        Value::Str(s) if s.is_empty() => return emit(writer, Event::Empty(start)),
        Value::Str(s) => s.clone(),
        Value::Int(v) => v.to_string(),
        Value::Ref(p) => p.clone(),
    };

    emit(writer, Event::Start(start))?;
    emit(writer, Event::Text(BytesText::new(&text)))?;
    emit(writer, Event::End(BytesEnd::new(tag)))
}

fn line_break(writer: &mut Writer<Vec<u8>>, depth: Option<usize>) -> CodecResult<()> {
    match depth {
        Some(d) => {
            let ws = format!("\n{}", "  ".repeat(d));
            emit(writer, Event::Text(BytesText::from_escaped(ws)))
        }
        None => Ok(()),
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> CodecResult<()> {
    writer.write_event(event).map_err(CodecError::xml)
}

fn strip_declaration(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    text
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Does the document hold exactly one top-level element and no stray text?
fn has_single_root(text: &str) -> CodecResult<bool> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        match reader.read_event().map_err(CodecError::xml)? {
            Event::Start(_) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Empty(_) if depth == 0 => roots += 1,
            Event::Text(t) if depth == 0 && !is_blank(&t) => return Ok(false),
            Event::CData(_) if depth == 0 => return Ok(false),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(roots == 1)
}

fn parse_document(text: &str) -> CodecResult<Node> {
    let mut reader = Reader::from_str(text);
    let mut node = None;

    loop {
        match reader.read_event().map_err(CodecError::xml)? {
            Event::Start(e) if node.is_none() => {
                node = Some(parse_element(&mut reader, &e, false, 1)?);
            }
            Event::Empty(e) if node.is_none() => {
                node = Some(parse_element(&mut reader, &e, true, 1)?);
            }
            Event::Start(_) | Event::Empty(_) => {
                return Err(CodecError::xml("more than one top-level element"));
            }
            Event::Text(t) if !is_blank(&t) => {
                return Err(CodecError::xml("text outside of an element"));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    node.ok_or_else(|| CodecError::xml("document has no element"))
}

/// `depth` counts the dictionaries open once this element is entered
fn parse_element(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    empty: bool,
    depth: usize,
) -> CodecResult<Node> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let name = match start.try_get_attribute(NAME_ATTR).map_err(CodecError::xml)? {
        Some(attr) => attr.unescape_value().map_err(CodecError::xml)?.into_owned(),
        None => String::new(),
    };

    match tag.as_str() {
        ROOT_TAG | "dict" => {
            if depth > MAX_DEPTH {
                return Err(CodecError::xml(format!(
                    "dictionaries nested deeper than {}",
                    MAX_DEPTH
                )));
            }
            let mut node = Node::dict(name);
            if !empty {
                parse_children(reader, &mut node, depth)?;
            }
            Ok(node)
        }
        "str" | "int" | "ref" => {
            let text = if empty { String::new() } else { parse_text(reader, &tag)? };
            match tag.as_str() {
                "str" => Ok(Node::str(name, text)),
                "ref" => Ok(Node::reference(name, text.trim())),
                _ => {
                    let value = text
                        .trim()
                        .parse::<i32>()
                        .map_err(|e| CodecError::xml(format!("int '{}': {}", text.trim(), e)))?;
                    Ok(Node::int(name, value))
                }
            }
        }
        other => Err(CodecError::xml(format!("unknown element <{}>", other))),
    }
}

fn parse_children(reader: &mut Reader<&[u8]>, parent: &mut Node, depth: usize) -> CodecResult<()> {
    loop {
        let child = match reader.read_event().map_err(CodecError::xml)? {
            Event::Start(e) => parse_element(reader, &e, false, depth + 1)?,
            Event::Empty(e) => parse_element(reader, &e, true, depth + 1)?,
            Event::End(_) => return Ok(()),
            Event::Text(t) if is_blank(&t) => continue,
            Event::Text(_) | Event::CData(_) => {
                return Err(CodecError::xml(format!(
                    "text inside dictionary '{}'",
                    parent.name()
                )));
            }
            Event::Eof => return Err(CodecError::xml("unexpected end of document")),
            _ => continue,
        };

        if parent.child(child.name()).is_some() {
            return Err(CodecError::xml(format!(
                "duplicate child '{}' in '{}'",
                child.name(),
                parent.name()
            )));
        }
        parent.insert_child(child).map_err(CodecError::xml)?;
    }
}

fn parse_text(reader: &mut Reader<&[u8]>, tag: &str) -> CodecResult<String> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(CodecError::xml)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(CodecError::xml)?),
            Event::CData(c) => text.push_str(std::str::from_utf8(&c).map_err(CodecError::xml)?),
            Event::End(_) => return Ok(text),
            Event::Start(_) | Event::Empty(_) => {
                return Err(CodecError::xml(format!("element inside <{}>", tag)));
            }
            Event::Eof => return Err(CodecError::xml("unexpected end of document")),
            _ => {}
        }
    }
}
