//! Minimal XML document model used for template configuration files.
//!
//! Documents are parsed into an owned element tree, mutated in place and
//! written back out. Only attribute values of existing elements are ever
//! changed, structure is never created.
//!
//! Elements are addressed with a small subset of the ElementTree path syntax:
//!
//! - `.` the root element
//! - `.//tag` first descendant named `tag`, at any depth
//! - `tag/child` or `./tag/child` direct children
//! - `*` any element name
//! - `[@attr]` and `[@attr='value']` attribute predicates
//!
//! When a path matches more than one element the first one in document
//! order is used.

use std::fmt;
use std::path::Path as FsPath;
use std::str::FromStr;

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

fn xml_err(e: impl fmt::Display) -> Error {
    Error::XmlError(e.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Element {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrites an existing attribute. Returns false if the element
    /// doesn't have it.
    pub fn set_existing_attr(&mut self, name: &str, value: &str) -> bool {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => {
                *v = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Child elements along with their index in `children`.
    pub fn child_elements(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.children.iter().enumerate().filter_map(|(i, n)| match n {
            Node::Element(e) => Some((i, e)),
            _ => None,
        })
    }

    fn at(&self, idx: &[usize]) -> Option<&Element> {
        match idx.split_first() {
            None => Some(self),
            Some((first, rest)) => match self.children.get(*first) {
                Some(Node::Element(e)) => e.at(rest),
                _ => None,
            },
        }
    }

    fn at_mut(&mut self, idx: &[usize]) -> Option<&mut Element> {
        match idx.split_first() {
            None => Some(self),
            Some((first, rest)) => match self.children.get_mut(*first) {
                Some(Node::Element(e)) => e.at_mut(rest),
                _ => None,
            },
        }
    }

    fn collect_descendants(&self, base: &[usize], step: &Step, out: &mut Vec<Vec<usize>>) {
        for (i, child) in self.child_elements() {
            let mut idx = base.to_vec();
            idx.push(i);
            if step.matches(child) {
                out.push(idx.clone());
            }
            child.collect_descendants(&idx, step, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    attr: String,
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    descendant: bool,
    /// `None` matches any element name
    tag: Option<String>,
    predicate: Option<Predicate>,
}

impl Step {
    fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if &el.name != tag {
                return false;
            }
        }
        match &self.predicate {
            None => true,
            Some(p) => match (el.attr(&p.attr), &p.value) {
                (Some(_), None) => true,
                (Some(v), Some(expected)) => v == expected,
                (None, _) => false,
            },
        }
    }
}

/// Parsed element path.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    raw: String,
    steps: Vec<Step>,
}

impl Path {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn parse_step(raw: &str, token: &str, descendant: bool) -> Result<Step> {
        let bad = |reason: &str| Error::XmlError(format!("bad path `{}`: {}", raw, reason));
        let (name, predicate) = match token.find('[') {
            Some(start) => {
                let inner = token[start..]
                    .strip_prefix("[@")
                    .and_then(|s| s.strip_suffix(']'))
                    .ok_or_else(|| bad("expected `[@attr]` or `[@attr='value']` predicate"))?;
                let predicate = match inner.find('=') {
                    Some(eq) => {
                        let value = &inner[eq + 1..];
                        let value = value
                            .strip_prefix('\'')
                            .and_then(|v| v.strip_suffix('\''))
                            .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                            .ok_or_else(|| bad("predicate value must be quoted"))?;
                        Predicate {
                            attr: inner[..eq].to_string(),
                            value: Some(value.to_string()),
                        }
                    }
                    None => Predicate {
                        attr: inner.to_string(),
                        value: None,
                    },
                };
                (&token[..start], Some(predicate))
            }
            None => (token, None),
        };
        if name.is_empty() {
            return Err(bad("empty step"));
        }
        Ok(Step {
            descendant,
            tag: if name == "*" {
                None
            } else {
                Some(name.to_string())
            },
            predicate,
        })
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let mut rest = raw.trim();
        if rest.starts_with('.') && !rest.starts_with("..") {
            rest = &rest[1..];
        }
        let mut steps = Vec::new();
        let mut first = true;
        while !rest.is_empty() {
            let descendant = if rest.starts_with("//") {
                rest = &rest[2..];
                true
            } else if rest.starts_with('/') {
                rest = &rest[1..];
                false
            } else if first {
                false
            } else {
                return Err(Error::XmlError(format!("bad path `{}`", raw)));
            };
            first = false;
            // step ends at the next slash outside of a predicate
            let mut depth = 0;
            let mut end = rest.len();
            for (i, c) in rest.char_indices() {
                match c {
                    '[' => depth += 1,
                    ']' => depth -= 1,
                    '/' if depth == 0 => {
                        end = i;
                        break;
                    }
                    _ => (),
                }
            }
            steps.push(Path::parse_step(raw, &rest[..end], descendant)?);
            rest = &rest[end..];
        }
        Ok(Path {
            raw: raw.to_string(),
            steps,
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Declaration {
    version: String,
    encoding: Option<String>,
    standalone: Option<String>,
}

/// Owned XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    decl: Option<Declaration>,
    root: Element,
}

impl Document {
    pub fn from_path(path: impl AsRef<FsPath>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Document::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut decl = None;
        let mut root: Option<Element> = None;
        let mut stack: Vec<Element> = Vec::new();

        loop {
            let event = reader.read_event().map_err(xml_err)?;
            match event {
                Event::Decl(d) => {
                    let version = String::from_utf8_lossy(&d.version().map_err(xml_err)?).into_owned();
                    let encoding = match d.encoding() {
                        Some(e) => Some(String::from_utf8_lossy(&e.map_err(xml_err)?).into_owned()),
                        None => None,
                    };
                    let standalone = match d.standalone() {
                        Some(s) => Some(String::from_utf8_lossy(&s.map_err(xml_err)?).into_owned()),
                        None => None,
                    };
                    decl = Some(Declaration {
                        version,
                        encoding,
                        standalone,
                    });
                }
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| Error::XmlError("unexpected closing tag".to_string()))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Text(t.unescape().map_err(xml_err)?.into_owned()));
                    }
                }
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::CData(String::from_utf8_lossy(&c).into_owned()));
                    }
                }
                Event::Comment(c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Comment(String::from_utf8_lossy(&c).into_owned()));
                    }
                }
                Event::Eof => break,
                _ => (),
            }
        }
        if !stack.is_empty() {
            return Err(Error::XmlError(format!(
                "unclosed element `{}`",
                stack[stack.len() - 1].name
            )));
        }
        let root = root.ok_or_else(|| Error::XmlError("document has no root element".to_string()))?;
        Ok(Document { decl, root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Child index paths of all elements matching the path, in document
    /// order.
    fn select(&self, path: &Path) -> Vec<Vec<usize>> {
        let mut current: Vec<Vec<usize>> = vec![Vec::new()];
        for step in &path.steps {
            let mut next = Vec::new();
            for idx in &current {
                let el = match self.root.at(idx) {
                    Some(el) => el,
                    None => continue,
                };
                if step.descendant {
                    el.collect_descendants(idx, step, &mut next);
                } else {
                    for (i, child) in el.child_elements() {
                        if step.matches(child) {
                            let mut child_idx = idx.clone();
                            child_idx.push(i);
                            next.push(child_idx);
                        }
                    }
                }
            }
            // lexicographic order of index paths is document order
            next.sort();
            next.dedup();
            current = next;
        }
        current
    }

    /// First element matching the path.
    pub fn find(&self, path: &Path) -> Option<&Element> {
        let idx = self.select(path).into_iter().next()?;
        self.root.at(&idx)
    }

    pub fn find_mut(&mut self, path: &Path) -> Option<&mut Element> {
        let idx = self.select(path).into_iter().next()?;
        self.root.at_mut(&idx)
    }

    /// Overwrites an existing attribute of the first element matching the
    /// path. Returns false, leaving the document untouched, if either the
    /// element or the attribute doesn't exist.
    pub fn set_attr(&mut self, path: &str, attr: &str, value: &str) -> Result<bool> {
        let path = path.parse::<Path>()?;
        Ok(match self.find_mut(&path) {
            Some(el) => el.set_existing_attr(attr, value),
            None => false,
        })
    }

    pub fn get_attr(&self, path: &str, attr: &str) -> Result<Option<&str>> {
        let path = path.parse::<Path>()?;
        Ok(self.find(&path).and_then(|el| el.attr(attr)))
    }

    /// Serializes the document. Output only depends on the document
    /// contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        if let Some(decl) = &self.decl {
            writer
                .write_event(Event::Decl(BytesDecl::new(
                    &decl.version,
                    decl.encoding.as_deref(),
                    decl.standalone.as_deref(),
                )))
                .map_err(xml_err)?;
        }
        write_element(&mut writer, &self.root)?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn write(&self, path: impl AsRef<FsPath>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_bytes()?)?;
        Ok(())
    }
}

fn element_from_start(e: &BytesStart) -> Result<Element> {
    let mut el = Element::new(&String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, el: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => {
            if root.is_some() {
                return Err(Error::XmlError(format!(
                    "more than one root element, found `{}`",
                    el.name
                )));
            }
            *root = Some(el);
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        return Ok(());
    }
    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(xml_err)?,
            Node::CData(t) => writer
                .write_event(Event::CData(BytesCData::new(t.as_str())))
                .map_err(xml_err)?,
            Node::Comment(t) => writer
                .write_event(Event::Comment(BytesText::from_escaped(t.as_str())))
                .map_err(xml_err)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(xml_err)?;
    Ok(())
}
