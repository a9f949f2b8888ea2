//! XML Tree Module
//!
//! quick-xmlのイベントから構築する、書き戻し可能な最小限のXMLツリー。
//! 属性値とテキストはエスケープ済みの生文字列のまま保持するため、
//! 変更していない部分は元の表現で出力されます。

use quick_xml::escape::{escape, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;

use crate::error::{ReconcileError, Result};

/// ツリーのノード
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Element(Element),
    /// エスケープ済みのテキスト
    Text(String),
    /// 宣言・コメント・CDATA・処理命令など（そのまま書き戻す）
    Other(Event<'static>),
}

/// 要素
#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    /// 修飾名（例: `table:table-row`）
    pub name: String,
    /// (修飾名, エスケープ済みの値)
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ReconcileError::xml(format!("XML attribute error: {}", e)))?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = std::str::from_utf8(&attr.value)?.to_string();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    /// 名前空間接頭辞を除いた名前
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// 属性値（アンエスケープ済み）
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| unescape(v).map(|s| s.into_owned()).unwrap_or_else(|_| v.clone()))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|(k, _)| k == name)
    }

    /// 属性を設定（既存の場合は値を置き換え、位置は維持）
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let escaped = escape(value).into_owned();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = escaped,
            None => self.attributes.push((name.to_string(), escaped)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|(k, _)| k != name);
        before != self.attributes.len()
    }

    /// 条件に一致する属性をすべて削除し、削除した数を返す
    pub fn remove_attrs_where(&mut self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        let before = self.attributes.len();
        self.attributes.retain(|(k, _)| !predicate(k));
        before - self.attributes.len()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// ローカル名が一致する最初の子要素
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|el| el.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.elements_mut().find(|el| el.local_name() == local)
    }

    /// ローカル名が一致する最初の子要素の`children`内の位置
    pub fn child_position(&self, local: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, Node::Element(el) if el.local_name() == local))
    }

    /// `children`内の位置で要素を取得
    pub fn element_at(&self, position: usize) -> Option<&Element> {
        match self.children.get(position) {
            Some(Node::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn element_at_mut(&mut self, position: usize) -> Option<&mut Element> {
        match self.children.get_mut(position) {
            Some(Node::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// `children`内の位置の列をたどって子孫要素を取得
    pub fn descend(&self, path: &[usize]) -> Option<&Element> {
        path.iter().try_fold(self, |el, &position| el.element_at(position))
    }

    pub fn descend_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &position in path {
            current = current.element_at_mut(position)?;
        }
        Some(current)
    }

    pub fn push_element(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// エスケープ前の文字列をテキストノードとして追加
    pub fn push_text(&mut self, text: &str) {
        self.children.push(Node::Text(escape(text).into_owned()));
    }

    /// 子孫のテキストを連結（アンエスケープ済み）
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(raw) => out.push_str(&unescape_text(raw)),
                Node::Element(el) => el.collect_text(out),
                Node::Other(Event::CData(data)) => {
                    out.push_str(&String::from_utf8_lossy(data));
                }
                Node::Other(_) => {}
            }
        }
    }
}

/// 名前空間接頭辞を除いた名前
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// エスケープ済みテキストを復元（不正な参照はそのまま残す）
pub(crate) fn unescape_text(raw: &str) -> Cow<'_, str> {
    unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

/// XMLドキュメント（ルート要素の前後にあるノードも保持）
#[derive(Debug, Clone)]
pub(crate) struct XmlDocument {
    nodes: Vec<Node>,
}

impl XmlDocument {
    /// バイト列を解析
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(false);

        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| ReconcileError::xml(format!("XML parse error: {}", e)))?;
            let node = match event {
                Event::Start(e) => {
                    stack.push(Element::from_start(&e)?);
                    None
                }
                Event::Empty(e) => Some(Node::Element(Element::from_start(&e)?)),
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ReconcileError::xml("unbalanced end tag"))?;
                    Some(Node::Element(element))
                }
                Event::Text(e) => Some(Node::Text(std::str::from_utf8(&e)?.to_string())),
                Event::Eof => break,
                other => Some(Node::Other(other.into_owned())),
            };

            if let Some(node) = node {
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => nodes.push(node),
                }
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(ReconcileError::xml("unexpected end of document"));
        }

        let doc = Self { nodes };
        if doc.root().is_none() {
            return Err(ReconcileError::xml("document has no root element"));
        }
        Ok(doc)
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// ツリーをバイト列に書き出す
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.nodes {
            write_node(&mut writer, node)?;
        }
        Ok(writer.into_inner())
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(el) => {
            let mut start = BytesStart::new(el.name.as_str());
            for (key, value) in &el.attributes {
                // 単一引用符で囲まれていた値は`"`を含み得る
                let value: Cow<'_, str> = if value.contains('"') {
                    Cow::Owned(value.replace('"', "&quot;"))
                } else {
                    Cow::Borrowed(value.as_str())
                };
                start.push_attribute(Attribute {
                    key: QName(key.as_bytes()),
                    value: match value {
                        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
                        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
                    },
                });
            }
            if el.children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(ReconcileError::xml)?;
            } else {
                writer.write_event(Event::Start(start)).map_err(ReconcileError::xml)?;
                for child in &el.children {
                    write_node(writer, child)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(el.name.as_str())))
                    .map_err(ReconcileError::xml)?;
            }
        }
        Node::Text(raw) => {
            writer
                .write_event(Event::Text(BytesText::from_escaped(raw.as_str())))
                .map_err(ReconcileError::xml)?;
        }
        Node::Other(event) => {
            writer.write_event(event).map_err(ReconcileError::xml)?;
        }
    }
    Ok(())
}
