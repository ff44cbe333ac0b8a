use anyhow::{Context, Result, anyhow};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

type Transform = euclid::default::Transform2D<f64>;

use super::cmap::{unicode_map, utf16be_to_string};
use super::{GlyphItem, SourceDocument, Viewport};
use crate::error::PipelineError;

const US_LETTER: [f64; 4] = [0.0, 0.0, 612.0, 792.0];
const MAX_TREE_DEPTH: usize = 32;
const DEFAULT_GLYPH_WIDTH: f64 = 500.0;
// TJ offsets (thousandths of an em) wider than this read as a word gap
const SPACE_ADJUSTMENT: f64 = 250.0;

/// A PDF opened once and shared by extraction and geometry probing.
pub struct PdfSource {
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfSource {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        let mut document = Document::load_mem(bytes)
            .map_err(|err| PipelineError::unreadable(format!("failed to parse pdf: {}", err)))?;
        if document.is_encrypted() {
            document.decrypt("").map_err(|err| {
                PipelineError::unreadable(format!("encrypted pdf needs a password: {}", err))
            })?;
        }
        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(PipelineError::unreadable("pdf has no pages"));
        }
        Ok(Self { document, pages })
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.pages
            .get(&page)
            .copied()
            .ok_or_else(|| anyhow!("page {} out of range 1..={}", page, self.pages.len()))
    }

    /// Looks `key` up on the page and then up the page tree.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let document = &self.document;
        let mut current = document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = current.get_deref(key, document) {
                return Some(value);
            }
            current = current
                .get_deref(b"Parent", document)
                .and_then(Object::as_dict)
                .ok()?;
        }
        None
    }

    fn media_box(&self, page_id: ObjectId) -> [f64; 4] {
        let values = self
            .inherited(page_id, b"MediaBox")
            .and_then(|object| object.as_array().ok())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|value| self.document.dereference(value).ok())
                    .filter_map(|(_, value)| number(value))
                    .collect::<Vec<_>>()
            });
        match values {
            Some(values) if values.len() == 4 => [values[0], values[1], values[2], values[3]],
            _ => US_LETTER,
        }
    }

    fn rotation(&self, page_id: ObjectId) -> i64 {
        self.inherited(page_id, b"Rotate")
            .and_then(|object| object.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360)
    }

    fn page_fonts(&self, page_id: ObjectId) -> HashMap<Vec<u8>, PageFont> {
        self.document
            .get_page_fonts(page_id)
            .into_iter()
            .map(|(name, dict)| (name, self.load_font(dict)))
            .collect()
    }

    fn load_font(&self, dict: &Dictionary) -> PageFont {
        let document = &self.document;
        let name_of = |dict: &Dictionary, key: &[u8]| {
            dict.get_deref(key, document)
                .and_then(Object::as_name)
                .ok()
                .map(|name| String::from_utf8_lossy(name).into_owned())
        };
        let base_name = name_of(dict, b"BaseFont");
        let two_byte = name_of(dict, b"Subtype").as_deref() == Some("Type0");
        let encoding = match dict.get_deref(b"Encoding", document) {
            Ok(Object::Dictionary(encoding)) => name_of(encoding, b"BaseEncoding"),
            Ok(_) => name_of(dict, b"Encoding"),
            Err(_) => None,
        };
        let to_unicode = match dict.get_deref(b"ToUnicode", document) {
            Ok(Object::Stream(stream)) => {
                let data = if stream.dict.has(b"Filter") {
                    stream.decompressed_content().ok()
                } else {
                    Some(stream.content.clone())
                };
                data.and_then(|data| unicode_map(&data))
            }
            _ => None,
        };

        let mut font = PageFont {
            base_name,
            two_byte,
            encoding,
            to_unicode,
            first_char: 0,
            widths: Vec::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
        };
        if two_byte {
            let descendant_width = dict
                .get_deref(b"DescendantFonts", document)
                .and_then(Object::as_array)
                .ok()
                .and_then(|array| array.first())
                .and_then(|first| document.dereference(first).ok())
                .and_then(|(_, descendant)| descendant.as_dict().ok())
                .and_then(|descendant| descendant.get_deref(b"DW", document).ok())
                .and_then(number);
            if let Some(width) = descendant_width {
                font.default_width = width;
            }
        } else {
            font.first_char = dict
                .get_deref(b"FirstChar", document)
                .and_then(Object::as_i64)
                .ok()
                .and_then(|value| u32::try_from(value).ok())
                .unwrap_or(0);
            font.widths = dict
                .get_deref(b"Widths", document)
                .and_then(Object::as_array)
                .map(|array| {
                    array
                        .iter()
                        .map(|value| {
                            document
                                .dereference(value)
                                .ok()
                                .and_then(|(_, value)| number(value))
                                .unwrap_or(DEFAULT_GLYPH_WIDTH)
                        })
                        .collect()
                })
                .unwrap_or_default();
        }
        font
    }
}

impl SourceDocument for PdfSource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn text_items(&self, page: u32) -> Result<Vec<GlyphItem>> {
        let page_id = self.page_id(page)?;
        let raw = self
            .document
            .get_page_content(page_id)
            .with_context(|| format!("failed to read content stream of page {}", page))?;
        let content = Content::decode(&raw)
            .with_context(|| format!("failed to decode content stream of page {}", page))?;
        let fonts = self.page_fonts(page_id);
        debug!(
            "page {}: {} operations, {} fonts",
            page,
            content.operations.len(),
            fonts.len()
        );
        let mut interpreter = TextInterpreter::new(&fonts);
        for operation in &content.operations {
            interpreter.apply(operation);
        }
        Ok(interpreter.items)
    }

    fn viewport(&self, page: u32, scale: f64) -> Result<Viewport> {
        let page_id = self.page_id(page)?;
        let [llx, lly, urx, ury] = self.media_box(page_id);
        let width = (urx - llx).abs() * scale;
        let height = (ury - lly).abs() * scale;
        Ok(match self.rotation(page_id) {
            90 | 270 => Viewport {
                width: height,
                height: width,
            },
            _ => Viewport { width, height },
        })
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(*value as f64),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct PageFont {
    base_name: Option<String>,
    two_byte: bool,
    encoding: Option<String>,
    to_unicode: Option<HashMap<u32, String>>,
    first_char: u32,
    widths: Vec<f64>,
    default_width: f64,
}

impl PageFont {
    fn unknown() -> Self {
        Self {
            base_name: None,
            two_byte: false,
            encoding: None,
            to_unicode: None,
            first_char: 0,
            widths: Vec::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
        }
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]) as u32)
                .collect()
        } else {
            bytes.iter().map(|byte| *byte as u32).collect()
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if self.to_unicode.is_none() && bytes.starts_with(&[0xFE, 0xFF]) {
            if let Some(text) = utf16be_to_string(&bytes[2..]) {
                return text;
            }
        }
        let Some(map) = &self.to_unicode else {
            if self.two_byte {
                return String::new();
            }
            return Document::decode_text(self.encoding.as_deref(), bytes);
        };
        let mut text = String::new();
        for code in self.codes(bytes) {
            match map.get(&code) {
                Some(mapped) => text.push_str(mapped),
                None if !self.two_byte => {
                    text.push_str(&Document::decode_text(self.encoding.as_deref(), &[code as u8]))
                }
                None => {}
            }
        }
        text
    }

    /// Glyph advance in thousandths of an em.
    fn advance(&self, code: u32) -> f64 {
        code.checked_sub(self.first_char)
            .and_then(|index| self.widths.get(index as usize))
            .copied()
            .filter(|width| *width > 0.0)
            .unwrap_or(self.default_width)
    }
}

fn matrix_from_operands(operands: &[Object]) -> Option<Transform> {
    match operands {
        [a, b, c, d, e, f] => Some(Transform::new(
            number(a)?,
            number(b)?,
            number(c)?,
            number(d)?,
            number(e)?,
            number(f)?,
        )),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Transform,
    font: Option<Vec<u8>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scaling: f64,
    leading: f64,
    rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Transform::identity(),
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// Replays the text operators of one content stream into glyph items.
struct TextInterpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, PageFont>,
    unknown_font: PageFont,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    tm: Transform,
    tlm: Transform,
    items: Vec<GlyphItem>,
}

impl<'a> TextInterpreter<'a> {
    fn new(fonts: &'a HashMap<Vec<u8>, PageFont>) -> Self {
        Self {
            fonts,
            unknown_font: PageFont::unknown(),
            state: GraphicsState::default(),
            saved: Vec::new(),
            tm: Transform::identity(),
            tlm: Transform::identity(),
            items: Vec::new(),
        }
    }

    fn operand(operation: &Operation, index: usize) -> Option<f64> {
        operation.operands.get(index).and_then(number)
    }

    fn apply(&mut self, operation: &Operation) {
        match operation.operator.as_str() {
            "q" => self.saved.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.saved.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(matrix) = matrix_from_operands(&operation.operands) {
                    self.state.ctm = matrix.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.tm = Transform::identity();
                self.tlm = Transform::identity();
            }
            "Tf" => {
                self.state.font = operation
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .map(|name| name.to_vec());
                if let Some(size) = Self::operand(operation, 1) {
                    self.state.font_size = size;
                }
            }
            "Tc" => {
                if let Some(value) = Self::operand(operation, 0) {
                    self.state.char_spacing = value;
                }
            }
            "Tw" => {
                if let Some(value) = Self::operand(operation, 0) {
                    self.state.word_spacing = value;
                }
            }
            "Tz" => {
                if let Some(value) = Self::operand(operation, 0) {
                    self.state.horizontal_scaling = value / 100.0;
                }
            }
            "TL" => {
                if let Some(value) = Self::operand(operation, 0) {
                    self.state.leading = value;
                }
            }
            "Ts" => {
                if let Some(value) = Self::operand(operation, 0) {
                    self.state.rise = value;
                }
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) =
                    (Self::operand(operation, 0), Self::operand(operation, 1))
                {
                    if operation.operator == "TD" {
                        self.state.leading = -ty;
                    }
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(matrix) = matrix_from_operands(&operation.operands) {
                    self.tm = matrix;
                    self.tlm = matrix;
                }
            }
            "T*" => self.next_line(),
            "Tj" => self.show(&operation.operands[..operation.operands.len().min(1)]),
            "'" => {
                self.next_line();
                self.show(&operation.operands[..operation.operands.len().min(1)]);
            }
            "\"" => {
                if let (Some(word), Some(character)) =
                    (Self::operand(operation, 0), Self::operand(operation, 1))
                {
                    self.state.word_spacing = word;
                    self.state.char_spacing = character;
                }
                self.next_line();
                if let Some(text) = operation.operands.get(2) {
                    self.show(std::slice::from_ref(text));
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = operation.operands.first() {
                    self.show(parts);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Transform::translation(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, parts: &[Object]) {
        let font = self
            .state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.unknown_font);
        let size = self.state.font_size;
        let scaling = self.state.horizontal_scaling;
        let start = self.tm;

        let mut text = String::new();
        let mut advance = 0.0;
        let mut saw_string = false;
        for part in parts {
            match part {
                Object::String(bytes, _) => {
                    saw_string = true;
                    text.push_str(&font.decode(bytes));
                    for code in font.codes(bytes) {
                        let mut spacing = self.state.char_spacing;
                        if !font.two_byte && code == 32 {
                            spacing += self.state.word_spacing;
                        }
                        advance += (font.advance(code) / 1000.0 * size + spacing) * scaling;
                    }
                }
                other => {
                    if let Some(adjustment) = number(other) {
                        advance -= adjustment / 1000.0 * size * scaling;
                        if adjustment < -SPACE_ADJUSTMENT
                            && !text.is_empty()
                            && !text.ends_with(char::is_whitespace)
                        {
                            text.push(' ');
                        }
                    }
                }
            }
        }
        if !saw_string {
            return;
        }

        let user = start.then(&self.state.ctm);
        let rendering =
            Transform::new(size * scaling, 0.0, 0.0, size, 0.0, self.state.rise).then(&user);
        self.items.push(GlyphItem {
            text,
            transform: rendering.to_array().to_vec(),
            width: Some(advance * user.m11.hypot(user.m12)),
            height: Some(rendering.m21.hypot(rendering.m22)),
            font_name: font.base_name.clone(),
        });
        self.tm = Transform::translation(advance, 0.0).then(&self.tm);
    }
}
