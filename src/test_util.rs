#[cfg(test)]
pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = HOME_MUTEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    // SAFETY: HOME is only touched while HOME_MUTEX is held.
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    unsafe {
        match old_home {
            Some(old) => std::env::set_var("HOME", old),
            None => std::env::remove_var("HOME"),
        }
    }
    result
}

#[cfg(test)]
pub(crate) struct TextSpec {
    pub text: &'static str,
    pub font: &'static str,
    pub size: i64,
    pub x: i64,
    pub y: i64,
}

#[cfg(test)]
impl TextSpec {
    pub(crate) fn new(text: &'static str, font: &'static str, size: i64, x: i64, y: i64) -> Self {
        Self {
            text,
            font,
            size,
            x,
            y,
        }
    }
}

#[cfg(test)]
pub(crate) struct PageSpec {
    pub width: i64,
    pub height: i64,
    pub texts: Vec<TextSpec>,
}

#[cfg(test)]
impl PageSpec {
    pub(crate) fn letter(texts: Vec<TextSpec>) -> Self {
        Self::sized(612, 792, texts)
    }

    pub(crate) fn sized(width: i64, height: i64, texts: Vec<TextSpec>) -> Self {
        Self {
            width,
            height,
            texts,
        }
    }
}

/// Builds a small PDF whose pages show each text with a standard Type1 font.
#[cfg(test)]
pub(crate) fn build_pdf(pages: &[PageSpec]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for page in pages {
        let mut fonts = lopdf::Dictionary::new();
        let mut operations = Vec::new();
        for (index, text) in page.texts.iter().enumerate() {
            let resource = format!("F{}", index + 1);
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => text.font,
            });
            fonts.set(resource.as_bytes().to_vec(), Object::Reference(font_id));
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(resource.into_bytes()), text.size.into()],
            ));
            operations.push(Operation::new("Td", vec![text.x.into(), text.y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(text.text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => fonts },
            "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
        });
        kids.push(Object::Reference(page_id));
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}
