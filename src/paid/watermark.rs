//! "PAGO" stamp drawn over every page of an invoice PDF.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

/// US Letter, used when a page declares no media box.
const LETTER: (f32, f32) = (612.0, 792.0);
const FONT_SIZE: i64 = 120;
const ALPHA: f32 = 0.3;
const FONT_KEY: &str = "WmPagoF";
const STATE_KEY: &str = "WmPagoGS";
/// Resources and media boxes can be inherited from the page tree.
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF has no pages")]
    NoPages,
}

/// Turns an invoice PDF into its paid variant. CPU-bound; callers run it
/// off the async executor.
pub trait Watermarker: Send + Sync {
    fn apply(&self, pdf: &[u8]) -> Result<Vec<u8>, WatermarkError>;
}

/// Red diagonal "PAGO / SOL ONLINE" text at 30% opacity, centered on
/// each page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaidStamp;

impl Watermarker for PaidStamp {
    fn apply(&self, pdf: &[u8]) -> Result<Vec<u8>, WatermarkError> {
        let mut doc = Document::load_mem(pdf)?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(WatermarkError::NoPages);
        }

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let state_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(ALPHA),
            "CA" => Object::Real(ALPHA),
        });
        let save_id = doc.add_object(Stream::new(
            Dictionary::new(),
            Content {
                operations: vec![Operation::new("q", vec![])],
            }
            .encode()?,
        ));

        for page_id in pages {
            let (width, height) = media_size(&doc, page_id);
            let stamp = stamp_content(width / 2.0, height / 2.0).encode()?;
            let stamp_id = doc.add_object(Stream::new(Dictionary::new(), stamp));

            let mut resources = inherited_dict(&doc, page_id, b"Resources");
            add_resource(&doc, &mut resources, b"Font", FONT_KEY, font_id);
            add_resource(&doc, &mut resources, b"ExtGState", STATE_KEY, state_id);

            // Existing streams run inside q..Q; the stamp starts from the
            // default graphics state.
            let mut contents = vec![Object::Reference(save_id)];
            contents.extend(page_contents(&doc, page_id)?);
            contents.push(Object::Reference(stamp_id));

            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            page.set("Resources", Object::Dictionary(resources));
            page.set("Contents", Object::Array(contents));
        }

        let mut out = Vec::with_capacity(pdf.len() + 1024);
        doc.save_to(&mut out)?;
        Ok(out)
    }
}

fn stamp_content(center_x: f32, center_y: f32) -> Content {
    let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();
    let text = |x: i64, y: i64, s: &str| {
        vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(FONT_KEY.into()), Object::Integer(FONT_SIZE)],
            ),
            Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]),
            Operation::new("Tj", vec![Object::string_literal(s)]),
            Operation::new("ET", vec![]),
        ]
    };

    let mut operations = vec![
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(STATE_KEY.into())]),
        Operation::new(
            "rg",
            vec![Object::Real(1.0), Object::Real(0.0), Object::Real(0.0)],
        ),
        Operation::new(
            "cm",
            vec![
                Object::Real(cos),
                Object::Real(sin),
                Object::Real(-sin),
                Object::Real(cos),
                Object::Real(center_x),
                Object::Real(center_y),
            ],
        ),
    ];
    operations.extend(text(-120, 50, "PAGO"));
    operations.extend(text(-370, -50, "SOL ONLINE"));
    operations.push(Operation::new("Q", vec![]));
    Content { operations }
}

/// Follow `Parent` links until `key` is found, resolving references.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value).clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn inherited_dict(doc: &Document, page_id: ObjectId, key: &[u8]) -> Dictionary {
    match inherited(doc, page_id, key) {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn media_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let Some(Object::Array(bounds)) = inherited(doc, page_id, b"MediaBox") else {
        return LETTER;
    };
    let numbers: Vec<f32> = bounds
        .iter()
        .filter_map(|n| match resolve(doc, n) {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        })
        .collect();
    match numbers.as_slice() {
        [x0, y0, x1, y1] if x1 > x0 && y1 > y0 => (x1 - x0, y1 - y0),
        _ => LETTER,
    }
}

/// Insert `name -> id` into the `category` sub-dictionary, inlining it.
fn add_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    name: &str,
    id: ObjectId,
) {
    let mut entries = match resources.get(category).map(|o| resolve(doc, o)) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    entries.set(name, Object::Reference(id));
    resources.set(category, Object::Dictionary(entries));
}

fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, WatermarkError> {
    let page = doc.get_dictionary(page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(object @ Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![object.clone()],
        },
        Ok(Object::Array(items)) => items.clone(),
        Ok(object @ Object::Stream(_)) => vec![object.clone()],
        _ => Vec::new(),
    };
    Ok(contents)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// A one-page PDF whose resources and media box live on the page tree
    /// root, the way many generators write them.
    pub(crate) fn sample_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 48.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal("Fatura")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    /// Appends a marker instead of rendering, and counts calls.
    #[derive(Default)]
    pub(crate) struct FakeStamp {
        pub(crate) calls: AtomicUsize,
    }

    impl Watermarker for FakeStamp {
        fn apply(&self, pdf: &[u8]) -> Result<Vec<u8>, WatermarkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = pdf.to_vec();
            out.extend_from_slice(b"%PAGO");
            Ok(out)
        }
    }
}
