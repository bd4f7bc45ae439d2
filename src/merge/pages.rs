//! Page tree helpers shared by the merger and the print normalizer.

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

/// Page attributes a page may inherit from its ancestors in the page tree.
pub const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// US Letter, used when a page carries no usable MediaBox.
pub const FALLBACK_MEDIA_BOX: Rect = Rect {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

// Guards against cyclic Parent chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// A PDF rectangle with its corners ordered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl Rect {
    /// Build a rectangle from any two opposite corners.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            llx: x0.min(x1),
            lly: y0.min(y1),
            urx: x0.max(x1),
            ury: y0.max(y1),
        }
    }

    /// Horizontal extent.
    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    /// Vertical extent.
    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }

    /// Apply `x' = s·x + tx`, `y' = s·y + ty`.
    pub fn transform(&self, scale: f32, tx: f32, ty: f32) -> Self {
        Self::from_corners(
            self.llx * scale + tx,
            self.lly * scale + ty,
            self.urx * scale + tx,
            self.ury * scale + ty,
        )
    }

    /// Encode as a PDF `[llx lly urx ury]` array.
    pub fn to_object(self) -> Object {
        Object::Array(vec![
            Object::Real(self.llx),
            Object::Real(self.lly),
            Object::Real(self.urx),
            Object::Real(self.ury),
        ])
    }
}

/// Dimensions of one page, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    /// Width in points.
    pub width: f32,
    /// Height in points.
    pub height: f32,
}

impl From<Rect> for PageSize {
    fn from(rect: Rect) -> Self {
        Self {
            width: rect.width(),
            height: rect.height(),
        }
    }
}

/// Read a rectangle entry such as `MediaBox` from `dict`, following
/// references. Returns `None` if the entry is missing or malformed.
pub fn read_rect(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Rect> {
    let (_, object) = doc.dereference(dict.get(key).ok()?).ok()?;
    let items = object.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }

    let mut values = [0.0_f32; 4];
    for (slot, item) in values.iter_mut().zip(items) {
        let (_, item) = doc.dereference(item).ok()?;
        *slot = item.as_float().ok()?;
    }
    Some(Rect::from_corners(values[0], values[1], values[2], values[3]))
}

/// MediaBox of a page, falling back to [`FALLBACK_MEDIA_BOX`].
pub fn media_box(doc: &Document, page_id: ObjectId) -> Rect {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| read_rect(doc, page, b"MediaBox"))
        .unwrap_or(FALLBACK_MEDIA_BOX)
}

/// Sizes of every page, in page order.
pub fn page_sizes(doc: &Document) -> Vec<PageSize> {
    doc.get_pages()
        .into_values()
        .map(|page_id| media_box(doc, page_id).into())
        .collect()
}

/// Copy inherited attributes onto every page.
///
/// After this, each page is self-contained and can be moved to another
/// page tree without changing how it renders.
pub fn materialize_inherited(doc: &mut Document) -> lopdf::Result<()> {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for page_id in page_ids {
        let inherited = inherited_attributes(doc, page_id)?;
        if inherited.is_empty() {
            continue;
        }
        let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
    Ok(())
}

fn inherited_attributes(
    doc: &Document,
    page_id: ObjectId,
) -> lopdf::Result<Vec<(&'static [u8], Object)>> {
    let page = doc.get_dictionary(page_id)?;
    let mut missing: Vec<&'static [u8]> = INHERITABLE_ATTRIBUTES
        .into_iter()
        .filter(|key| !page.has(key))
        .collect();
    let mut found = Vec::new();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(node_id) = parent {
        if missing.is_empty() || depth == MAX_TREE_DEPTH {
            break;
        }
        let node = doc.get_dictionary(node_id)?;
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((*key, value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    Ok(found)
}

/// Object id of the root `Pages` node.
pub fn page_tree_root(doc: &Document) -> lopdf::Result<ObjectId> {
    doc.catalog()?.get(b"Pages")?.as_reference()
}

/// Root `Pages` node of a document that will receive appended pages.
///
/// Fails unless the root holds a direct `Kids` array.
pub fn appendable_root(doc: &Document) -> lopdf::Result<ObjectId> {
    let pages_id = page_tree_root(doc)?;
    doc.get_dictionary(pages_id)?.get(b"Kids")?.as_array()?;
    Ok(pages_id)
}

/// Append pages to the page tree node `pages_id` of `merged`, usually the
/// one returned by [`appendable_root`].
///
/// Each page is reparented to the root and the root's `Count` is updated.
/// The pages' objects must already be present in `merged`.
pub fn append_pages(
    merged: &mut Document,
    pages_id: ObjectId,
    page_ids: &[ObjectId],
) -> lopdf::Result<()> {
    for &page_id in page_ids {
        merged
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Parent", Object::Reference(pages_id));
    }

    let pages = merged.get_object_mut(pages_id)?.as_dict_mut()?;
    let kids = pages.get_mut(b"Kids")?.as_array_mut()?;
    kids.extend(page_ids.iter().map(|&id| Object::Reference(id)));

    let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
    pages.set("Count", Object::Integer(count + page_ids.len() as i64));

    Ok(())
}
