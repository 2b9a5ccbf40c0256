//! The DOM cascade: moving page content into a layout.
//!
//! All functions here take the layout (or component) as the mutable
//! destination and the page (or component host) as the read-only source.
//!
//! ## Areas
//!
//! A layout element whose class list contains `unify-<name>` is an area.
//! The first page element carrying the same class fills it: the area's
//! children are replaced by the page element's children and the two
//! elements' attributes are merged. Layout areas with no page counterpart
//! keep their default content.
//!
//! When the layout declares no `unify-*` class at all, same-named landmark
//! elements (`header`, `nav`, `main`, `aside`, `footer`) are paired instead.
//!
//! ## Attributes
//!
//! - `class`: union, layout classes first, duplicates removed
//! - `id`: layout's wins when present
//! - everything else: page's value wins, layout-only attributes are kept

use crate::dom::{Document, Element, NodeData, NodeId};

pub const AREA_CLASS_PREFIX: &str = "unify-";

pub const LANDMARKS: &[&str] = &["header", "nav", "main", "aside", "footer"];

/// Attributes that never carry over from a page onto a layout.
const COMPOSITION_MARKERS: &[&str] = &["data-unify", "data-layer"];

/// What [`fill_areas`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AreaOutcome {
    /// Layout declares at least one `unify-*` area.
    pub has_areas: bool,
    /// Number of layout elements whose content was replaced.
    pub filled: usize,
}

/// Fill the areas of `layout` below `layout_scope` from `page` below
/// `page_scope`.
pub fn fill_areas(
    layout: &mut Document,
    layout_scope: NodeId,
    page: &Document,
    page_scope: NodeId,
) -> AreaOutcome {
    let areas: Vec<(NodeId, Vec<String>)> = layout
        .elements(layout_scope)
        .into_iter()
        .filter_map(|id| {
            let classes = area_classes(layout.element(id)?);
            (!classes.is_empty()).then_some((id, classes))
        })
        .collect();

    if areas.is_empty() {
        return AreaOutcome {
            has_areas: false,
            filled: fill_landmarks(layout, layout_scope, page, page_scope),
        };
    }

    let mut filled = 0;
    for (area, classes) in areas {
        // An enclosing area may already have replaced this one.
        if !layout.is_attached(area) {
            continue;
        }
        let source = page.find(page_scope, |el| {
            classes.iter().any(|class| el.has_class(class))
        });
        if let Some(source) = source {
            replace_element_content(layout, area, page, source);
            filled += 1;
        }
    }
    AreaOutcome {
        has_areas: true,
        filled,
    }
}

fn fill_landmarks(
    layout: &mut Document,
    layout_scope: NodeId,
    page: &Document,
    page_scope: NodeId,
) -> usize {
    let mut filled = 0;
    for landmark in LANDMARKS {
        let target = layout.find(layout_scope, |el| el.name == *landmark);
        let source = page.find(page_scope, |el| el.name == *landmark);
        if let (Some(target), Some(source)) = (target, source)
            && layout.is_attached(target)
        {
            replace_element_content(layout, target, page, source);
            filled += 1;
        }
    }
    filled
}

fn area_classes(el: &Element) -> Vec<String> {
    el.classes()
        .into_iter()
        .filter(|c| c.starts_with(AREA_CLASS_PREFIX) && c.len() > AREA_CLASS_PREFIX.len())
        .map(str::to_string)
        .collect()
}

/// Replace the children of `target` with the page element's children and
/// merge the page element's attributes onto it.
pub fn replace_element_content(
    layout: &mut Document,
    target: NodeId,
    page: &Document,
    source: NodeId,
) {
    layout.replace_children_from(target, page, source);
    merge_element_attributes(layout, target, page, source);
}

/// Merge the attributes of `source` in `page` onto `target` in `layout`.
pub fn merge_element_attributes(
    layout: &mut Document,
    target: NodeId,
    page: &Document,
    source: NodeId,
) {
    let Some(page_el) = page.element(source) else {
        return;
    };
    let page_el = page_el.clone();
    if let Some(layout_el) = layout.element_mut(target) {
        merge_attributes(layout_el, &page_el);
    }
}

/// Apply the attribute merge policy, writing the result into `layout`.
pub fn merge_attributes(layout: &mut Element, page: &Element) {
    for attr in &page.attrs {
        match attr.name.as_str() {
            "class" => {
                let mut classes: Vec<String> =
                    layout.classes().into_iter().map(str::to_string).collect();
                for class in page.classes() {
                    if !classes.iter().any(|c| c == class) {
                        classes.push(class.to_string());
                    }
                }
                if !classes.is_empty() {
                    layout.set_attr("class", classes.join(" "));
                }
            }
            "id" => {
                if !layout.has_attr("id") {
                    layout.attrs.push(attr.clone());
                }
            }
            name if COMPOSITION_MARKERS.contains(&name) => {}
            name => match layout.attrs.iter_mut().find(|a| a.name == name) {
                Some(existing) => existing.value = attr.value.clone(),
                None => layout.attrs.push(attr.clone()),
            },
        }
    }
}

/// Merge the page's `<head>` into the layout's.
///
/// The page `<title>` replaces the layout's (or is added when the layout has
/// none). Every other page head element is appended unless an identical
/// element is already present. Layout-only entries are never removed.
pub fn merge_head(layout: &mut Document, page: &Document) {
    let Some(page_head) = page.find_by_name("head") else {
        return;
    };
    let layout_head = ensure_head(layout);

    for child in page.children(page_head) {
        let Some(el) = page.element(*child) else {
            continue;
        };
        if el.name == "title" {
            match layout.find(layout_head, |el| el.name == "title") {
                Some(existing) => layout.replace_children_from(existing, page, *child),
                None => {
                    let copy = layout.import(page, *child);
                    layout.append_child(layout_head, copy);
                }
            }
            continue;
        }
        let markup = page.outer_html(*child);
        append_unless_present(layout, layout_head, page, *child, &markup);
    }
}

/// Append hoisted component head markup to the document's `<head>`,
/// skipping entries that are already present.
pub fn hoist_into_head(doc: &mut Document, fragments: &[String]) {
    if fragments.is_empty() {
        return;
    }
    let head = ensure_head(doc);
    for fragment in fragments {
        let parsed = Document::parse(fragment);
        for node in parsed.children(parsed.root()) {
            if parsed.element(*node).is_none() {
                continue;
            }
            let markup = parsed.outer_html(*node);
            append_unless_present(doc, head, &parsed, *node, &markup);
        }
    }
}

fn append_unless_present(
    layout: &mut Document,
    head: NodeId,
    page: &Document,
    node: NodeId,
    markup: &str,
) {
    let duplicate = layout
        .children(head)
        .iter()
        .any(|existing| layout.element(*existing).is_some() && layout.outer_html(*existing) == markup);
    if !duplicate {
        let copy = layout.import(page, node);
        layout.append_child(head, copy);
    }
}

/// The document's `<head>`, created inside `<html>` (or at the top of the
/// document) when missing.
pub fn ensure_head(doc: &mut Document) -> NodeId {
    if let Some(head) = doc.find_by_name("head") {
        return head;
    }
    let head = doc.create_element(Element::new("head"));
    let parent = doc.find_by_name("html").unwrap_or(doc.root());
    doc.prepend_child(parent, head);
    head
}

/// Merge the page's `<html>` and `<body>` attributes onto the layout's.
pub fn merge_root_attributes(layout: &mut Document, page: &Document) {
    for name in ["html", "body"] {
        if let (Some(target), Some(source)) = (layout.find_by_name(name), page.find_by_name(name)) {
            merge_element_attributes(layout, target, page, source);
        }
    }
}

/// Where page content lives: `<body>`, else `<html>`, else the whole document.
pub fn content_scope(doc: &Document) -> NodeId {
    doc.find_by_name("body")
        .or_else(|| doc.find_by_name("html"))
        .unwrap_or(doc.root())
}

/// Top-level content nodes of `scope`, leaving out `<head>` and doctypes.
pub fn content_nodes(doc: &Document, scope: NodeId) -> Vec<NodeId> {
    doc.children(scope)
        .iter()
        .copied()
        .filter(|id| match doc.data(*id) {
            NodeData::Doctype(_) => false,
            NodeData::Element(el) => el.name != "head",
            _ => true,
        })
        .collect()
}

/// The single element among `nodes`, ignoring whitespace-only text.
pub fn single_element(doc: &Document, nodes: &[NodeId]) -> Option<NodeId> {
    let mut found = None;
    for id in nodes {
        match doc.data(*id) {
            NodeData::Element(_) if found.is_none() => found = Some(*id),
            NodeData::Element(_) => return None,
            NodeData::Text(text) if text.trim().is_empty() => {}
            NodeData::Comment(_) => {}
            _ => return None,
        }
    }
    found
}

/// Remove every composition marker attribute from the document.
pub fn strip_markers(doc: &mut Document) {
    for marker in COMPOSITION_MARKERS {
        doc.strip_attribute(marker);
    }
}
