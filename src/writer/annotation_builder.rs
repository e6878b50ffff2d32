//! Hyperlinks and named destinations.
//!
//! Link annotations get their object id as soon as they are declared, so the
//! page they sit on can list them in `/Annots` when it closes. The annotation
//! bodies and the `/Dests` dictionary are written at document close, when
//! every anchor is known.
//!
//! Labels are mapped to small dense ids on first reference; the destination
//! for label id `n` is named `/label<n>` in the document's `/Dests`.

use crate::error::Result;
use crate::object::{Object, ObjectRef};
use crate::writer::object_serializer::ObjectSerializer;
use crate::writer::ObjectSink;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// A label declared with an anchor, without the leading `#`
    Destination(String),
    /// Any other target, opened as a URI
    Uri(String),
}

impl LinkTarget {
    /// Classify a link target: `#label` is internal, everything else a URI.
    pub fn parse(target: &str) -> Self {
        match target.strip_prefix('#') {
            Some(label) => LinkTarget::Destination(label.to_string()),
            None => LinkTarget::Uri(target.to_string()),
        }
    }
}

/// A point on a page that links can jump to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination {
    /// Dense label id
    pub label_id: u32,
    /// Page the point is on
    pub page: ObjectRef,
    /// Position in default user space
    pub x: f64,
    /// Position in default user space
    pub y: f64,
}

impl Destination {
    /// `[page /XYZ x y null]`
    pub fn to_array(&self) -> Object {
        xyz_destination(self.page, self.x, self.y)
    }
}

/// `[page /XYZ left top null]`, keeping the current zoom.
pub fn xyz_destination(page: ObjectRef, x: f64, y: f64) -> Object {
    ObjectSerializer::array(vec![
        Object::Reference(page),
        ObjectSerializer::name("XYZ"),
        ObjectSerializer::real(x),
        ObjectSerializer::real(y),
        Object::Null,
    ])
}

/// Name of the destination for a label id.
pub fn destination_name(label_id: u32) -> String {
    format!("label{}", label_id)
}

/// A link annotation waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAnnotation {
    /// Reserved object id
    pub id: ObjectRef,
    /// Index of the page it sits on
    pub page: usize,
    /// `[llx lly urx ury]` in default user space
    pub rect: [f64; 4],
    /// Link target
    pub target: LinkTarget,
}

impl LinkAnnotation {
    /// Build the annotation dictionary. `label_id` resolves internal targets.
    pub fn build(&self, label_id: Option<u32>, border_visible: bool) -> Object {
        let mut dict = HashMap::new();
        dict.insert("Type".to_string(), ObjectSerializer::name("Annot"));
        dict.insert("Subtype".to_string(), ObjectSerializer::name("Link"));
        dict.insert(
            "Rect".to_string(),
            ObjectSerializer::rect(self.rect[0], self.rect[1], self.rect[2], self.rect[3]),
        );
        let width = if border_visible { 1 } else { 0 };
        dict.insert(
            "Border".to_string(),
            ObjectSerializer::array(vec![
                ObjectSerializer::integer(16),
                ObjectSerializer::integer(16),
                ObjectSerializer::integer(width),
                ObjectSerializer::array(vec![ObjectSerializer::integer(3), ObjectSerializer::integer(10)]),
            ]),
        );
        dict.insert(
            "C".to_string(),
            ObjectSerializer::array(vec![
                ObjectSerializer::real(0.75),
                ObjectSerializer::real(0.5),
                ObjectSerializer::integer(1),
            ]),
        );

        match &self.target {
            LinkTarget::Destination(_) => {
                if let Some(id) = label_id {
                    dict.insert("Dest".to_string(), Object::Name(destination_name(id)));
                }
            },
            LinkTarget::Uri(uri) => {
                dict.insert(
                    "A".to_string(),
                    ObjectSerializer::dict(vec![
                        ("S", ObjectSerializer::name("URI")),
                        ("URI", Object::String(uri.as_bytes().to_vec())),
                    ]),
                );
            },
        }
        Object::Dictionary(dict)
    }
}

/// Labels, destinations and link annotations of a document.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    labels: IndexMap<String, u32>,
    destinations: BTreeMap<u32, Destination>,
    annotations: Vec<LinkAnnotation>,
}

impl LinkGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The dense id for `label`, assigned on first use starting at 1.
    pub fn label_id(&mut self, label: &str) -> u32 {
        if let Some(&id) = self.labels.get(label) {
            return id;
        }
        let id = self.labels.len() as u32 + 1;
        self.labels.insert(label.to_string(), id);
        id
    }

    /// Record the destination for `label`. A label anchored twice keeps its
    /// first position.
    pub fn add_destination(&mut self, label: &str, page: ObjectRef, x: f64, y: f64) -> u32 {
        let label_id = self.label_id(label);
        match self.destinations.get(&label_id) {
            Some(existing) => {
                log::debug!(
                    "Label '{}' already anchored on {}; keeping the first position",
                    label,
                    existing.page
                );
            },
            None => {
                self.destinations.insert(label_id, Destination { label_id, page, x, y });
            },
        }
        label_id
    }

    /// Destination for a label id, if anchored.
    pub fn destination(&self, label_id: u32) -> Option<&Destination> {
        self.destinations.get(&label_id)
    }

    /// Declare a link and reserve its object id.
    pub fn add_link(
        &mut self,
        sink: &mut dyn ObjectSink,
        page: usize,
        rect: [f64; 4],
        target: LinkTarget,
    ) -> Result<ObjectRef> {
        if let LinkTarget::Destination(label) = &target {
            self.label_id(label);
        }
        let id = sink.allocate()?;
        self.annotations.push(LinkAnnotation { id, page, rect, target });
        Ok(id)
    }

    /// Links declared so far.
    pub fn annotations(&self) -> &[LinkAnnotation] {
        &self.annotations
    }

    /// Write every link annotation.
    pub fn flush_annotations(&mut self, sink: &mut dyn ObjectSink, border_visible: bool) -> Result<()> {
        let annotations = std::mem::take(&mut self.annotations);
        for link in &annotations {
            let label_id = match &link.target {
                LinkTarget::Destination(label) => {
                    let id = self.label_id(label);
                    if !self.destinations.contains_key(&id) {
                        log::warn!("Link to '#{}' has no matching anchor", label);
                    }
                    Some(id)
                },
                LinkTarget::Uri(_) => None,
            };
            sink.write_object(link.id, &link.build(label_id, border_visible))?;
        }
        log::debug!("Wrote {} link annotations", annotations.len());
        Ok(())
    }

    /// Write the `/Dests` dictionary, if any destination exists.
    pub fn flush_destinations(&mut self, sink: &mut dyn ObjectSink) -> Result<Option<ObjectRef>> {
        if self.destinations.is_empty() {
            return Ok(None);
        }
        let dests: HashMap<String, Object> = self
            .destinations
            .values()
            .map(|d| (destination_name(d.label_id), d.to_array()))
            .collect();
        let id = sink.add_object(&Object::Dictionary(dests))?;
        Ok(Some(id))
    }
}
