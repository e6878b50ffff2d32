//! Integration tests for outline generation.

use pdf_weave::{DocumentSession, NullFontResolver, NullImageEmbedder, RendererConfig};

fn render(config: RendererConfig, draw: impl FnOnce(&mut DocumentSession<Vec<u8>>)) -> lopdf::Document {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut session = DocumentSession::new(Vec::new(), config, NullFontResolver, NullImageEmbedder).unwrap();
    draw(&mut session);
    let bytes = session.finish().unwrap();
    lopdf::Document::load_mem(&bytes).expect("output should parse")
}

fn dict(doc: &lopdf::Document, obj: &lopdf::Object) -> lopdf::Dictionary {
    doc.get_dictionary(obj.as_reference().unwrap()).unwrap().clone()
}

#[test]
fn test_no_outline_without_entries() {
    let doc = render(RendererConfig::new(), |_| {});
    let catalog = doc.catalog().unwrap();
    assert!(catalog.get(b"Outlines").is_err());
    assert!(catalog.get(b"PageMode").is_err());
}

#[test]
fn test_nested_outline() {
    let doc = render(RendererConfig::new(), |s| {
        let pixel = s.geometry().pixel;
        s.add_outline_entry("Chapter 1", 0, -100 * pixel, 1);
        s.add_outline_entry("Section 1.1", 0, -300 * pixel, 2);
        s.next_page();
        s.add_outline_entry("Section 1.2", 0, -100 * pixel, 2);
        s.add_outline_entry("Chapter 2", 0, -500 * pixel, 1);
    });
    let pages = doc.get_pages();
    let catalog = doc.catalog().unwrap();
    assert_eq!(catalog.get(b"PageMode").unwrap().as_name().unwrap(), b"UseOutlines");

    let root = dict(&doc, catalog.get(b"Outlines").unwrap());
    assert_eq!(root.get(b"Count").unwrap().as_i64().unwrap(), 2);

    let chapter1 = dict(&doc, root.get(b"First").unwrap());
    assert_eq!(chapter1.get(b"Title").unwrap().as_str().unwrap(), b"Chapter 1");
    assert_eq!(chapter1.get(b"Count").unwrap().as_i64().unwrap(), -2);
    let dest = chapter1.get(b"Dest").unwrap().as_array().unwrap();
    assert_eq!(dest[0].as_reference().unwrap(), pages[&1]);
    assert_eq!(dest[1].as_name().unwrap(), b"XYZ");

    let section2 = dict(&doc, chapter1.get(b"Last").unwrap());
    assert_eq!(section2.get(b"Title").unwrap().as_str().unwrap(), b"Section 1.2");
    let dest = section2.get(b"Dest").unwrap().as_array().unwrap();
    assert_eq!(dest[0].as_reference().unwrap(), pages[&2]);
    let section1 = dict(&doc, section2.get(b"Prev").unwrap());
    assert_eq!(section1.get(b"Title").unwrap().as_str().unwrap(), b"Section 1.1");
    assert_eq!(
        section1.get(b"Parent").unwrap().as_reference().unwrap(),
        root.get(b"First").unwrap().as_reference().unwrap()
    );

    let chapter2 = dict(&doc, root.get(b"Last").unwrap());
    assert_eq!(chapter2.get(b"Title").unwrap().as_str().unwrap(), b"Chapter 2");
    assert!(chapter2.get(b"First").is_err());
    assert!(chapter2.get(b"Count").is_err());
    assert!(chapter2.get(b"Next").is_err());
}

#[test]
fn test_toc_kinds_map_to_levels() {
    let doc = render(RendererConfig::new().with_outline_open(true), |s| {
        s.toc_entry("toc-strong-1", "Part", 0, 0);
        s.toc_entry("toc-strong-2", "Chapter", 0, 0);
        s.toc_entry("toc-1", "Section", 0, 0);
        s.toc_entry("toc-2", "Subsection", 0, 0);
        s.toc_entry("index", "Index", 0, 0);
    });
    let catalog = doc.catalog().unwrap();
    let root = dict(&doc, catalog.get(b"Outlines").unwrap());
    assert_eq!(root.get(b"Count").unwrap().as_i64().unwrap(), 2);

    let part = dict(&doc, root.get(b"First").unwrap());
    // open outlines count every descendant positively
    assert_eq!(part.get(b"Count").unwrap().as_i64().unwrap(), 3);
    let chapter = dict(&doc, part.get(b"First").unwrap());
    assert_eq!(chapter.get(b"Count").unwrap().as_i64().unwrap(), 2);
    let index = dict(&doc, root.get(b"Last").unwrap());
    assert_eq!(index.get(b"Title").unwrap().as_str().unwrap(), b"Index");
}

#[test]
fn test_destination_is_in_points() {
    let doc = render(RendererConfig::new(), |s| {
        let pixel = s.geometry().pixel;
        // 600 device pixels from the left edge is one inch
        s.add_outline_entry("Inch", 600 * pixel, -600 * pixel, 1);
    });
    let catalog = doc.catalog().unwrap();
    let root = dict(&doc, catalog.get(b"Outlines").unwrap());
    let entry = dict(&doc, root.get(b"First").unwrap());
    let dest = entry.get(b"Dest").unwrap().as_array().unwrap();
    let x = dest[2].as_float().unwrap();
    let y = dest[3].as_float().unwrap();
    assert!((x - 72.0).abs() < 0.01, "x = {}", x);
    // one inch below the top of an A4 page
    assert!((y - (841.89 - 72.0)).abs() < 0.2, "y = {}", y);
}
