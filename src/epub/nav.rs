//! Navigation document parsing: EPUB2 NCX and EPUB3 nav.
//!
//! Both parsers flatten the authored hierarchy into document-ordered
//! entries with a depth level, which is what the chapter analyzer wants.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::epub::package::{local_name, resolve_entity};
use crate::error::{Error, Result};

/// One authored table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub title: String,
    /// Target href as authored (relative to the navigation document's
    /// base), possibly carrying a fragment.
    pub href: String,
    /// Nesting depth, 1-based.
    pub level: u8,
    /// NCX playOrder, when present.
    pub play_order: Option<usize>,
}

/// Parse an EPUB2 NCX document into flattened nav points.
///
/// Entries are emitted in document order (parents before children); the
/// level is the `navPoint` nesting depth. Entries missing a label or a
/// content source are skipped.
pub fn parse_ncx(content: &str) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    struct NavPointState {
        text: Option<String>,
        src: Option<String>,
        play_order: Option<usize>,
        emitted: bool,
    }

    let mut points = Vec::new();
    let mut stack: Vec<NavPointState> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"navPoint" => {
                        let mut play_order = None;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"playOrder"
                                && let Ok(order_str) = String::from_utf8(attr.value.to_vec())
                            {
                                play_order = order_str.parse().ok();
                            }
                        }
                        stack.push(NavPointState {
                            text: None,
                            src: None,
                            play_order,
                            emitted: false,
                        });
                    }
                    b"text" => in_text = true,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if local == b"content" {
                    let level = stack.len().min(u8::MAX as usize) as u8;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"src"
                            && let Some(state) = stack.last_mut()
                        {
                            state.src = Some(String::from_utf8(attr.value.to_vec())?);
                            // Labels normally precede content; emit in
                            // document order when they do.
                            if !state.emitted && let Some(text) = state.text.take() {
                                points.push(NavPoint {
                                    title: text,
                                    href: state.src.clone().unwrap_or_default(),
                                    level,
                                    play_order: state.play_order,
                                });
                                state.emitted = true;
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(state) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    match &mut state.text {
                        Some(existing) => existing.push_str(&raw),
                        None => state.text = Some(raw.into_owned()),
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text && let Some(state) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        match &mut state.text {
                            Some(existing) => existing.push_str(&resolved),
                            None => state.text = Some(resolved),
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"text" => in_text = false,
                    b"navPoint" => {
                        // Fallback for label-after-content documents.
                        if let Some(state) = stack.pop()
                            && !state.emitted
                            && let (Some(text), Some(src)) = (state.text, state.src)
                        {
                            points.push(NavPoint {
                                title: text,
                                href: src,
                                level: (stack.len() + 1).min(u8::MAX as usize) as u8,
                                play_order: state.play_order,
                            });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(points)
}

/// Parse an EPUB3 navigation document (`<nav epub:type="toc">`).
///
/// The level is the `<ol>` nesting depth inside the nav element. Anchors
/// without an href (spec-legal placeholders) are skipped.
pub fn parse_nav_doc(content: &str) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut points = Vec::new();
    let mut in_toc_nav = false;
    let mut seen_toc_nav = false;
    let mut ol_depth: usize = 0;
    let mut anchor: Option<(String, String)> = None; // (href, accumulated text)

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"nav" => {
                        // Prefer the nav explicitly typed "toc"; accept the
                        // first nav otherwise.
                        let mut is_toc = !seen_toc_nav;
                        for attr in e.attributes().flatten() {
                            if local_name(attr.key.as_ref()) == b"type" {
                                is_toc = attr.value.as_ref() == b"toc";
                            }
                        }
                        if is_toc {
                            in_toc_nav = true;
                            seen_toc_nav = true;
                            ol_depth = 0;
                        }
                    }
                    b"ol" if in_toc_nav => ol_depth += 1,
                    b"a" if in_toc_nav => {
                        let mut href = None;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                href = Some(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                        if let Some(href) = href {
                            anchor = Some((href, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, text)) = anchor.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some((_, text)) = anchor.as_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        text.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"nav" => in_toc_nav = false,
                    b"ol" if in_toc_nav => ol_depth = ol_depth.saturating_sub(1),
                    b"a" => {
                        if let Some((href, text)) = anchor.take() {
                            let title = text.trim().to_string();
                            if in_toc_nav && !title.is_empty() {
                                points.push(NavPoint {
                                    title,
                                    href,
                                    level: ol_depth.clamp(1, u8::MAX as usize) as u8,
                                    play_order: None,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="np1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="text/ch1.xhtml"/>
      <navPoint id="np1a" playOrder="2">
        <navLabel><text>Part A</text></navLabel>
        <content src="text/ch1.xhtml#a"/>
      </navPoint>
    </navPoint>
    <navPoint id="np2" playOrder="3">
      <navLabel><text>Chapter Two</text></navLabel>
      <content src="text/ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    #[test]
    fn ncx_flattens_in_document_order() {
        let points = parse_ncx(NCX).unwrap();
        assert_eq!(points.len(), 3);

        assert_eq!(points[0].title, "Chapter One");
        assert_eq!(points[0].href, "text/ch1.xhtml");
        assert_eq!(points[0].level, 1);
        assert_eq!(points[0].play_order, Some(1));

        assert_eq!(points[1].title, "Part A");
        assert_eq!(points[1].level, 2);

        assert_eq!(points[2].title, "Chapter Two");
        assert_eq!(points[2].level, 1);
    }

    #[test]
    fn ncx_skips_unlabeled_points() {
        let ncx = r#"<ncx><navMap>
          <navPoint id="x"><content src="a.xhtml"/></navPoint>
          <navPoint id="y"><navLabel><text>Real</text></navLabel><content src="b.xhtml"/></navPoint>
        </navMap></ncx>"#;
        let points = parse_ncx(ncx).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].title, "Real");
    }

    const NAV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="toc">
    <ol>
      <li><a href="ch1.xhtml">One</a>
        <ol><li><a href="ch1.xhtml#s1">One point one</a></li></ol>
      </li>
      <li><a href="ch2.xhtml">Two</a></li>
    </ol>
  </nav>
  <nav epub:type="landmarks">
    <ol><li><a href="cover.xhtml">Cover</a></li></ol>
  </nav>
</body>
</html>"#;

    #[test]
    fn nav_doc_reads_toc_nav_only() {
        let points = parse_nav_doc(NAV).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].title, "One");
        assert_eq!(points[0].level, 1);
        assert_eq!(points[1].title, "One point one");
        assert_eq!(points[1].level, 2);
        assert_eq!(points[2].href, "ch2.xhtml");
    }

    #[test]
    fn nav_doc_without_type_attribute_uses_first_nav() {
        let nav = r#"<html><body><nav><ol>
            <li><a href="a.xhtml">A</a></li>
        </ol></nav></body></html>"#;
        let points = parse_nav_doc(nav).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].href, "a.xhtml");
    }
}
