//! Package document (OPF) parsing.
//!
//! The package document declares the book's metadata, the manifest (every
//! resource with its media type), and the spine (linear reading order).
//! Parsing is event-based and deliberately lenient: unknown elements are
//! ignored, metadata fields stay empty rather than failing.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::epub::Archive;
use crate::error::{Error, Result};
use crate::model::BookMetadata;

/// One manifest `<item>`.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub id: String,
    /// As declared, relative to the OPF directory.
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestEntry {
    pub fn is_html(&self) -> bool {
        is_html_media_type(&self.media_type)
    }

    fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_ref()
            .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == property))
    }
}

/// Parsed package document.
#[derive(Debug, Clone)]
pub struct PackageDoc {
    pub metadata: BookMetadata,
    pub manifest: Vec<ManifestEntry>,
    pub spine_ids: Vec<String>,
    /// EPUB2 NCX path, resolved against the OPF directory.
    pub ncx_href: Option<String>,
    /// EPUB3 navigation document path, resolved against the OPF directory.
    pub nav_href: Option<String>,
    /// Directory of the OPF file, `""` or `"OEBPS"`-style without trailing
    /// slash.
    pub base_dir: String,
}

impl PackageDoc {
    /// Locate and parse the package document inside an archive.
    pub fn load(archive: &Archive, encodings: &[String]) -> Result<PackageDoc> {
        let container = archive.read_text("META-INF/container.xml", encodings)?;
        let opf_path = find_rootfile(&container)?;
        let base_dir = Path::new(&opf_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let opf = archive.read_text(&opf_path, encodings)?;
        let mut package = parse_package(&opf)?;
        package.base_dir = base_dir;

        // Resolve the navigation hrefs now that the base is known.
        package.ncx_href = package.ncx_href.take().map(|href| package.resolve(&href));
        package.nav_href = package.nav_href.take().map(|href| package.resolve(&href));
        Ok(package)
    }

    pub fn manifest_by_id(&self, id: &str) -> Option<&ManifestEntry> {
        self.manifest.iter().find(|entry| entry.id == id)
    }

    /// Manifest entries with HTML/XHTML media types, in manifest order.
    pub fn html_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.manifest.iter().filter(|entry| entry.is_html())
    }

    /// Resolve an OPF-relative href to an archive path, dropping any
    /// fragment.
    pub fn resolve(&self, href: &str) -> String {
        let href = href.split('#').next().unwrap_or(href);
        let href = href.strip_prefix("./").unwrap_or(href);
        if self.base_dir.is_empty() {
            href.to_string()
        } else {
            format!("{}/{}", self.base_dir, href)
        }
    }
}

/// Find the OPF path from `META-INF/container.xml`.
pub fn find_rootfile(container: &str) -> Result<String> {
    let mut reader = Reader::from_str(container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return Ok(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Err(Error::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}

pub(crate) fn parse_package(content: &str) -> Result<PackageDoc> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut metadata = BookMetadata::default();
    let mut manifest: Vec<ManifestEntry> = Vec::new();
    let mut spine_ids: Vec<String> = Vec::new();
    let mut toc_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" | b"identifier" | b"publisher"
                    | b"description" | b"subject" | b"date" | b"rights" => {
                        if in_metadata {
                            current_element = Some(String::from_utf8_lossy(local).to_string());
                            buf_text.clear();
                        }
                    }
                    b"spine" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"toc" {
                                toc_id = Some(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"item" => {
                        let mut id = String::new();
                        let mut href = String::new();
                        let mut media_type = String::new();
                        let mut properties: Option<String> = None;

                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"id" => id = String::from_utf8(attr.value.to_vec())?,
                                b"href" => href = String::from_utf8(attr.value.to_vec())?,
                                b"media-type" => {
                                    media_type = String::from_utf8(attr.value.to_vec())?
                                }
                                b"properties" => {
                                    properties = Some(String::from_utf8(attr.value.to_vec())?)
                                }
                                _ => {}
                            }
                        }

                        if !id.is_empty() && !href.is_empty() {
                            manifest.push(ManifestEntry {
                                id,
                                href,
                                media_type,
                                properties,
                            });
                        }
                    }
                    b"itemref" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"idref" {
                                spine_ids.push(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current_element.is_some() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        buf_text.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if let Some(ref elem) = current_element {
                    match elem.as_str() {
                        "title" => metadata.title = buf_text.clone(),
                        "creator" => metadata.authors.push(buf_text.clone()),
                        "language" => metadata.language = buf_text.clone(),
                        "identifier" if metadata.identifier.is_empty() => {
                            metadata.identifier = buf_text.clone()
                        }
                        "publisher" => metadata.publisher = Some(buf_text.clone()),
                        "description" => metadata.description = Some(buf_text.clone()),
                        "subject" => metadata.subjects.push(buf_text.clone()),
                        "date" => metadata.date = Some(buf_text.clone()),
                        "rights" => metadata.rights = Some(buf_text.clone()),
                        _ => {}
                    }
                    current_element = None;
                    buf_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    let by_id: HashMap<&str, &ManifestEntry> = manifest
        .iter()
        .map(|entry| (entry.id.as_str(), entry))
        .collect();

    // NCX: spine toc attribute first, media-type scan as fallback for
    // packages with a damaged spine element.
    let ncx_href = toc_id
        .and_then(|id| by_id.get(id.as_str()).map(|entry| entry.href.clone()))
        .or_else(|| {
            manifest
                .iter()
                .find(|entry| entry.media_type == "application/x-dtbncx+xml")
                .map(|entry| entry.href.clone())
        });

    // EPUB3 navigation document: <item properties="nav"/>.
    let nav_href = manifest
        .iter()
        .find(|entry| entry.has_property("nav"))
        .map(|entry| entry.href.clone());

    Ok(PackageDoc {
        metadata,
        manifest,
        spine_ids,
        ncx_href,
        nav_href,
        base_dir: String::new(),
    })
}

/// True for the media types a reading system treats as textual content.
pub fn is_html_media_type(media_type: &str) -> bool {
    matches!(
        media_type,
        "application/xhtml+xml" | "text/html" | "application/html+xml"
    )
}

/// Extract local name from a potentially namespaced XML name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve a named or numeric XML entity reference.
pub(crate) fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x") {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#') {
        if let Ok(code) = dec.parse::<u32>()
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    }

    None
}
