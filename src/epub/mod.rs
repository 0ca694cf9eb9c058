//! EPUB container access: archive reading, package document parsing, and
//! navigation document parsing.

mod archive;
mod nav;
mod package;

pub use archive::{Archive, decode_text, strip_bom};
pub use nav::{NavPoint, parse_nav_doc, parse_ncx};
pub use package::{ManifestEntry, PackageDoc, find_rootfile, is_html_media_type};

pub(crate) use package::parse_package;
