//! In-memory EPUB fixtures shared by the unit tests

use std::io::{Cursor, Write};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

pub(crate) const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub(crate) const CONTENT_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>A Joyous Adventure</dc:title>
    <dc:creator opf:role="aut">Jane Doe</dc:creator>
    <dc:identifier id="bookid">urn:uuid:12345</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
  </spine>
</package>"#;

pub(crate) const TOC_NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <docTitle><text>A Joyous Adventure</text></docTitle>
  <navMap>
    <navPoint id="navpoint-1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="chapter1.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

pub(crate) const CHAPTER1_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Chapter One</title></head>
<body><h1>Chapter One</h1><p>It was a bright morning.</p></body></html>"#;

/// Returns a container document pointing at `full_path`
pub(crate) fn container_xml(full_path: &str) -> String {
    CONTAINER_XML.replace("OEBPS/content.opf", full_path)
}

/// Builds zip archives in memory
///
/// Like an OCF container, the archive always starts with a stored
/// `mimetype` entry.
pub(crate) struct ZipFixture {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipFixture {
    pub(crate) fn new() -> Self {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("mimetype", stored).unwrap();
        writer.write_all(b"application/epub+zip").unwrap();

        Self { writer }
    }

    pub(crate) fn file(mut self, name: &str, content: &str) -> Self {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer.start_file(name, options).unwrap();
        self.writer.write_all(content.as_bytes()).unwrap();
        self
    }

    pub(crate) fn directory(mut self, name: &str) -> Self {
        self.writer
            .add_directory(name, SimpleFileOptions::default())
            .unwrap();
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.writer.finish().unwrap().into_inner()
    }
}

/// The smallest complete book: one manifest item, one spine item, one navPoint
pub(crate) fn minimal_epub() -> Vec<u8> {
    ZipFixture::new()
        .file("META-INF/container.xml", CONTAINER_XML)
        .file("OEBPS/content.opf", CONTENT_OPF)
        .file("OEBPS/toc.ncx", TOC_NCX)
        .file("OEBPS/chapter1.xhtml", CHAPTER1_XHTML)
        .finish()
}

/// Rewrites the compression method recorded for `entry`
///
/// Both the local file header and the central directory record are
/// patched; the entry data is left untouched.
pub(crate) fn set_compression_method(data: &mut [u8], entry: &str, method: u16) {
    const LOCAL_HEADER: &[u8] = b"PK\x03\x04";
    const CENTRAL_HEADER: &[u8] = b"PK\x01\x02";

    let name = entry.as_bytes();
    let mut patched = 0;
    for offset in 0..data.len().saturating_sub(4) {
        let (method_at, name_len_at, name_at) = match &data[offset..offset + 4] {
            header if header == LOCAL_HEADER => (8, 26, 30),
            header if header == CENTRAL_HEADER => (10, 28, 46),
            _ => continue,
        };
        if offset + name_at + name.len() > data.len() {
            continue;
        }

        let name_len_at = offset + name_len_at;
        let name_len = u16::from_le_bytes([data[name_len_at], data[name_len_at + 1]]) as usize;
        let name_at = offset + name_at;
        if name_len == name.len() && &data[name_at..name_at + name_len] == name {
            data[offset + method_at..offset + method_at + 2].copy_from_slice(&method.to_le_bytes());
            patched += 1;
        }
    }

    assert_eq!(patched, 2, "expected a local and a central header for {entry}");
}
