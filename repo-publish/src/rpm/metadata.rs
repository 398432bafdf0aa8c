// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! primary/filelists/other metadata documents.

Each document is a root element carrying a `packages` count attribute and one
`<package>` child per package. Mutation here is splicing: package entries
produced by the metadata generator are inserted into the existing document,
and removed entries disappear, without disturbing the entries that did not
change.

Entries are stored as normalized XML text. Normalization resolves the
serialization hazard this format is known for: elements in the document's
default namespace are emitted with no prefix (`<package>`, never
`<common:package>`), while `rpm:` elements keep their prefix. Input in either
form is accepted, so historical repositories written with prefixed
serializers parse and come out normalized.
*/

use {
    crate::{
        error::{RepoPublishError, Result},
        io::{gzip_compress, gzip_decompress},
        rpm::{COMMON_NS, FILELISTS_NS, OTHER_NS, RPM_NS},
    },
    quick_xml::{
        events::{attributes::Attribute, BytesEnd, BytesStart, BytesText, Event},
        Reader, Writer,
    },
    std::collections::{HashMap, HashSet},
};

/// Which of the three metadata documents a value refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetadataFlavor {
    Primary,
    Filelists,
    Other,
}

impl MetadataFlavor {
    /// The document's default namespace URI.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Primary => COMMON_NS,
            Self::Filelists => FILELISTS_NS,
            Self::Other => OTHER_NS,
        }
    }

    /// The root element name.
    pub fn root_element(&self) -> &'static str {
        match self {
            Self::Primary => "metadata",
            Self::Filelists => "filelists",
            Self::Other => "otherdata",
        }
    }

    /// The repomd record type and file basename stem.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Filelists => "filelists",
            Self::Other => "other",
        }
    }

    /// The stored file basename, e.g. `primary.xml.gz`.
    pub fn file_base(&self) -> String {
        format!("{}.xml.gz", self.type_name())
    }

    /// The sqlite mirror record type, e.g. `primary_db`.
    pub fn db_type_name(&self) -> String {
        format!("{}_db", self.type_name())
    }

    pub fn all() -> [MetadataFlavor; 3] {
        [Self::Primary, Self::Filelists, Self::Other]
    }
}

/// One `<package>` element, normalized, with the fields needed for
/// dedup and removal extracted.
#[derive(Clone, Debug)]
pub struct PackageEntry {
    /// Package name: the `<name>` child (primary) or `name` attribute.
    pub name: String,
    /// `location href` (primary only).
    pub location_href: Option<String>,
    /// Package content digest: `<checksum>` text (primary) or `pkgid`
    /// attribute (filelists/other).
    pub pkgid: Option<String>,
    /// The normalized `<package>...</package>` XML text.
    pub xml: String,
}

impl PackageEntry {
    /// The basename of the stored package file (primary entries).
    pub fn filename(&self) -> Option<String> {
        self.location_href
            .as_ref()
            .map(|href| href.rsplit('/').next().unwrap_or(href).to_string())
    }
}

/// A parsed primary/filelists/other document.
#[derive(Clone, Debug)]
pub struct MetadataDocument {
    pub flavor: MetadataFlavor,
    /// The `packages` attribute as found on the root element.
    pub declared_count: usize,
    pub packages: Vec<PackageEntry>,
}

impl MetadataDocument {
    /// Construct an empty document.
    pub fn empty(flavor: MetadataFlavor) -> Self {
        Self {
            flavor,
            declared_count: 0,
            packages: vec![],
        }
    }

    /// Parse a gzip-compressed document.
    pub fn parse_gz(flavor: MetadataFlavor, data: &[u8]) -> Result<Self> {
        let decompressed = gzip_decompress(data)?;
        let text = String::from_utf8(decompressed).map_err(|e| {
            RepoPublishError::MetadataParse(format!("{} is not UTF-8: {}", flavor.file_base(), e))
        })?;

        Self::parse(flavor, &text)
    }

    /// Parse an uncompressed document.
    pub fn parse(flavor: MetadataFlavor, xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut document = Self::empty(flavor);
        let mut buf = vec![];

        // Prefix -> URI map accumulated from xmlns declarations. The empty
        // prefix tracks the default namespace.
        let mut namespaces: HashMap<String, String> = HashMap::new();

        let mut saw_root = false;
        let mut entry: Option<EntryCapture> = None;

        loop {
            let event = reader.read_event(&mut buf)?;

            match &event {
                Event::Start(e) | Event::Empty(e) => {
                    record_namespaces(e, &reader, &mut namespaces)?;
                }
                _ => {}
            }

            match event {
                Event::Start(e) => {
                    if !saw_root {
                        saw_root = true;
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key == b"packages" {
                                document.declared_count = attr
                                    .unescape_and_decode_value(&reader)?
                                    .trim()
                                    .parse()
                                    .unwrap_or(0);
                            }
                        }
                    } else if let Some(capture) = entry.as_mut() {
                        capture.start(&e, &reader, flavor, &namespaces)?;
                    } else if is_package_element(&e, flavor, &namespaces) {
                        let mut capture = EntryCapture::new(flavor);
                        capture.start(&e, &reader, flavor, &namespaces)?;
                        entry = Some(capture);
                    }
                }
                Event::Empty(e) => {
                    if !saw_root {
                        // Self-closing root: an empty document.
                        saw_root = true;
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key == b"packages" {
                                document.declared_count = attr
                                    .unescape_and_decode_value(&reader)?
                                    .trim()
                                    .parse()
                                    .unwrap_or(0);
                            }
                        }
                    } else if let Some(capture) = entry.as_mut() {
                        capture.empty(&e, &reader, flavor, &namespaces)?;
                    } else if is_package_element(&e, flavor, &namespaces) {
                        let mut capture = EntryCapture::new(flavor);
                        capture.empty(&e, &reader, flavor, &namespaces)?;
                        document.packages.push(capture.finish()?);
                    }
                }
                Event::Text(e) => {
                    if let Some(capture) = entry.as_mut() {
                        capture.text(&e, &reader)?;
                    }
                }
                Event::CData(e) => {
                    if let Some(capture) = entry.as_mut() {
                        capture.writer.write_event(Event::CData(e.into_owned()))?;
                    }
                }
                Event::End(e) => {
                    if let Some(capture) = entry.as_mut() {
                        let done = capture.end(&e, flavor, &namespaces)?;
                        if done {
                            document
                                .packages
                                .push(entry.take().expect("entry is present").finish()?);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }

            buf.clear();
        }

        if !saw_root {
            return Err(RepoPublishError::MetadataParse(format!(
                "{} document has no root element",
                flavor.file_base()
            )));
        }

        Ok(document)
    }

    /// Splice another document's entries into this one.
    pub fn merge(&mut self, other: MetadataDocument) {
        self.packages.extend(other.packages);
    }

    /// Remove primary entries whose stored filename is in `filenames`.
    ///
    /// Returns the removed entries, whose pkgids identify the matching
    /// filelists/other entries.
    pub fn remove_by_filenames(&mut self, filenames: &HashSet<String>) -> Vec<PackageEntry> {
        let (removed, kept) = std::mem::take(&mut self.packages).into_iter().partition(
            |entry: &PackageEntry| {
                entry
                    .filename()
                    .map(|name| filenames.contains(&name))
                    .unwrap_or(false)
            },
        );

        self.packages = kept;

        removed
    }

    /// Remove entries matching a set of pkgids, falling back to package name
    /// for entries that do not carry a pkgid.
    ///
    /// Returns the number of entries removed.
    pub fn remove_matching(&mut self, pkgids: &HashSet<String>, names: &HashSet<String>) -> usize {
        let before = self.packages.len();

        self.packages.retain(|entry| match &entry.pkgid {
            Some(pkgid) => !pkgids.contains(pkgid),
            None => !names.contains(&entry.name),
        });

        before - self.packages.len()
    }

    /// Map of `filename -> sha256` over primary entries, for dedup.
    pub fn filename_checksums(&self) -> HashMap<String, String> {
        self.packages
            .iter()
            .filter_map(|entry| {
                Some((entry.filename()?, entry.pkgid.clone()?))
            })
            .collect()
    }

    /// Serialize the document. The `packages` attribute always equals the
    /// actual number of entries.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();

        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push('<');
        out.push_str(self.flavor.root_element());
        out.push_str(&format!(" xmlns=\"{}\"", self.flavor.uri()));
        if self.flavor == MetadataFlavor::Primary {
            out.push_str(&format!(" xmlns:rpm=\"{}\"", RPM_NS));
        }
        out.push_str(&format!(" packages=\"{}\">\n", self.packages.len()));

        for entry in &self.packages {
            out.push_str(&entry.xml);
            out.push('\n');
        }

        out.push_str(&format!("</{}>\n", self.flavor.root_element()));

        out
    }

    /// Serialize and gzip-compress the document.
    pub fn to_gz_bytes(&self) -> Result<Vec<u8>> {
        gzip_compress(self.to_xml().as_bytes())
    }
}

/// Accumulates the transcription of one `<package>` subtree.
struct EntryCapture {
    writer: Writer<Vec<u8>>,
    depth: usize,
    name: String,
    location_href: Option<String>,
    pkgid: Option<String>,
    // Element whose text is the next capture target: "name" or "checksum".
    pending_field: Option<&'static str>,
    flavor: MetadataFlavor,
}

impl EntryCapture {
    fn new(flavor: MetadataFlavor) -> Self {
        Self {
            writer: Writer::new(vec![]),
            depth: 0,
            name: String::new(),
            location_href: None,
            pkgid: None,
            pending_field: None,
            flavor,
        }
    }

    fn start(
        &mut self,
        e: &BytesStart,
        reader: &Reader<&[u8]>,
        flavor: MetadataFlavor,
        namespaces: &HashMap<String, String>,
    ) -> Result<()> {
        let emitted = normalized_name(e.name(), flavor, namespaces);

        if self.depth == 0 {
            // Root of the entry: harvest identifying attributes.
            for attr in e.attributes() {
                let attr = attr?;
                match attr.key {
                    b"name" => self.name = attr.unescape_and_decode_value(reader)?,
                    b"pkgid" => {
                        self.pkgid = Some(attr.unescape_and_decode_value(reader)?)
                    }
                    _ => {}
                }
            }
        } else if self.depth == 1 && flavor == MetadataFlavor::Primary {
            match emitted.as_str() {
                "name" => self.pending_field = Some("name"),
                "checksum" => self.pending_field = Some("checksum"),
                "location" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key == b"href" {
                            self.location_href =
                                Some(attr.unescape_and_decode_value(reader)?);
                        }
                    }
                }
                _ => {}
            }
        }

        self.writer
            .write_event(Event::Start(transcribe_element(e, &emitted)?))?;
        self.depth += 1;

        Ok(())
    }

    fn empty(
        &mut self,
        e: &BytesStart,
        reader: &Reader<&[u8]>,
        flavor: MetadataFlavor,
        namespaces: &HashMap<String, String>,
    ) -> Result<()> {
        let emitted = normalized_name(e.name(), flavor, namespaces);

        if self.depth == 0 {
            for attr in e.attributes() {
                let attr = attr?;
                match attr.key {
                    b"name" => self.name = attr.unescape_and_decode_value(reader)?,
                    b"pkgid" => {
                        self.pkgid = Some(attr.unescape_and_decode_value(reader)?)
                    }
                    _ => {}
                }
            }
        } else if self.depth == 1 && flavor == MetadataFlavor::Primary && emitted == "location" {
            for attr in e.attributes() {
                let attr = attr?;
                if attr.key == b"href" {
                    self.location_href = Some(attr.unescape_and_decode_value(reader)?);
                }
            }
        }

        self.writer
            .write_event(Event::Empty(transcribe_element(e, &emitted)?))?;

        Ok(())
    }

    fn text(&mut self, e: &BytesText, reader: &Reader<&[u8]>) -> Result<()> {
        if let Some(field) = self.pending_field.take() {
            let value = e.unescape_and_decode(reader)?;
            match field {
                "name" => self.name = value,
                "checksum" => self.pkgid = Some(value),
                _ => {}
            }
        }

        self.writer
            .write_event(Event::Text(BytesText::from_escaped(e.escaped().to_vec())))?;

        Ok(())
    }

    fn end(
        &mut self,
        e: &BytesEnd,
        flavor: MetadataFlavor,
        namespaces: &HashMap<String, String>,
    ) -> Result<bool> {
        self.pending_field = None;

        let emitted = normalized_name(e.name(), flavor, namespaces);
        self.writer
            .write_event(Event::End(BytesEnd::owned(emitted.into_bytes())))?;
        self.depth -= 1;

        Ok(self.depth == 0)
    }

    fn finish(self) -> Result<PackageEntry> {
        let xml = String::from_utf8(self.writer.into_inner())
            .expect("transcribed entry is UTF-8");

        if self.name.is_empty() && self.flavor != MetadataFlavor::Primary {
            return Err(RepoPublishError::MetadataParse(format!(
                "{} package entry lacks a name attribute",
                self.flavor.file_base()
            )));
        }

        Ok(PackageEntry {
            name: self.name,
            location_href: self.location_href,
            pkgid: self.pkgid,
            xml,
        })
    }
}

/// Whether an element is a `<package>` in the document's namespace.
fn is_package_element(
    e: &BytesStart,
    flavor: MetadataFlavor,
    namespaces: &HashMap<String, String>,
) -> bool {
    let (prefix, local) = split_name(e.name());

    local == "package"
        && match namespaces.get(prefix.as_str()) {
            Some(uri) => uri == flavor.uri(),
            // Undeclared prefixes only occur for documents without any
            // namespace declarations; treat their elements as native.
            None => true,
        }
}

/// Merge xmlns declarations from an element into the prefix map.
fn record_namespaces(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    namespaces: &mut HashMap<String, String>,
) -> Result<()> {
    for attr in e.attributes() {
        let attr = attr?;

        if attr.key == b"xmlns" {
            namespaces.insert(String::new(), attr.unescape_and_decode_value(reader)?);
        } else if let Some(prefix) = attr.key.strip_prefix(b"xmlns:") {
            namespaces.insert(
                String::from_utf8_lossy(prefix).to_string(),
                attr.unescape_and_decode_value(reader)?,
            );
        }
    }

    Ok(())
}

fn split_name(name: &[u8]) -> (String, String) {
    let name = String::from_utf8_lossy(name).to_string();

    match name.split_once(':') {
        Some((prefix, local)) => (prefix.to_string(), local.to_string()),
        None => (String::new(), name),
    }
}

/// Compute the emitted element name: unprefixed for the document namespace,
/// `rpm:`-prefixed for the rpm namespace, passed through otherwise.
fn normalized_name(
    name: &[u8],
    flavor: MetadataFlavor,
    namespaces: &HashMap<String, String>,
) -> String {
    let (prefix, local) = split_name(name);

    match namespaces.get(prefix.as_str()).map(String::as_str) {
        Some(uri) if uri == flavor.uri() => local,
        Some(uri) if uri == RPM_NS => format!("rpm:{}", local),
        _ => {
            if prefix.is_empty() {
                local
            } else {
                format!("{}:{}", prefix, local)
            }
        }
    }
}

/// Rebuild an element with a new name, dropping xmlns declarations and
/// passing attribute values through without re-escaping.
fn transcribe_element(e: &BytesStart, emitted_name: &str) -> Result<BytesStart<'static>> {
    let mut element = BytesStart::owned_name(emitted_name.as_bytes().to_vec());

    for attr in e.attributes() {
        let attr = attr?;

        if attr.key == b"xmlns" || attr.key.starts_with(b"xmlns:") {
            continue;
        }

        element.push_attribute(Attribute {
            key: attr.key,
            value: attr.value.clone(),
        });
    }

    Ok(element.into_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    const PRIMARY_DEFAULT_NS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm"><name>hello-world</name><arch>x86_64</arch><version epoch="0" ver="1.0.0" rel="1.el9"/><checksum type="sha256" pkgid="YES">aaa111</checksum><summary>Hello</summary><description>Says hello</description><packager/><url/><time file="100" build="90"/><size package="300" installed="500" archive="520"/><location href="hello-world-1.0.0-1.el9.x86_64.rpm"/><format><rpm:license>MIT</rpm:license><rpm:group>Unspecified</rpm:group><rpm:buildhost>build1</rpm:buildhost><rpm:sourcerpm>hello-world-1.0.0-1.el9.src.rpm</rpm:sourcerpm><rpm:header-range start="440" end="2210"/><rpm:provides><rpm:entry name="hello-world" flags="EQ" epoch="0" ver="1.0.0" rel="1.el9"/></rpm:provides><file>/usr/bin/hello</file></format></package>
<package type="rpm"><name>goodbye-forever</name><arch>x86_64</arch><version epoch="0" ver="2.0.0" rel="1.el9"/><checksum type="sha256" pkgid="YES">bbb222</checksum><summary>Bye</summary><description>Says goodbye</description><packager/><url/><time file="101" build="91"/><size package="301" installed="501" archive="521"/><location href="goodbye-forever-2.0.0-1.el9.x86_64.rpm"/><format><rpm:license>MIT</rpm:license></format></package>
</metadata>
"#;

    const PRIMARY_PREFIXED_NS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<common:metadata xmlns:common="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
<common:package type="rpm"><common:name>legacy-app</common:name><common:arch>x86_64</common:arch><common:version epoch="0" ver="3.0" rel="2.el9"/><common:checksum type="sha256" pkgid="YES">ccc333</common:checksum><common:location href="legacy-app-3.0-2.el9.x86_64.rpm"/><common:format><rpm:license>GPL</rpm:license></common:format></common:package>
</common:metadata>
"#;

    const FILELISTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="1">
<package pkgid="aaa111" name="hello-world" arch="x86_64"><version epoch="0" ver="1.0.0" rel="1.el9"/><file>/usr/bin/hello</file><file type="dir">/usr/share/hello</file></package>
</filelists>
"#;

    #[test]
    fn parse_default_namespace_document() -> Result<()> {
        let document = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_DEFAULT_NS)?;

        assert_eq!(document.declared_count, 2);
        assert_eq!(document.packages.len(), 2);

        let first = &document.packages[0];
        assert_eq!(first.name, "hello-world");
        assert_eq!(
            first.filename(),
            Some("hello-world-1.0.0-1.el9.x86_64.rpm".to_string())
        );
        assert_eq!(first.pkgid.as_deref(), Some("aaa111"));

        Ok(())
    }

    #[test]
    fn prefixed_input_is_normalized() -> Result<()> {
        let document = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_PREFIXED_NS)?;

        assert_eq!(document.packages.len(), 1);
        let entry = &document.packages[0];
        assert_eq!(entry.name, "legacy-app");
        assert_eq!(entry.pkgid.as_deref(), Some("ccc333"));

        // Default-namespace children lose their prefix; rpm: children keep it.
        assert!(entry.xml.starts_with("<package "));
        assert!(entry.xml.contains("<name>legacy-app</name>"));
        assert!(entry.xml.contains("<rpm:license>GPL</rpm:license>"));
        assert!(!entry.xml.contains("common:"));

        let serialized = document.to_xml();
        assert!(serialized.contains("<metadata xmlns=\"http://linux.duke.edu/metadata/common\""));
        assert!(!serialized.contains("<common:"));

        Ok(())
    }

    #[test]
    fn serialization_is_idempotent() -> Result<()> {
        let document = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_DEFAULT_NS)?;
        let first = document.to_xml();

        let reparsed = MetadataDocument::parse(MetadataFlavor::Primary, &first)?;
        assert_eq!(reparsed.to_xml(), first);

        Ok(())
    }

    #[test]
    fn count_attribute_tracks_entries() -> Result<()> {
        let mut document = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_DEFAULT_NS)?;

        let removed = document.remove_by_filenames(&HashSet::from([
            "goodbye-forever-2.0.0-1.el9.x86_64.rpm".to_string(),
        ]));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "goodbye-forever");

        let serialized = document.to_xml();
        assert!(serialized.contains("packages=\"1\""));
        assert!(!serialized.contains("goodbye-forever"));

        Ok(())
    }

    #[test]
    fn merge_appends_entries() -> Result<()> {
        let mut existing = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_PREFIXED_NS)?;
        let incoming = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_DEFAULT_NS)?;

        existing.merge(incoming);

        assert_eq!(existing.packages.len(), 3);
        let serialized = existing.to_xml();
        assert!(serialized.contains("packages=\"3\""));
        assert!(serialized.contains("legacy-app"));
        assert!(serialized.contains("hello-world"));

        Ok(())
    }

    #[test]
    fn filelists_parse_and_remove_by_pkgid() -> Result<()> {
        let mut document = MetadataDocument::parse(MetadataFlavor::Filelists, FILELISTS)?;

        assert_eq!(document.packages.len(), 1);
        assert_eq!(document.packages[0].name, "hello-world");
        assert_eq!(document.packages[0].pkgid.as_deref(), Some("aaa111"));

        let removed = document.remove_matching(
            &HashSet::from(["aaa111".to_string()]),
            &HashSet::new(),
        );
        assert_eq!(removed, 1);
        assert!(document.packages.is_empty());

        Ok(())
    }

    #[test]
    fn filename_checksums_for_dedup() -> Result<()> {
        let document = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_DEFAULT_NS)?;
        let checksums = document.filename_checksums();

        assert_eq!(
            checksums.get("hello-world-1.0.0-1.el9.x86_64.rpm").unwrap(),
            "aaa111"
        );
        assert_eq!(
            checksums
                .get("goodbye-forever-2.0.0-1.el9.x86_64.rpm")
                .unwrap(),
            "bbb222"
        );

        Ok(())
    }

    #[test]
    fn gz_round_trip() -> Result<()> {
        let document = MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY_DEFAULT_NS)?;
        let compressed = document.to_gz_bytes()?;
        let reparsed = MetadataDocument::parse_gz(MetadataFlavor::Primary, &compressed)?;

        assert_eq!(reparsed.packages.len(), 2);
        assert_eq!(reparsed.to_xml(), document.to_xml());

        Ok(())
    }

    #[test]
    fn escaped_content_survives_transcription() -> Result<()> {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" packages="1">
<package type="rpm"><name>amp</name><summary>a &amp; b &lt;c&gt;</summary><checksum type="sha256" pkgid="YES">dd</checksum><location href="amp-1.rpm"/></package>
</metadata>
"#;

        let document = MetadataDocument::parse(MetadataFlavor::Primary, xml)?;
        let entry = &document.packages[0];
        assert!(entry.xml.contains("a &amp; b &lt;c&gt;"));

        // Still parseable after a second round.
        let again = MetadataDocument::parse(MetadataFlavor::Primary, &document.to_xml())?;
        assert!(again.packages[0].xml.contains("a &amp; b &lt;c&gt;"));

        Ok(())
    }
}
