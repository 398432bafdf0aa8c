// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `repomd.xml` file format.

Parsing accepts both the canonical default-namespace serialization and the
prefixed form (`<repo:data>`) found in some historical repositories.
Serialization always declares the default namespace on the root with no
prefix: clients reject `<repo:data>`-style documents, so prefixed children
must never be emitted.
*/

use {
    crate::{
        error::{RepoPublishError, Result},
        rpm::{REPO_NS, RPM_NS},
    },
    quick_xml::{
        events::{BytesText, Event},
        Reader, Writer,
    },
    std::collections::BTreeMap,
};

/// A `<data>` record in a `repomd.xml` file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepoMdData {
    /// The record type: `primary`, `filelists`, `other`, or a `*_db` variant.
    pub data_type: String,
    /// SHA-256 of the stored (compressed) file.
    pub checksum: String,
    /// SHA-256 of the uncompressed payload.
    pub open_checksum: Option<String>,
    /// Location relative to the repository root, e.g. `repodata/<hex>-primary.xml.gz`.
    pub location: String,
    /// Creation time, seconds since the epoch.
    pub timestamp: u64,
    /// Size of the stored file in bytes.
    pub size: u64,
    /// Size of the uncompressed payload in bytes.
    pub open_size: Option<u64>,
    /// Schema version for sqlite mirror records.
    pub database_version: Option<u32>,
}

impl RepoMdData {
    /// The basename of the file under `repodata/`.
    pub fn basename(&self) -> &str {
        self.location.rsplit('/').next().unwrap_or(&self.location)
    }
}

/// A `repomd.xml` document.
#[derive(Clone, Debug, Default)]
pub struct RepoMd {
    /// Revision of the repository, an epoch-seconds value.
    pub revision: String,
    /// The metadata records constituting the repository.
    pub data: Vec<RepoMdData>,
}

impl RepoMd {
    /// Construct an instance by parsing XML text.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut repomd = Self::default();
        let mut buf = vec![];
        let mut current: Option<RepoMdData> = None;
        // Local name of the element whose text node is pending.
        let mut pending_text: Option<String> = None;

        loop {
            match reader.read_event(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    let local = local_name(e.name());

                    match local.as_str() {
                        "data" => {
                            let mut record = RepoMdData::default();
                            for attr in e.attributes() {
                                let attr = attr?;
                                if attr.key == b"type" {
                                    record.data_type =
                                        attr.unescape_and_decode_value(&reader)?;
                                }
                            }
                            current = Some(record);
                        }
                        "location" => {
                            if let Some(record) = current.as_mut() {
                                for attr in e.attributes() {
                                    let attr = attr?;
                                    if attr.key == b"href" {
                                        record.location =
                                            attr.unescape_and_decode_value(&reader)?;
                                    }
                                }
                            }
                        }
                        "revision" | "checksum" | "open-checksum" | "timestamp" | "size"
                        | "open-size" | "database_version" => {
                            pending_text = Some(local);
                        }
                        _ => {}
                    }
                }
                Event::Text(e) => {
                    if let Some(element) = pending_text.take() {
                        let text = e.unescape_and_decode(&reader)?;

                        match (element.as_str(), current.as_mut()) {
                            ("revision", None) => repomd.revision = text,
                            ("checksum", Some(record)) => record.checksum = text,
                            ("open-checksum", Some(record)) => {
                                record.open_checksum = Some(text)
                            }
                            ("timestamp", Some(record)) => {
                                record.timestamp = text.parse()?
                            }
                            ("size", Some(record)) => record.size = text.parse()?,
                            ("open-size", Some(record)) => {
                                record.open_size = Some(text.parse()?)
                            }
                            ("database_version", Some(record)) => {
                                record.database_version = Some(text.parse()?)
                            }
                            _ => {}
                        }
                    }
                }
                Event::End(e) => {
                    pending_text = None;

                    if local_name(e.name()) == "data" {
                        if let Some(record) = current.take() {
                            repomd.data.push(record);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }

            buf.clear();
        }

        if repomd.data.is_empty() && repomd.revision.is_empty() {
            return Err(RepoPublishError::MetadataParse(
                "repomd.xml contains no data records".to_string(),
            ));
        }

        Ok(repomd)
    }

    /// Obtain the record of the given type.
    pub fn record(&self, data_type: &str) -> Option<&RepoMdData> {
        self.data.iter().find(|d| d.data_type == data_type)
    }

    /// Insert a record, replacing any existing record of the same type.
    pub fn set_record(&mut self, record: RepoMdData) {
        if let Some(existing) = self
            .data
            .iter_mut()
            .find(|d| d.data_type == record.data_type)
        {
            *existing = record;
        } else {
            self.data.push(record);
        }
    }

    /// Remove every sqlite mirror record (`*_db` types).
    pub fn remove_db_records(&mut self) {
        self.data.retain(|d| !d.data_type.ends_with("_db"));
    }

    /// Record types appearing more than once, for validation.
    pub fn duplicate_types(&self) -> Vec<String> {
        let mut counts = BTreeMap::new();
        for record in &self.data {
            *counts.entry(record.data_type.clone()).or_insert(0usize) += 1;
        }

        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(data_type, _)| data_type)
            .collect()
    }

    /// Basenames of every file referenced by the index, plus `repomd.xml`
    /// itself. Anything else under `repodata/` is a candidate for sweeping.
    pub fn referenced_basenames(&self) -> Vec<String> {
        let mut names = self
            .data
            .iter()
            .map(|d| d.basename().to_string())
            .collect::<Vec<_>>();
        names.push("repomd.xml".to_string());

        names
    }

    /// Serialize to XML with the default namespace unprefixed.
    pub fn to_xml(&self) -> Result<String> {
        let mut out = Vec::new();
        out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        let mut writer = Writer::new_with_indent(&mut out, b' ', 2);

        writer
            .create_element("repomd")
            .with_attribute(("xmlns", REPO_NS))
            .with_attribute(("xmlns:rpm", RPM_NS))
            .write_inner_content(|w| {
                w.create_element("revision")
                    .write_text_content(BytesText::from_plain_str(&self.revision))?;

                for record in &self.data {
                    w.create_element("data")
                        .with_attribute(("type", record.data_type.as_str()))
                        .write_inner_content(|w| write_record(w, record))?;
                }

                Ok(())
            })?;

        out.push(b'\n');

        Ok(String::from_utf8(out).expect("repomd serialization is UTF-8"))
    }
}

fn write_record<W: std::io::Write>(
    w: &mut Writer<W>,
    record: &RepoMdData,
) -> quick_xml::Result<()> {
    w.create_element("checksum")
        .with_attribute(("type", "sha256"))
        .write_text_content(BytesText::from_plain_str(&record.checksum))?;

    if let Some(open_checksum) = &record.open_checksum {
        w.create_element("open-checksum")
            .with_attribute(("type", "sha256"))
            .write_text_content(BytesText::from_plain_str(open_checksum))?;
    }

    w.create_element("location")
        .with_attribute(("href", record.location.as_str()))
        .write_empty()?;

    w.create_element("timestamp")
        .write_text_content(BytesText::from_plain_str(&record.timestamp.to_string()))?;

    w.create_element("size")
        .write_text_content(BytesText::from_plain_str(&record.size.to_string()))?;

    if let Some(open_size) = record.open_size {
        w.create_element("open-size")
            .write_text_content(BytesText::from_plain_str(&open_size.to_string()))?;
    }

    if let Some(version) = record.database_version {
        w.create_element("database_version")
            .write_text_content(BytesText::from_plain_str(&version.to_string()))?;
    }

    Ok(())
}

/// The local part of a possibly prefixed element name.
fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_record(data_type: &str) -> RepoMdData {
        RepoMdData {
            data_type: data_type.to_string(),
            checksum: "aa11".to_string(),
            open_checksum: Some("bb22".to_string()),
            location: format!("repodata/aa11-{}.xml.gz", data_type),
            timestamp: 1700000000,
            size: 512,
            open_size: Some(2048),
            database_version: None,
        }
    }

    #[test]
    fn serialize_parse_round_trip() -> Result<()> {
        let mut repomd = RepoMd {
            revision: "1700000000".to_string(),
            data: vec![sample_record("primary"), sample_record("filelists")],
        };
        repomd.data[1].database_version = Some(10);

        let xml = repomd.to_xml()?;
        let reparsed = RepoMd::from_xml(&xml)?;

        assert_eq!(reparsed.revision, "1700000000");
        assert_eq!(reparsed.data, repomd.data);

        // Idempotent: serializing the reparsed document is byte identical.
        assert_eq!(reparsed.to_xml()?, xml);

        Ok(())
    }

    #[test]
    fn serialization_never_prefixes_default_namespace() -> Result<()> {
        let repomd = RepoMd {
            revision: "1".to_string(),
            data: vec![sample_record("primary")],
        };

        let xml = repomd.to_xml()?;
        assert!(xml.contains("<repomd xmlns=\"http://linux.duke.edu/metadata/repo\""));
        assert!(xml.contains("<data type=\"primary\">"));
        assert!(!xml.contains("<repo:"));

        Ok(())
    }

    #[test]
    fn parses_prefixed_documents() -> Result<()> {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<repo:repomd xmlns:repo="http://linux.duke.edu/metadata/repo">
  <repo:revision>123</repo:revision>
  <repo:data type="primary">
    <repo:checksum type="sha256">cafe</repo:checksum>
    <repo:location href="repodata/cafe-primary.xml.gz"/>
    <repo:timestamp>11</repo:timestamp>
    <repo:size>22</repo:size>
  </repo:data>
</repo:repomd>"#;

        let repomd = RepoMd::from_xml(xml)?;

        assert_eq!(repomd.revision, "123");
        assert_eq!(repomd.data.len(), 1);
        assert_eq!(repomd.data[0].checksum, "cafe");
        assert_eq!(repomd.data[0].location, "repodata/cafe-primary.xml.gz");

        Ok(())
    }

    #[test]
    fn set_record_replaces_by_type() {
        let mut repomd = RepoMd {
            revision: "1".to_string(),
            data: vec![sample_record("primary")],
        };

        let mut replacement = sample_record("primary");
        replacement.checksum = "new".to_string();
        repomd.set_record(replacement);

        assert_eq!(repomd.data.len(), 1);
        assert_eq!(repomd.data[0].checksum, "new");
    }

    #[test]
    fn remove_db_records_strips_all_db_types() {
        let mut repomd = RepoMd {
            revision: "1".to_string(),
            data: vec![
                sample_record("primary"),
                sample_record("primary_db"),
                sample_record("filelists_db"),
                sample_record("other_db"),
            ],
        };

        repomd.remove_db_records();

        assert_eq!(repomd.data.len(), 1);
        assert_eq!(repomd.data[0].data_type, "primary");
    }

    #[test]
    fn duplicate_type_detection() {
        let repomd = RepoMd {
            revision: "1".to_string(),
            data: vec![
                sample_record("primary"),
                sample_record("primary_db"),
                sample_record("primary_db"),
            ],
        };

        assert_eq!(repomd.duplicate_types(), vec!["primary_db".to_string()]);
    }

    #[test]
    fn referenced_basenames_includes_index() {
        let repomd = RepoMd {
            revision: "1".to_string(),
            data: vec![sample_record("primary")],
        };

        let names = repomd.referenced_basenames();
        assert!(names.contains(&"aa11-primary.xml.gz".to_string()));
        assert!(names.contains(&"repomd.xml".to_string()));
    }
}
