// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! SQLite mirror databases.

After every metadata mutation the three sqlite mirrors (`primary_db`,
`filelists_db`, `other_db`) are regenerated from the post-mutation XML
documents. Schemas match what dnf/yum clients expect (`db_info` with
dbversion 10, `packages`, dependency tables, `filelist`, `changelog`). The
databases are bzip2 compressed for upload; the uncompressed files are not
retained.
*/

use {
    crate::{
        error::{RepoPublishError, Result},
        io::bzip2_compress_path,
        rpm::metadata::{MetadataDocument, MetadataFlavor, PackageEntry},
    },
    indoc::indoc,
    quick_xml::{events::Event, Reader},
    rusqlite::{params, Connection},
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

/// dnf's expected schema version.
const DB_VERSION: u32 = 10;

const PRIMARY_SCHEMA: &[&str] = &[
    indoc! {"
        CREATE TABLE db_info (
            dbversion INTEGER,
            checksum TEXT
        )"},
    indoc! {"
        CREATE TABLE packages (
            pkgKey INTEGER PRIMARY KEY,
            pkgId TEXT,
            name TEXT,
            arch TEXT,
            version TEXT,
            epoch TEXT,
            release TEXT,
            summary TEXT,
            description TEXT,
            url TEXT,
            time_file INTEGER,
            time_build INTEGER,
            rpm_license TEXT,
            rpm_vendor TEXT,
            rpm_group TEXT,
            rpm_buildhost TEXT,
            rpm_sourcerpm TEXT,
            rpm_header_start INTEGER,
            rpm_header_end INTEGER,
            rpm_packager TEXT,
            size_package INTEGER,
            size_installed INTEGER,
            size_archive INTEGER,
            location_href TEXT,
            location_base TEXT,
            checksum_type TEXT
        )"},
    indoc! {"
        CREATE TABLE provides (
            pkgKey INTEGER,
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            FOREIGN KEY(pkgKey) REFERENCES packages(pkgKey)
        )"},
    indoc! {"
        CREATE TABLE requires (
            pkgKey INTEGER,
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            pre BOOLEAN,
            FOREIGN KEY(pkgKey) REFERENCES packages(pkgKey)
        )"},
    indoc! {"
        CREATE TABLE conflicts (
            pkgKey INTEGER,
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            FOREIGN KEY(pkgKey) REFERENCES packages(pkgKey)
        )"},
    indoc! {"
        CREATE TABLE obsoletes (
            pkgKey INTEGER,
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            FOREIGN KEY(pkgKey) REFERENCES packages(pkgKey)
        )"},
    indoc! {"
        CREATE TABLE files (
            pkgKey INTEGER,
            name TEXT,
            type TEXT,
            FOREIGN KEY(pkgKey) REFERENCES packages(pkgKey)
        )"},
];

const PRIMARY_INDICES: &[&str] = &[
    "CREATE INDEX packagename ON packages (name)",
    "CREATE INDEX packageId ON packages (pkgId)",
    "CREATE INDEX providesname ON provides (name)",
    "CREATE INDEX requiresname ON requires (name)",
];

const FILELISTS_SCHEMA: &[&str] = &[
    indoc! {"
        CREATE TABLE db_info (
            dbversion INTEGER,
            checksum TEXT
        )"},
    indoc! {"
        CREATE TABLE packages (
            pkgKey INTEGER PRIMARY KEY,
            pkgId TEXT
        )"},
    indoc! {"
        CREATE TABLE filelist (
            pkgKey INTEGER,
            dirname TEXT,
            filenames TEXT,
            filetypes TEXT,
            FOREIGN KEY(pkgKey) REFERENCES packages(pkgKey)
        )"},
];

const FILELISTS_INDICES: &[&str] = &[
    "CREATE INDEX keyfile ON filelist (pkgKey)",
    "CREATE INDEX pkgId ON packages (pkgId)",
];

const OTHER_SCHEMA: &[&str] = &[
    indoc! {"
        CREATE TABLE db_info (
            dbversion INTEGER,
            checksum TEXT
        )"},
    indoc! {"
        CREATE TABLE packages (
            pkgKey INTEGER PRIMARY KEY,
            pkgId TEXT
        )"},
    indoc! {"
        CREATE TABLE changelog (
            pkgKey INTEGER,
            author TEXT,
            date INTEGER,
            changelog TEXT,
            FOREIGN KEY(pkgKey) REFERENCES packages(pkgKey)
        )"},
];

const OTHER_INDICES: &[&str] = &[
    "CREATE INDEX keychange ON changelog (pkgKey)",
    "CREATE INDEX pkgId ON packages (pkgId)",
];

/// Tables a valid mirror of each type must contain.
pub fn expected_tables(db_type: &str) -> &'static [&'static str] {
    match db_type {
        "primary_db" => &["db_info", "packages", "provides", "requires", "files"],
        "filelists_db" => &["db_info", "packages", "filelist"],
        "other_db" => &["db_info", "packages", "changelog"],
        _ => &[],
    }
}

/// Build all three mirrors from post-mutation documents.
///
/// Stale `*.sqlite` / `*.sqlite.bz2` files in `repodata_dir` are deleted
/// first so an aborted earlier run cannot leak into the upload set. Returns
/// `db_type -> path` of the bzip2-compressed databases.
pub fn build_mirrors(
    repodata_dir: &Path,
    primary: &MetadataDocument,
    filelists: &MetadataDocument,
    other: &MetadataDocument,
) -> Result<BTreeMap<String, PathBuf>> {
    remove_stale_databases(repodata_dir)?;

    let mut databases = BTreeMap::new();

    for document in [primary, filelists, other] {
        let db_path = repodata_dir.join(format!("{}.sqlite", document.flavor.type_name()));
        build_database(&db_path, document)?;

        let bz2_path = repodata_dir.join(format!("{}.sqlite.bz2", document.flavor.type_name()));
        bzip2_compress_path(&db_path, &bz2_path)?;
        std::fs::remove_file(&db_path)?;

        databases.insert(document.flavor.db_type_name(), bz2_path);
    }

    Ok(databases)
}

/// Delete leftover sqlite artifacts from the staging directory.
pub fn remove_stale_databases(repodata_dir: &Path) -> Result<()> {
    if !repodata_dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(repodata_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();

        if name.ends_with(".sqlite") || name.ends_with(".sqlite.bz2") {
            std::fs::remove_file(entry.path())?;
        }
    }

    Ok(())
}

/// The number of rows in a database's `packages` table.
pub fn packages_row_count(db_path: &Path) -> Result<u64> {
    let conn = Connection::open(db_path)?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;

    Ok(count.max(0) as u64)
}

/// Whether a database contains a table of the given name.
pub fn has_table(db_path: &Path, table: &str) -> Result<bool> {
    let conn = Connection::open(db_path)?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

fn build_database(db_path: &Path, document: &MetadataDocument) -> Result<()> {
    if db_path.exists() {
        std::fs::remove_file(db_path)?;
    }

    let mut conn = Connection::open(db_path)?;

    let schema: &[&str] = match document.flavor {
        MetadataFlavor::Primary => PRIMARY_SCHEMA,
        MetadataFlavor::Filelists => FILELISTS_SCHEMA,
        MetadataFlavor::Other => OTHER_SCHEMA,
    };

    for statement in schema {
        conn.execute(statement, [])?;
    }

    let txn = conn.transaction()?;
    txn.execute(
        "INSERT INTO db_info VALUES (?1, ?2)",
        params![DB_VERSION, ""],
    )?;

    for (index, entry) in document.packages.iter().enumerate() {
        let pkg_key = (index + 1) as i64;

        match document.flavor {
            MetadataFlavor::Primary => insert_primary_entry(&txn, pkg_key, entry)?,
            MetadataFlavor::Filelists => insert_filelists_entry(&txn, pkg_key, entry)?,
            MetadataFlavor::Other => insert_other_entry(&txn, pkg_key, entry)?,
        }
    }

    txn.commit()?;

    let indices: &[&str] = match document.flavor {
        MetadataFlavor::Primary => PRIMARY_INDICES,
        MetadataFlavor::Filelists => FILELISTS_INDICES,
        MetadataFlavor::Other => OTHER_INDICES,
    };

    for statement in indices {
        conn.execute(statement, [])?;
    }

    Ok(())
}

/// One dependency entry (`rpm:entry`) under provides/requires/conflicts/obsoletes.
#[derive(Debug, Default)]
struct DependencyRow {
    name: String,
    flags: String,
    epoch: String,
    version: String,
    release: String,
    pre: bool,
}

#[derive(Debug, Default)]
struct PrimaryFields {
    pkg_id: String,
    name: String,
    arch: String,
    version: String,
    epoch: String,
    release: String,
    summary: String,
    description: String,
    packager: String,
    url: String,
    time_file: i64,
    time_build: i64,
    license: String,
    vendor: String,
    group: String,
    buildhost: String,
    sourcerpm: String,
    header_start: i64,
    header_end: i64,
    size_package: i64,
    size_installed: i64,
    size_archive: i64,
    location_href: String,
    checksum_type: String,
    provides: Vec<DependencyRow>,
    requires: Vec<DependencyRow>,
    conflicts: Vec<DependencyRow>,
    obsoletes: Vec<DependencyRow>,
    files: Vec<(String, String)>,
}

fn insert_primary_entry(
    txn: &rusqlite::Transaction,
    pkg_key: i64,
    entry: &PackageEntry,
) -> Result<()> {
    let fields = parse_primary_entry(&entry.xml)?;

    txn.execute(
        indoc! {"
            INSERT INTO packages (
                pkgKey, pkgId, name, arch, version, epoch, release,
                summary, description, url, time_file, time_build,
                rpm_license, rpm_vendor, rpm_group, rpm_buildhost,
                rpm_sourcerpm, rpm_header_start, rpm_header_end,
                rpm_packager, size_package, size_installed, size_archive,
                location_href, checksum_type
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
            )"},
        params![
            pkg_key,
            fields.pkg_id,
            fields.name,
            fields.arch,
            fields.version,
            fields.epoch,
            fields.release,
            fields.summary,
            fields.description,
            fields.url,
            fields.time_file,
            fields.time_build,
            fields.license,
            fields.vendor,
            fields.group,
            fields.buildhost,
            fields.sourcerpm,
            fields.header_start,
            fields.header_end,
            fields.packager,
            fields.size_package,
            fields.size_installed,
            fields.size_archive,
            fields.location_href,
            fields.checksum_type,
        ],
    )?;

    for (table, rows) in [
        ("provides", &fields.provides),
        ("conflicts", &fields.conflicts),
        ("obsoletes", &fields.obsoletes),
    ] {
        for row in rows {
            txn.execute(
                &format!(
                    "INSERT INTO {} (pkgKey, name, flags, epoch, version, release) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    table
                ),
                params![pkg_key, row.name, row.flags, row.epoch, row.version, row.release],
            )?;
        }
    }

    for row in &fields.requires {
        txn.execute(
            "INSERT INTO requires (pkgKey, name, flags, epoch, version, release, pre) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![pkg_key, row.name, row.flags, row.epoch, row.version, row.release, row.pre],
        )?;
    }

    for (path, file_type) in &fields.files {
        txn.execute(
            "INSERT INTO files (pkgKey, name, type) VALUES (?1, ?2, ?3)",
            params![pkg_key, path, file_type],
        )?;
    }

    Ok(())
}

fn insert_filelists_entry(
    txn: &rusqlite::Transaction,
    pkg_key: i64,
    entry: &PackageEntry,
) -> Result<()> {
    let files = parse_file_elements(&entry.xml)?;

    txn.execute(
        "INSERT INTO packages (pkgKey, pkgId) VALUES (?1, ?2)",
        params![pkg_key, entry.pkgid.clone().unwrap_or_default()],
    )?;

    // dnf stores the filelist grouped by directory with `/`-joined names.
    let mut by_dir: BTreeMap<String, (Vec<String>, Vec<String>)> = BTreeMap::new();

    for (path, file_type) in files {
        let (dirname, basename) = match path.rsplit_once('/') {
            Some(("", base)) => ("/".to_string(), base.to_string()),
            Some((dir, base)) => (dir.to_string(), base.to_string()),
            None => ("/".to_string(), path),
        };

        let slot = by_dir.entry(dirname).or_default();
        slot.0.push(basename);
        slot.1.push(file_type);
    }

    for (dirname, (names, types)) in by_dir {
        txn.execute(
            "INSERT INTO filelist (pkgKey, dirname, filenames, filetypes) \
             VALUES (?1, ?2, ?3, ?4)",
            params![pkg_key, dirname, names.join("/"), types.join("/")],
        )?;
    }

    Ok(())
}

fn insert_other_entry(
    txn: &rusqlite::Transaction,
    pkg_key: i64,
    entry: &PackageEntry,
) -> Result<()> {
    txn.execute(
        "INSERT INTO packages (pkgKey, pkgId) VALUES (?1, ?2)",
        params![pkg_key, entry.pkgid.clone().unwrap_or_default()],
    )?;

    for (author, date, text) in parse_changelog_elements(&entry.xml)? {
        txn.execute(
            "INSERT INTO changelog (pkgKey, author, date, changelog) \
             VALUES (?1, ?2, ?3, ?4)",
            params![pkg_key, author, date, text],
        )?;
    }

    Ok(())
}

fn attr_value(
    e: &quick_xml::events::BytesStart,
    reader: &Reader<&[u8]>,
    key: &[u8],
) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key == key {
            return Ok(Some(attr.unescape_and_decode_value(reader)?));
        }
    }

    Ok(None)
}

fn parse_dependency_entry(
    e: &quick_xml::events::BytesStart,
    reader: &Reader<&[u8]>,
) -> Result<DependencyRow> {
    Ok(DependencyRow {
        name: attr_value(e, reader, b"name")?.unwrap_or_default(),
        flags: attr_value(e, reader, b"flags")?.unwrap_or_default(),
        epoch: attr_value(e, reader, b"epoch")?.unwrap_or_default(),
        version: attr_value(e, reader, b"ver")?.unwrap_or_default(),
        release: attr_value(e, reader, b"rel")?.unwrap_or_default(),
        pre: attr_value(e, reader, b"pre")?.as_deref() == Some("1"),
    })
}

/// Parse the fields the packages table needs out of a normalized primary
/// `<package>` entry.
fn parse_primary_entry(xml: &str) -> Result<PrimaryFields> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut fields = PrimaryFields::default();
    let mut buf = vec![];
    let mut path: Vec<String> = vec![];
    // `type` attribute of the `<file>` element whose text is pending.
    let mut current_file_type: Option<String> = None;

    loop {
        let event = reader.read_event(&mut buf)?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(e.name()).to_string();
                let is_empty = matches!(event, Event::Empty(_));

                let in_package = path.len() == 1;
                let in_format = path.len() == 2 && path[1] == "format";

                if in_package {
                    match name.as_str() {
                        "version" => {
                            fields.epoch = attr_value(e, &reader, b"epoch")?.unwrap_or_default();
                            fields.version = attr_value(e, &reader, b"ver")?.unwrap_or_default();
                            fields.release = attr_value(e, &reader, b"rel")?.unwrap_or_default();
                        }
                        "checksum" => {
                            fields.checksum_type =
                                attr_value(e, &reader, b"type")?.unwrap_or_default();
                        }
                        "time" => {
                            fields.time_file = attr_value(e, &reader, b"file")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0);
                            fields.time_build = attr_value(e, &reader, b"build")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0);
                        }
                        "size" => {
                            fields.size_package = attr_value(e, &reader, b"package")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0);
                            fields.size_installed = attr_value(e, &reader, b"installed")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0);
                            fields.size_archive = attr_value(e, &reader, b"archive")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0);
                        }
                        "location" => {
                            fields.location_href =
                                attr_value(e, &reader, b"href")?.unwrap_or_default();
                        }
                        _ => {}
                    }
                } else if in_format && name == "rpm:header-range" {
                    fields.header_start = attr_value(e, &reader, b"start")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    fields.header_end = attr_value(e, &reader, b"end")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                } else if in_format && name == "file" {
                    current_file_type =
                        Some(attr_value(e, &reader, b"type")?.unwrap_or_default());
                } else if path.len() == 3 && name == "rpm:entry" {
                    let row = parse_dependency_entry(e, &reader)?;
                    match path[2].as_str() {
                        "rpm:provides" => fields.provides.push(row),
                        "rpm:requires" => fields.requires.push(row),
                        "rpm:conflicts" => fields.conflicts.push(row),
                        "rpm:obsoletes" => fields.obsoletes.push(row),
                        _ => {}
                    }
                }

                if !is_empty {
                    path.push(name);
                }
            }
            Event::Text(e) => {
                let value = e.unescape_and_decode(&reader)?;

                match path.last().map(String::as_str) {
                    Some("name") if path.len() == 2 => fields.name = value,
                    Some("arch") if path.len() == 2 => fields.arch = value,
                    Some("checksum") if path.len() == 2 => fields.pkg_id = value,
                    Some("summary") if path.len() == 2 => fields.summary = value,
                    Some("description") if path.len() == 2 => fields.description = value,
                    Some("packager") if path.len() == 2 => fields.packager = value,
                    Some("url") if path.len() == 2 => fields.url = value,
                    Some("rpm:license") => fields.license = value,
                    Some("rpm:vendor") => fields.vendor = value,
                    Some("rpm:group") => fields.group = value,
                    Some("rpm:buildhost") => fields.buildhost = value,
                    Some("rpm:sourcerpm") => fields.sourcerpm = value,
                    Some("file") if path.len() == 3 => {
                        fields
                            .files
                            .push((value, current_file_type.take().unwrap_or_default()));
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                if path.pop().as_deref() == Some("file") {
                    current_file_type = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if fields.pkg_id.is_empty() {
        return Err(RepoPublishError::MetadataParse(format!(
            "primary entry for {} lacks a checksum",
            fields.name
        )));
    }

    Ok(fields)
}

/// Parse `<file [type]>path</file>` children from a filelists entry.
fn parse_file_elements(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut files = vec![];
    let mut buf = vec![];
    let mut current_type: Option<String> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event(&mut buf)? {
            Event::Start(e) => {
                if depth == 1 && e.name() == b"file" {
                    current_type = Some(attr_value(&e, &reader, b"type")?.unwrap_or_default());
                }
                depth += 1;
            }
            Event::Text(e) => {
                if let Some(file_type) = current_type.take() {
                    files.push((e.unescape_and_decode(&reader)?, file_type));
                }
            }
            Event::End(_) => {
                depth -= 1;
                current_type = None;
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    Ok(files)
}

/// Parse `<changelog author date>text</changelog>` children from an other entry.
fn parse_changelog_elements(xml: &str) -> Result<Vec<(String, i64, String)>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut changelogs = vec![];
    let mut buf = vec![];
    let mut current: Option<(String, i64)> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event(&mut buf)? {
            Event::Start(e) => {
                if depth == 1 && e.name() == b"changelog" {
                    let author = attr_value(&e, &reader, b"author")?.unwrap_or_default();
                    let date = attr_value(&e, &reader, b"date")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    current = Some((author, date));
                }
                depth += 1;
            }
            Event::Text(e) => {
                if let Some((author, date)) = current.take() {
                    changelogs.push((author, date, e.unescape_and_decode(&reader)?));
                }
            }
            Event::End(_) => {
                depth -= 1;
                current = None;
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    Ok(changelogs)
}

#[cfg(test)]
mod test {
    use super::*;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm"><name>hello-world</name><arch>x86_64</arch><version epoch="0" ver="1.0.0" rel="1.el9"/><checksum type="sha256" pkgid="YES">aaa111</checksum><summary>Hello</summary><description>Says hello</description><packager>Packager</packager><url>https://example.com</url><time file="100" build="90"/><size package="300" installed="500" archive="520"/><location href="hello-world-1.0.0-1.el9.x86_64.rpm"/><format><rpm:license>MIT</rpm:license><rpm:vendor>Acme</rpm:vendor><rpm:group>Unspecified</rpm:group><rpm:buildhost>build1</rpm:buildhost><rpm:sourcerpm>hello-world-1.0.0-1.el9.src.rpm</rpm:sourcerpm><rpm:header-range start="440" end="2210"/><rpm:provides><rpm:entry name="hello-world" flags="EQ" epoch="0" ver="1.0.0" rel="1.el9"/></rpm:provides><rpm:requires><rpm:entry name="libc.so.6" pre="1"/></rpm:requires><file>/usr/bin/hello</file><file type="dir">/usr/share/hello</file></format></package>
<package type="rpm"><name>goodbye-forever</name><arch>x86_64</arch><version epoch="0" ver="2.0.0" rel="1.el9"/><checksum type="sha256" pkgid="YES">bbb222</checksum><summary>Bye</summary><description>Says goodbye</description><time file="101" build="91"/><size package="301" installed="501" archive="521"/><location href="goodbye-forever-2.0.0-1.el9.x86_64.rpm"/><format><rpm:license>MIT</rpm:license></format></package>
</metadata>
"#;

    const FILELISTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="2">
<package pkgid="aaa111" name="hello-world" arch="x86_64"><version epoch="0" ver="1.0.0" rel="1.el9"/><file>/usr/bin/hello</file><file type="dir">/usr/share/hello</file><file>/usr/share/hello/readme</file></package>
<package pkgid="bbb222" name="goodbye-forever" arch="x86_64"><version epoch="0" ver="2.0.0" rel="1.el9"/><file>/usr/bin/goodbye</file></package>
</filelists>
"#;

    const OTHER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<otherdata xmlns="http://linux.duke.edu/metadata/other" packages="2">
<package pkgid="aaa111" name="hello-world" arch="x86_64"><version epoch="0" ver="1.0.0" rel="1.el9"/><changelog author="A Dev - 1.0.0-1" date="1600000000">- initial release</changelog></package>
<package pkgid="bbb222" name="goodbye-forever" arch="x86_64"><version epoch="0" ver="2.0.0" rel="1.el9"/></package>
</otherdata>
"#;

    fn documents() -> (MetadataDocument, MetadataDocument, MetadataDocument) {
        (
            MetadataDocument::parse(MetadataFlavor::Primary, PRIMARY).unwrap(),
            MetadataDocument::parse(MetadataFlavor::Filelists, FILELISTS).unwrap(),
            MetadataDocument::parse(MetadataFlavor::Other, OTHER).unwrap(),
        )
    }

    #[test]
    fn builds_all_three_mirrors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (primary, filelists, other) = documents();

        let databases = build_mirrors(dir.path(), &primary, &filelists, &other)?;

        assert_eq!(
            databases.keys().collect::<Vec<_>>(),
            vec!["filelists_db", "other_db", "primary_db"]
        );

        for path in databases.values() {
            assert!(path.exists());
            assert!(path.to_string_lossy().ends_with(".sqlite.bz2"));
        }

        // Uncompressed databases are not left behind.
        assert!(!dir.path().join("primary.sqlite").exists());

        Ok(())
    }

    #[test]
    fn primary_rows_match_xml() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (primary, _, _) = documents();

        let db_path = dir.path().join("primary.sqlite");
        build_database(&db_path, &primary)?;

        assert_eq!(packages_row_count(&db_path)?, 2);

        let conn = Connection::open(&db_path)?;
        let (name, version, href, license): (String, String, String, String) = conn.query_row(
            "SELECT name, version, location_href, rpm_license FROM packages WHERE pkgId = 'aaa111'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        assert_eq!(name, "hello-world");
        assert_eq!(version, "1.0.0");
        assert_eq!(href, "hello-world-1.0.0-1.el9.x86_64.rpm");
        assert_eq!(license, "MIT");

        let provides: i64 =
            conn.query_row("SELECT COUNT(*) FROM provides", [], |row| row.get(0))?;
        assert_eq!(provides, 1);

        let pre: bool = conn.query_row(
            "SELECT pre FROM requires WHERE name = 'libc.so.6'",
            [],
            |row| row.get(0),
        )?;
        assert!(pre);

        let file_type: String = conn.query_row(
            "SELECT type FROM files WHERE name = '/usr/bin/hello'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(file_type, "");

        let dir_type: String = conn.query_row(
            "SELECT type FROM files WHERE name = '/usr/share/hello'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(dir_type, "dir");

        Ok(())
    }

    #[test]
    fn filelists_rows_grouped_by_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (_, filelists, _) = documents();

        let db_path = dir.path().join("filelists.sqlite");
        build_database(&db_path, &filelists)?;

        assert_eq!(packages_row_count(&db_path)?, 2);

        let conn = Connection::open(&db_path)?;
        let (filenames, filetypes): (String, String) = conn.query_row(
            "SELECT filenames, filetypes FROM filelist \
             WHERE dirname = '/usr/share' AND pkgKey = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        assert_eq!(filenames, "hello");
        assert_eq!(filetypes, "dir");

        Ok(())
    }

    #[test]
    fn other_rows_carry_changelogs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (_, _, other) = documents();

        let db_path = dir.path().join("other.sqlite");
        build_database(&db_path, &other)?;

        let conn = Connection::open(&db_path)?;
        let (author, date, text): (String, i64, String) = conn.query_row(
            "SELECT author, date, changelog FROM changelog WHERE pkgKey = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        assert_eq!(author, "A Dev - 1.0.0-1");
        assert_eq!(date, 1600000000);
        assert_eq!(text, "- initial release");

        Ok(())
    }

    #[test]
    fn db_info_and_expected_tables_present() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (primary, _, _) = documents();

        let db_path = dir.path().join("primary.sqlite");
        build_database(&db_path, &primary)?;

        for table in expected_tables("primary_db") {
            assert!(has_table(&db_path, table)?, "missing table {}", table);
        }

        let conn = Connection::open(&db_path)?;
        let version: u32 =
            conn.query_row("SELECT dbversion FROM db_info", [], |row| row.get(0))?;
        assert_eq!(version, DB_VERSION);

        Ok(())
    }

    #[test]
    fn stale_databases_are_removed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("old.sqlite"), b"stale")?;
        std::fs::write(dir.path().join("old.sqlite.bz2"), b"stale")?;
        std::fs::write(dir.path().join("keep-primary.xml.gz"), b"keep")?;

        remove_stale_databases(dir.path())?;

        assert!(!dir.path().join("old.sqlite").exists());
        assert!(!dir.path().join("old.sqlite.bz2").exists());
        assert!(dir.path().join("keep-primary.xml.gz").exists());

        Ok(())
    }
}
