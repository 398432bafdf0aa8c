// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Packages` index documents.

A `Packages` file holds one stanza per package for a given
(distribution, component, architecture). Stanzas are kept sorted by
`(package, version)` and fields are emitted in a canonical order so that
parsing a document this module wrote and serializing it again is
byte-identical.
*/

use {
    crate::{
        debian::control::{parse_paragraphs, ControlParagraph},
        error::Result,
        inspect::DebPackage,
    },
    std::collections::BTreeMap,
};

/// Canonical leading field order for a package stanza. Fields not listed
/// here retain their original relative order after these.
const FIELD_ORDER: &[&str] = &[
    "Package",
    "Version",
    "Architecture",
    "Maintainer",
    "Installed-Size",
    "Depends",
    "Filename",
    "Size",
    "MD5sum",
    "SHA1",
    "SHA256",
    "Description",
];

/// An in-memory `Packages` index.
#[derive(Clone, Debug, Default)]
pub struct PackagesIndex {
    // (package, version) -> stanza.
    stanzas: BTreeMap<(String, String), ControlParagraph<'static>>,
}

impl PackagesIndex {
    /// Parse an uncompressed `Packages` document.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let paragraphs = parse_paragraphs(std::io::Cursor::new(data))?;

        let mut index = Self::default();
        for paragraph in paragraphs {
            let package = paragraph.field_str("Package").unwrap_or_default().to_string();
            let version = paragraph.field_str("Version").unwrap_or_default().to_string();
            index.stanzas.insert((package, version), paragraph);
        }

        Ok(index)
    }

    /// Number of stanzas in the index.
    pub fn len(&self) -> usize {
        self.stanzas.len()
    }

    /// Whether the index has no stanzas.
    pub fn is_empty(&self) -> bool {
        self.stanzas.is_empty()
    }

    /// Iterate stanzas in `(package, version)` order.
    pub fn iter(&self) -> impl Iterator<Item = &ControlParagraph<'static>> {
        self.stanzas.values()
    }

    /// Insert or replace the stanza for an inspected package.
    ///
    /// The stanza carries the package's control fields followed by the
    /// repository-assigned fields (`Filename`, `Size`, digests).
    pub fn upsert_package(&mut self, package: &DebPackage, pool_path: &str) {
        let mut stanza = package.control.clone();

        stanza.set_field_from_string("Filename".into(), pool_path.to_string().into());
        stanza.set_field_from_string("Size".into(), package.size.to_string().into());
        stanza.set_field_from_string("MD5sum".into(), package.digests.md5.digest_hex().into());
        stanza.set_field_from_string("SHA1".into(), package.digests.sha1.digest_hex().into());
        stanza.set_field_from_string("SHA256".into(), package.digests.sha256.digest_hex().into());

        self.stanzas
            .insert((package.name.clone(), package.version.clone()), stanza);
    }

    /// Remove stanzas matching a selector: either a bare package name, which
    /// removes every version, or `name_version`, which removes one.
    ///
    /// Returns the removed stanzas.
    pub fn remove_matching(&mut self, selector: &str) -> Vec<ControlParagraph<'static>> {
        let keys = self
            .stanzas
            .keys()
            .filter(|(package, version)| {
                if selector.contains('_') {
                    format!("{}_{}", package, version) == selector
                } else {
                    package == selector
                }
            })
            .cloned()
            .collect::<Vec<_>>();

        keys.iter()
            .filter_map(|key| self.stanzas.remove(key))
            .collect()
    }

    /// Map of `filename -> sha256` over all stanzas, for dedup.
    pub fn filename_checksums(&self) -> BTreeMap<String, String> {
        self.stanzas
            .values()
            .filter_map(|stanza| {
                let filename = stanza.field_str("Filename")?;
                let sha256 = stanza.field_str("SHA256")?;
                let base = filename.rsplit('/').next().unwrap_or(filename);
                Some((base.to_string(), sha256.to_string()))
            })
            .collect()
    }

    /// All pool paths referenced by the index.
    pub fn pool_paths(&self) -> Vec<String> {
        self.stanzas
            .values()
            .filter_map(|stanza| stanza.field_str("Filename").map(String::from))
            .collect()
    }

    /// Serialize the index: stanzas in key order, canonical field order,
    /// one blank line after each stanza.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![];

        for stanza in self.stanzas.values() {
            let ordered = order_fields(stanza);
            ordered.write(&mut out).expect("write to Vec cannot fail");
            out.push(b'\n');
        }

        out
    }
}

/// Rebuild a stanza with the canonical leading fields first and any
/// remaining fields in their original order.
fn order_fields(stanza: &ControlParagraph<'static>) -> ControlParagraph<'static> {
    let mut ordered = ControlParagraph::default();

    for name in FIELD_ORDER {
        if let Some(field) = stanza.field(name) {
            ordered.set_field(field.clone());
        }
    }

    for field in stanza.iter_fields() {
        if !FIELD_ORDER
            .iter()
            .any(|name| name.eq_ignore_ascii_case(field.name()))
        {
            ordered.set_field(field.clone());
        }
    }

    ordered
}
