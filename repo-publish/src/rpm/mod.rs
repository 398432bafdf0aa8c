// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM repository support.

An RPM repository is a storage prefix (e.g. `el9/x86_64`) holding package
files next to a `repodata/` directory. `repodata/repomd.xml` indexes the
metadata documents: primary, filelists, and other XML plus their sqlite
mirrors. Documents are content addressed; every mutation produces new
file names and rewrites the index.
*/

pub mod engine;
pub mod metadata;
pub mod repomd;
pub mod sqlite;
pub mod validate;

/// Namespace of the `repomd.xml` document.
pub const REPO_NS: &str = "http://linux.duke.edu/metadata/repo";

/// Namespace of `rpm:` prefixed elements in primary metadata.
pub const RPM_NS: &str = "http://linux.duke.edu/metadata/rpm";

/// Namespace of `primary.xml` documents.
pub const COMMON_NS: &str = "http://linux.duke.edu/metadata/common";

/// Namespace of `filelists.xml` documents.
pub const FILELISTS_NS: &str = "http://linux.duke.edu/metadata/filelists";

/// Namespace of `other.xml` documents.
pub const OTHER_NS: &str = "http://linux.duke.edu/metadata/other";
