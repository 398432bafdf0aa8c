// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package repository publishing.

This crate implements publishing, updating, and removing packages in
RPM/YUM and Debian/APT repositories whose canonical storage lives behind a
pluggable backend, such as an S3 bucket or a local directory tree. Rather
than regenerating repository metadata from the full package set on every
change, the engines mutate the existing metadata documents in place and
upload only what changed, while preserving the bit-exact formats package
manager clients require.

# A Tour of Functionality

Storage is abstracted by [storage::StorageBackend], with an S3 driver
([storage::s3::S3Backend]) and a local filesystem driver
([storage::local::LocalBackend]). [storage::create_backend()] resolves a
driver from configuration.

Configuration is a flat dot-key JSON mapping handled by
[config::RepoConfig], with per-family overrides and automatic migration of
legacy key names.

Package control metadata is extracted by [inspect::RpmPackage] and
[inspect::DebPackage], which delegate to the system `rpm` and `dpkg-deb`
tools through the [tools::ToolInvoker] abstraction. The same abstraction
wraps the `createrepo_c` metadata generator and lets tests substitute
stubs.

The RPM metadata documents live in [rpm::repomd] (the `repomd.xml` index),
[rpm::metadata] (primary/filelists/other, with namespace-preserving
parse/mutate/serialize), and [rpm::sqlite] (the `*_db` sqlite mirrors).
Debian documents live in [debian::control] (RFC-822 paragraphs),
[debian::packages] (`Packages` indexes), and [debian::release] (`Release`
files).

Mutating operations run inside a [transaction::Transaction]: the live
metadata directory is snapshotted to a timestamped backup prefix, mutations
are staged locally and uploaded with the top-level index last, and the
operation either commits (deleting the backup) or restores the prior state
byte for byte (retaining the backup for inspection).

The engines tie it together: [rpm::engine::RpmRepository] and
[debian::engine::DebRepository] implement add, remove, and validate with
shared dedup semantics. Content-addressed naming, checksum closure, and
package closure are enforced by [rpm::validate] and [debian::validate];
quick validation gates every commit.
*/

pub mod config;
pub mod debian;
pub mod error;
pub mod inspect;
pub mod io;
pub mod ops;
pub mod rpm;
pub mod storage;
pub mod tools;
pub mod transaction;
pub mod validation;

pub use crate::error::{RepoPublishError, Result};
