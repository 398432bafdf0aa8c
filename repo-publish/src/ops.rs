// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Operation reports shared by both repository families. */

/// Result of an `add` operation.
#[derive(Clone, Debug, Default)]
pub struct AddOutcome {
    /// Filenames uploaded (new and updated packages).
    pub published: Vec<String>,
    /// Subset of `published` that replaced an existing entry.
    pub updated: Vec<String>,
    /// Filenames skipped because an identical package already exists.
    pub duplicates: Vec<String>,
}

/// Result of a `remove` operation.
#[derive(Clone, Debug, Default)]
pub struct RemoveOutcome {
    /// Package filenames removed from metadata and storage.
    pub removed: Vec<String>,
    /// Inputs that matched nothing in the repository.
    pub missing: Vec<String>,
}
