// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Command line front end for the repository publishing engines.

Two binaries share this module: `rpmrepo` for RPM/YUM repositories and
`debrepo` for Debian/APT repositories. Both expose the same flag shape;
[cli::run_cli] is parameterized by the repository family.
*/

pub mod cli;
