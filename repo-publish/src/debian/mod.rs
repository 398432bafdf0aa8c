// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository support.

A Debian repository stores packages under a `pool/` layout and per
(distribution, component, architecture) `Packages` indexes under
`dists/<codename>/`. The `Release` file at the distribution root carries
digests of every index variant. See
<https://wiki.debian.org/DebianRepository/Format>.
*/

pub mod control;
pub mod engine;
pub mod packages;
pub mod release;
pub mod validate;
