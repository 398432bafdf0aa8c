// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use repo_publish::config::Family;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelled");
            std::process::exit(130);
        }
    });

    std::process::exit(
        match repo_publish_tool::cli::run_cli(Family::Debian).await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("error: {}", err);
                1
            }
        },
    );
}
