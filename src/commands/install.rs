use anyhow::Result;

use crate::config::Config;
use crate::fetch::NetworkFetcher;
use crate::http::HttpClient;
use crate::install::{InstallRequest, Installer};
use crate::runner::ShellRunner;
use crate::runtime::Runtime;

/// Build and install one package, then switch its link.
#[tracing::instrument(skip(runtime, config))]
pub async fn install<R: Runtime + Clone>(
    runtime: R,
    config: Config,
    request: InstallRequest,
) -> Result<()> {
    let fetcher = NetworkFetcher::new(runtime.clone(), HttpClient::with_default_client()?);
    let installer = Installer::new(
        runtime,
        fetcher,
        ShellRunner,
        config.layout,
        config.packages,
    );

    let report = installer.install(&request).await?;
    println!(
        "installed {} {} to {}",
        report.context.package,
        report.context.version,
        report.install_dir().display()
    );
    Ok(())
}
