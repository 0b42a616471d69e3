//! Supply command - stage one application

use crate::catalog::ManifestCatalog;
use crate::cli::args::SupplyArgs;
use crate::command::SystemRunner;
use crate::config::BuildConfig;
use crate::error::NodepackResult;
use crate::install::CatalogInstaller;
use crate::stager::BuildLayout;
use crate::supply::Supplier;
use crate::ui::{BuildLog, UiContext};
use tracing::debug;

/// Execute the supply command
pub async fn execute(args: SupplyArgs, config: &BuildConfig) -> NodepackResult<()> {
    let layout = BuildLayout::new(args.build_dir, args.cache_dir, args.deps_dir, args.deps_idx);
    debug!("Build layout: {:?}", layout);

    let log = BuildLog::stdout(UiContext::detect().with_debug(config.debug));
    let catalog = ManifestCatalog::load(&args.manifest, config.stack.as_deref()).await?;
    let installer = CatalogInstaller::new(&layout.cache_dir);
    let runner = SystemRunner::new();

    let supplier = Supplier {
        layout: &layout,
        config,
        catalog: &catalog,
        installer: &installer,
        runner: &runner,
        log: &log,
    };
    let report = supplier.run().await?;

    debug!("Cache signature: {}", report.signature);
    Ok(())
}
