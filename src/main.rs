use anyhow::Result;
use clap::Parser;
use hpcbuild::commands;
use hpcbuild::config::{Config, default_jobs};
use hpcbuild::error::{InstallError, exit_code};
use hpcbuild::install::{DepOverride, InstallRequest};
use hpcbuild::package::{BuildMode, DEFAULT_LINK_NAME};
use hpcbuild::runtime::RealRuntime;
use std::path::PathBuf;

/// hpcbuild - build and install HPC packages from source
///
/// Sources are cached under the source root; each build lands in
/// <build-root>/<package>/<version>[-<variant>] and the package's `default`
/// link is switched to it once the install has been verified.
///
/// Examples:
///   hpcbuild install openmpi 5.0.8 lp64
///   hpcbuild install dirac master ilp64 --dep openmpi=5.0.8
///   hpcbuild switch openmpi 4.1.6
#[derive(Parser, Debug)]
#[command(author, version = env!("HPCBUILD_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Source cache directory (default ~/hpc/sources)
    #[arg(
        long,
        env = "HPCBUILD_SOURCE_ROOT",
        value_name = "PATH",
        global = true
    )]
    source_root: Option<PathBuf>,

    /// Build and install directory (default ~/hpc/builds)
    #[arg(long, env = "HPCBUILD_BUILD_ROOT", value_name = "PATH", global = true)]
    build_root: Option<PathBuf>,

    /// Extra package descriptors (JSON); overrides built-ins by name
    #[arg(
        long = "packages",
        env = "HPCBUILD_PACKAGES",
        value_name = "FILE",
        global = true
    )]
    packages_file: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch, build and install a package version
    Install(InstallArgs),

    /// Point a package's link at an installed version
    Switch(SwitchArgs),

    /// List installed versions
    List(ListArgs),

    /// Print the install path of a package
    Locate(LocateArgs),

    /// List known packages and their variants
    Packages,
}

#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Package name (see `hpcbuild packages`)
    package: String,

    /// Release version (5.0.8) or development ref (main); defaults to the
    /// package's development branch
    #[arg(value_name = "VERSION")]
    version_token: Option<String>,

    /// Variant such as lp64 or ilp64
    variant: Option<String>,

    /// Version, as an alternative to the positional argument
    #[arg(long = "version", value_name = "VER")]
    version_opt: Option<String>,

    /// Name of the link switched to the new install
    #[arg(long, value_name = "NAME", default_value = DEFAULT_LINK_NAME)]
    link_name: String,

    /// Treat the version as a development ref even if it starts with a digit
    #[arg(long)]
    dev: bool,

    /// Build without MPI
    #[arg(long)]
    serial: bool,

    /// Build against a specific installed dependency version
    #[arg(long = "dep", value_name = "NAME=VERSION[:VARIANT]")]
    deps: Vec<DepOverride>,

    /// Parallel build jobs (default: number of CPUs)
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Keep the expanded source tree after a successful build
    #[arg(long)]
    keep_source: bool,
}

impl InstallArgs {
    fn into_request(self) -> Result<InstallRequest, InstallError> {
        // With --version the first positional after the package is the variant
        let (version, variant) = match (self.version_opt, self.version_token, self.variant) {
            (Some(_), Some(_), Some(_)) => {
                return Err(InstallError::validation(
                    "version given both positionally and with --version",
                ));
            }
            (Some(version), variant, None) => (Some(version), variant),
            (None, version, variant) => (version, variant),
            (Some(version), None, variant) => (Some(version), variant),
        };

        Ok(InstallRequest {
            package: self.package,
            version,
            variant,
            link_name: self.link_name,
            force_dev: self.dev,
            mode: if self.serial {
                BuildMode::Serial
            } else {
                BuildMode::Parallel
            },
            deps: self.deps,
            jobs: self.jobs.unwrap_or_else(default_jobs),
            keep_source: self.keep_source,
        })
    }
}

#[derive(clap::Args, Debug)]
struct SwitchArgs {
    package: String,
    version: String,
    variant: Option<String>,

    #[arg(long, value_name = "NAME", default_value = DEFAULT_LINK_NAME)]
    link_name: String,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    package: Option<String>,
}

#[derive(clap::Args, Debug)]
struct LocateArgs {
    package: String,
    version: Option<String>,
    variant: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let runtime = RealRuntime;
    let config = Config::load(&runtime, cli.source_root, cli.build_root, cli.packages_file)?;

    match cli.command {
        Commands::Install(args) => {
            commands::install(runtime, config, args.into_request()?).await?
        }
        Commands::Switch(args) => commands::switch(
            &runtime,
            &config,
            &args.package,
            &args.version,
            args.variant.as_deref(),
            &args.link_name,
        )?,
        Commands::List(args) => commands::list(&runtime, &config, args.package.as_deref())?,
        Commands::Locate(args) => commands::locate(
            &runtime,
            &config,
            &args.package,
            args.version.as_deref(),
            args.variant.as_deref(),
        )?,
        Commands::Packages => commands::packages(&config.packages),
    }
    Ok(())
}
