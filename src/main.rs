use clap::{Parser, Subcommand};
use inkpress::builder::{BuildOptions, Builder, FeedOptions, PartialSource};
use inkpress::{config, output, serve};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inkpress")]
#[command(about = "Incremental static site generator for Markdown trees")]
#[command(long_about = "\
Incremental static site generator for Markdown trees

The input directory is mirrored into the output directory. Markdown documents
become HTML pages wrapped in a template; every other file is copied as is.
A build cache in the output directory lets later builds skip files whose
modification time has not changed.

Input structure:

  site/
  ├── config.toml          # Site config (optional, never published)
  ├── header.md            # Prepended to every page (optional)
  ├── footer.md            # Appended to every page (optional)
  ├── index.md             # → index.html
  ├── posts/
  │   └── hello.md         # → posts/hello.html
  └── img/
      └── logo.png         # → img/logo.png

Run 'inkpress gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Flags for the `build` command. Each one overrides `config.toml`.
#[derive(clap::Args)]
struct BuildArgs {
    /// Input directory
    input: PathBuf,

    /// Output directory
    output: PathBuf,

    /// Gzipped page size (bytes) above which a page is flagged; 0 disables
    #[arg(long, value_name = "BYTES")]
    size_threshold: Option<usize>,

    /// Ignore the build cache and rebuild everything
    #[arg(long)]
    full: bool,

    /// Site URL; enables feed.xml
    #[arg(long, value_name = "URL", value_parser = parse_feed_url)]
    feed_url: Option<String>,

    /// Maximum feed items; 0 keeps all
    #[arg(long, value_name = "N")]
    feed_max_items: Option<usize>,

    /// Keep outputs whose input was deleted
    #[arg(long)]
    keep_orphans: bool,

    /// Built-in template name or path to an .html template
    #[arg(long, value_name = "SELECTOR")]
    template: Option<String>,

    /// Header partial
    #[arg(long, value_name = "FILE", conflicts_with = "no_header")]
    header: Option<PathBuf>,

    /// Footer partial
    #[arg(long, value_name = "FILE", conflicts_with = "no_footer")]
    footer: Option<PathBuf>,

    /// Do not prepend a header
    #[arg(long)]
    no_header: bool,

    /// Do not append a footer
    #[arg(long)]
    no_footer: bool,

    /// Log per-file decisions to stderr
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Directory to serve, usually a build output
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Port to listen on [default: 8080, or serve.port from --site]
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind [default: 127.0.0.1, or serve.host from --site]
    #[arg(long)]
    host: Option<String>,

    /// Input directory whose config.toml supplies [serve] settings
    #[arg(long, value_name = "DIR")]
    site: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Build INPUT into OUTPUT, reusing the build cache when possible
    Build(BuildArgs),
    /// Serve a built site locally
    Serve(ServeArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Command::Build(args) if args.verbose);
    init_tracing(verbose);

    let result = match cli.command {
        Command::Build(args) => run_build(args),
        Command::Serve(args) => run_serve(args),
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "inkpress=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_build(args: BuildArgs) -> Result<(), Box<dyn std::error::Error>> {
    let site_config = config::load_config(&args.input)?;
    let options = build_options(&args, &site_config);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_build_event(&event);
        }
    });

    // The builder owns the sender; dropping it ends the printer loop.
    let result = Builder::new(&args.input, &args.output, options)
        .with_events(tx)
        .build();
    if printer.join().is_err() {
        tracing::warn!("progress printer panicked");
    }
    let report = result?;

    output::print_advisories(&report.advisories);
    output::print_summary(&report);
    Ok(())
}

/// Config values with command-line overrides applied.
fn build_options(args: &BuildArgs, site_config: &config::SiteConfig) -> BuildOptions {
    let mut options = BuildOptions::from_config(site_config, &args.input);

    options.force_full |= args.full;
    options.keep_orphans |= args.keep_orphans;
    if let Some(threshold) = args.size_threshold {
        options.size_threshold = threshold;
    }
    if let Some(template) = &args.template {
        options.template = template.clone();
    }
    options.header = partial_override(options.header, args.header.as_deref(), args.no_header);
    options.footer = partial_override(options.footer, args.footer.as_deref(), args.no_footer);

    if let Some(url) = args.feed_url.as_deref().map(str::trim) {
        options.feed = (!url.is_empty()).then(|| FeedOptions {
            base_url: url.to_string(),
            max_items: site_config.feed.max_items,
        });
    }
    if let (Some(feed), Some(max_items)) = (options.feed.as_mut(), args.feed_max_items) {
        feed.max_items = max_items;
    }
    options
}

fn parse_feed_url(url: &str) -> Result<String, String> {
    config::validate_feed_url(url)
        .map(|()| url.trim().to_string())
        .map_err(|_| "must start with http:// or https://".to_string())
}

fn partial_override(configured: PartialSource, path: Option<&Path>, disabled: bool) -> PartialSource {
    match (disabled, path) {
        (true, _) => PartialSource::Disabled,
        (false, Some(path)) => PartialSource::Path(path.to_path_buf()),
        (false, None) => configured,
    }
}

fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let serve_config = match &args.site {
        Some(site) => config::load_config(site)?.serve,
        None => config::ServeConfig::default(),
    };
    let host = args.host.unwrap_or(serve_config.host);
    let port = args.port.unwrap_or(serve_config.port);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let listener = serve::bind(&host, port).await?;
        let addr = listener.local_addr()?;
        println!("==> Serving {} at http://{addr}", args.dir.display());
        println!("    Press Ctrl-C to stop");
        serve::run(listener, &args.dir).await
    })?;
    Ok(())
}
