use std::io::{self, Read};
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use prompt_translator_rust::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "prompt-translator-rust",
    version,
    about = "Reconcile comma-separated prompt tags and translate them in batches"
)]
struct Cli {
    /// Also annotate tags that still have no translation (second batch)
    #[arg(short = 't', long = "translate-missing")]
    translate_missing: bool,

    /// Append the reconciled tags to this library category
    #[arg(short = 's', long = "save-to")]
    save_to: Option<String>,

    /// Tag library file (overrides settings [library].path)
    #[arg(long = "library")]
    library: Option<String>,

    /// Show the tag library and exit
    #[arg(long = "show-library")]
    show_library: bool,

    /// Merge a library file into the current library and exit
    #[arg(long = "import-library")]
    import_library: Option<String>,

    /// Create a timestamped library from the bundled template in this directory and exit
    #[arg(long = "new-library")]
    new_library: Option<String>,

    /// Output format
    #[arg(short = 'o', long = "format", value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Run the HTTP server (address defaults to settings [server].addr)
    #[arg(long = "server", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Settings profile (development or production)
    #[arg(short = 'p', long = "profile")]
    profile: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    prompt_translator_rust::logging::init(cli.verbose)?;

    if let Some(addr) = cli.server {
        let settings_path = cli.read_settings.as_deref().map(Path::new);
        let mut settings = prompt_translator_rust::settings::load_settings(settings_path)?;
        if let Some(profile) = cli.profile.as_deref() {
            settings.profile = prompt_translator_rust::settings::Profile::parse(profile)?;
        }
        if let Some(library) = cli.library {
            settings.library_path = library.into();
        }
        let addr = if addr.trim().is_empty() {
            settings.server_addr.clone()
        } else {
            addr
        };
        return prompt_translator_rust::server::run_server(settings, addr).await;
    }

    let needs_input =
        !(cli.show_library || cli.import_library.is_some() || cli.new_library.is_some());
    let input = if needs_input {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Some(buffer)
    } else {
        None
    };

    let output = prompt_translator_rust::run(
        prompt_translator_rust::Config {
            settings_path: cli.read_settings,
            profile: cli.profile,
            library_path: cli.library,
            format: cli.format,
            translate_missing: cli.translate_missing,
            save_to: cli.save_to,
            show_library: cli.show_library,
            import_library: cli.import_library,
            new_library: cli.new_library,
        },
        input,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
