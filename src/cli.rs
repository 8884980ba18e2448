//! Command-line interface implementation for skelgen.
//! Provides argument parsing and help text formatting using clap.

use clap::{error::ErrorKind, CommandFactory, Parser};
use std::path::PathBuf;

/// Command-line arguments structure for skelgen.
#[derive(Parser, Debug)]
#[command(author, version, about = "skelgen: declarative project skeleton generator", long_about = None)]
pub struct Args {
    /// Path or http(s) URL of the template document
    #[arg(value_name = "TEMPLATE")]
    pub template: String,

    /// Directory the files are generated into.
    /// Defaults to `out` next to a local template, or `./out` for a URL
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Project metadata as JSON, bound as `Project`
    #[arg(short, long, value_name = "JSON")]
    pub project_info: Option<String>,

    /// Write into an existing output directory
    #[arg(short, long)]
    pub force: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not print the per-step generation log
    #[arg(short, long)]
    pub quiet: bool,
}

/// Parses command line arguments and returns the Args structure.
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.kind() == ErrorKind::MissingRequiredArgument {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
