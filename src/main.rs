//! skelgen's entry point.
//! Parses arguments, loads the template document with its imports and runs
//! the generator into the output directory.

use std::path::{Path, PathBuf};

use skelgen::{
    cli::{get_args, Args},
    constants::DEFAULT_OUTPUT_DIR,
    error::{default_error_handler, Error, Result},
    generator::Generator,
    loader::{load_document, DocumentSource},
    logger::{init_logger, LogSink, NullSink, WriterSink},
    project::ProjectInfo,
};

fn main() {
    let args = get_args();
    init_logger(args.verbose);

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

/// Ensures the output directory is safe to write to.
///
/// # Errors
/// * Returns `Error::OutputDirectoryExistsError` if directory exists and force is false
pub fn get_output_dir<P: AsRef<Path>>(output_dir: P, force: bool) -> Result<PathBuf> {
    let output_dir = output_dir.as_ref();
    if output_dir.exists() && !force {
        return Err(Error::OutputDirectoryExistsError {
            output_dir: output_dir.display().to_string(),
        });
    }
    Ok(output_dir.to_path_buf())
}

/// # Flow
/// 1. Resolves the template source and output directory
/// 2. Loads the document and its imports
/// 3. Runs envs, vars, remote variables, hooks and templates in order
fn run(args: Args) -> Result<()> {
    let source = DocumentSource::from_string(&args.template);
    let source_root = source.base_dir();

    let output_dir = args.output_dir.clone().unwrap_or_else(|| match &source_root {
        Some(dir) => dir.join(DEFAULT_OUTPUT_DIR),
        None => PathBuf::from(DEFAULT_OUTPUT_DIR),
    });
    let output_dir = get_output_dir(output_dir, args.force)?;

    let project = match &args.project_info {
        Some(json) => ProjectInfo::from_json(json)?,
        None => ProjectInfo::default(),
    };

    log::debug!("Loading template document from {source}");
    let document = load_document(&source)?;

    let mut generator = Generator::new(document, project, &output_dir);
    if let Some(root) = source_root {
        generator = generator.source_root(root);
    }

    let mut sink: Box<dyn LogSink> =
        if args.quiet { Box::new(NullSink) } else { Box::new(WriterSink::new(std::io::stdout())) };
    generator.run(sink.as_mut())?;

    println!("Template generation completed successfully in {}.", output_dir.display());
    Ok(())
}
