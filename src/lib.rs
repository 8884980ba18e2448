//! skelgen generates project skeletons from a declarative template document.
//! A document declares envs, vars and remote variables, the files to emit
//! (optionally multiplied over range sources) and commands to run around
//! generation; every value is a MiniJinja expression.

/// Command-line interface module for the skelgen application
pub mod cli;

pub mod constants;

/// Evaluation context bound as `this` and the per-evaluation data map
pub mod context;

/// Template document model and import merge rules
pub mod document;

/// Error types and handling for the skelgen application
pub mod error;

/// Ordered `key -> string | [string]` maps
pub mod field_map;

/// Domain functions and the helper library registered on the evaluator
pub mod functions;

/// Phase orchestration of a generation run
pub mod generator;

/// Pre and post generation command execution
pub mod hooks;

/// Loads documents from disk or HTTP and resolves imports
pub mod loader;

pub mod logger;

/// File emission and raw byte splicing
pub mod processor;

/// Project metadata bound as `Project`
pub mod project;

/// Cartesian-product iteration over range sources
pub mod range;

/// Remote variable resolution over HTTP
pub mod remote;

/// MiniJinja-based expression evaluation
pub mod renderer;
