//! Runs a loaded template document through every phase, in order:
//! envs, vars, remote variables, pre hooks, templates, post hooks.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use minijinja::Value;

use crate::context::{EvalContext, EvalData, Phase};
use crate::document::TemplateDocument;
use crate::error::Result;
use crate::field_map::{FieldValue, OrderedFieldMap};
use crate::hooks::{CommandExecutor, ShellExecutor};
use crate::logger::LogSink;
use crate::processor::TemplateProcessor;
use crate::project::ProjectInfo;
use crate::remote::RemoteVarResolver;
use crate::renderer::Evaluator;

pub struct Generator {
    evaluator: Evaluator,
    context: EvalContext,
    work_dir: PathBuf,
    source_root: PathBuf,
    executor: Box<dyn CommandExecutor>,
}

fn field_map(document: &TemplateDocument, phase: Phase) -> Option<&OrderedFieldMap> {
    match phase {
        Phase::Envs => document.envs.as_ref(),
        Phase::Vars => document.vars.as_ref(),
        _ => None,
    }
}

fn field_map_mut(document: &mut TemplateDocument, phase: Phase) -> Option<&mut OrderedFieldMap> {
    match phase {
        Phase::Envs => document.envs.as_mut(),
        Phase::Vars => document.vars.as_mut(),
        _ => None,
    }
}

impl Generator {
    /// Output goes under `work_dir`; relative copy sources and upload files
    /// resolve against the current directory until [`Generator::source_root`]
    /// says otherwise.
    pub fn new<P: Into<PathBuf>>(
        document: TemplateDocument,
        project: ProjectInfo,
        work_dir: P,
    ) -> Self {
        let executor = Box::new(ShellExecutor::new(document.shell.current()));
        Self {
            evaluator: Evaluator::new(),
            context: EvalContext::new(document, project),
            work_dir: work_dir.into(),
            source_root: PathBuf::from("."),
            executor,
        }
    }

    pub fn source_root<P: Into<PathBuf>>(mut self, source_root: P) -> Self {
        self.source_root = source_root.into();
        self
    }

    pub fn executor(mut self, executor: Box<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn context(&self) -> &EvalContext {
        &self.context
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Runs every phase. The first error aborts the run; files written
    /// before it stay in place.
    pub fn run(&self, sink: &mut dyn LogSink) -> Result<()> {
        let mut data = EvalData::new(&self.context);

        debug!("Resolving envs...");
        self.resolve_fields(Phase::Envs, &data, sink)?;
        debug!("Resolving vars...");
        self.resolve_fields(Phase::Vars, &data, sink)?;
        debug!("Resolving remote variables...");
        self.resolve_remote_vars(&data, sink)?;

        fs::create_dir_all(&self.work_dir)?;

        self.run_hooks(Phase::ExecutePre, &data, sink)?;
        debug!("Emitting templates...");
        self.emit_templates(&mut data, sink)?;
        self.run_hooks(Phase::ExecutePost, &data, sink)?;

        info!("Generated into {}", self.work_dir.display());
        Ok(())
    }

    /// Evaluates each declared value in order and stores the result back, so
    /// later entries see earlier results.
    fn resolve_fields(&self, phase: Phase, data: &EvalData, sink: &mut dyn LogSink) -> Result<()> {
        let keys = field_map(&self.context.document(), phase).map(OrderedFieldMap::keys);
        for key in keys.unwrap_or_default() {
            let declared: Option<FieldValue> =
                field_map(&self.context.document(), phase).and_then(|map| map.get(&key)).cloned();
            let Some(declared) = declared else {
                continue;
            };

            self.context.enter(phase, &key, Value::from(&declared));
            let resolved = self.evaluator.evaluate_field(&declared, data, &self.context)?;
            sink.log(phase.as_str(), &format!("${{{key}}}: {resolved}"));

            if let Some(map) = field_map_mut(&mut self.context.document(), phase) {
                map.set(key, resolved);
            }
        }
        Ok(())
    }

    /// Resolves remote variables sequentially and stores each response on its
    /// declaration.
    fn resolve_remote_vars(&self, data: &EvalData, sink: &mut dyn LogSink) -> Result<()> {
        let block = Phase::RemoteVars.as_str();
        let names = self.context.document().remote_vars.as_ref().map(|vars| vars.keys());
        let resolver = RemoteVarResolver::new(&self.evaluator, &self.source_root);

        for name in names.unwrap_or_default() {
            let spec = self.context.document().remote_var(&name).cloned();
            let Some(spec) = spec else {
                sink.log(block, &format!("${{{name}}}: empty declaration, skipped"));
                continue;
            };

            self.context.enter(Phase::RemoteVars, &name, Value::from_serialize(&spec));
            let response = resolver.resolve(&name, &spec, data, &self.context)?;
            match serde_json::to_string(&response.data) {
                Ok(json) => sink.log(block, &format!("${{{name}}}: result data => {json}")),
                Err(_) => sink.log(block, &format!("${{{name}}}: result data => {}", response.data)),
            }

            let mut document = self.context.document();
            if let Some(spec) = document.remote_vars.as_mut().and_then(|vars| vars.get_mut(&name)) {
                spec.response = Some(response);
            }
        }
        Ok(())
    }

    /// Scalar envs, handed to hook commands.
    fn hook_envs(&self) -> Vec<(String, String)> {
        self.context
            .document()
            .envs
            .as_ref()
            .map(|envs| {
                envs.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn run_hooks(&self, phase: Phase, data: &EvalData, sink: &mut dyn LogSink) -> Result<()> {
        let commands = {
            let document = self.context.document();
            match phase {
                Phase::ExecutePre => document.pre_commands().to_vec(),
                _ => document.post_commands().to_vec(),
            }
        };
        if commands.is_empty() {
            return Ok(());
        }

        debug!("Running {phase} commands...");
        let envs = self.hook_envs();
        for command in commands {
            self.context.enter(phase, phase.as_str(), Value::from(command.as_str()));
            let (command, _) = self.evaluator.evaluate(&command, data, &self.context)?;
            let command = command.trim();
            if command.is_empty() {
                continue;
            }
            self.executor.run(phase.as_str(), command, &envs, &self.work_dir, sink)?;
        }
        Ok(())
    }

    fn emit_templates(&self, data: &mut EvalData, sink: &mut dyn LogSink) -> Result<()> {
        let templates: Vec<_> = self
            .context
            .document()
            .templates
            .iter()
            .map(|(path, spec)| (path.clone(), spec.clone()))
            .collect();
        let processor = TemplateProcessor::new(&self.evaluator, &self.work_dir, &self.source_root);
        for (path_template, spec) in &templates {
            processor.process(path_template, spec, data, &self.context, sink)?;
        }
        Ok(())
    }
}
