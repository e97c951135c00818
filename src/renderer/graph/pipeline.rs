//! Pipeline executor
//!
//! A [`Pipeline`] is an ordered, acyclic list of passes for one effect.
//! Dependencies are encoded as ordering: pass `k` may only read the
//! pipeline input, the scene depth, or outputs of passes `0..k`. Fan-in and
//! fan-out per effect are small and static, so no general DAG scheduler is
//! involved; execution is a linear walk on a single command stream.
//!
//! Pipelines are built by a [`PipelineBuilder`], which acquires targets from
//! the pool and validates every pass against its program declaration. A
//! pipeline is never patched: resizes and tier changes rebuild it wholesale.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::params::{ParamSlot, ParamValue};
use super::pass::{FrameIo, InputSource, Pass, PassDesc, PassIndex, PassOutput};
use super::program::ProgramRegistry;
use super::target_pool::{FilterMode, OwnerId, RenderTarget, RenderTargetPool, TargetFormat};
use crate::errors::{HaloError, Result};
use crate::renderer::backend::RenderBackend;
use crate::renderer::quality::TierParams;

/// Everything a pipeline needs while it is being built.
pub struct BuildContext<'a> {
    pub pool: &'a mut RenderTargetPool,
    pub backend: &'a mut dyn RenderBackend,
    pub registry: &'a mut ProgramRegistry,
    pub tier: &'a TierParams,
    pub owner: OwnerId,
}

impl BuildContext<'_> {
    #[inline]
    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        self.pool.viewport()
    }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

/// Validating pipeline builder.
///
/// Targets acquired through the builder are released again if the builder
/// is dropped without a successful [`build`](Self::build).
pub struct PipelineBuilder<'c, 'a> {
    ctx: &'c mut BuildContext<'a>,
    label: String,
    passes: Vec<Pass>,
    targets: Vec<RenderTarget>,
    slots: FxHashMap<String, ParamSlot>,
    uses_depth: bool,
    built: bool,
}

impl<'c, 'a> PipelineBuilder<'c, 'a> {
    #[must_use]
    pub fn new(label: impl Into<String>, ctx: &'c mut BuildContext<'a>) -> Self {
        Self {
            ctx,
            label: label.into(),
            passes: Vec::new(),
            targets: Vec::new(),
            slots: FxHashMap::default(),
            uses_depth: false,
            built: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn tier(&self) -> &TierParams {
        self.ctx.tier
    }

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        self.ctx.pool.viewport()
    }

    /// Acquires a target sized as a fraction of the viewport.
    pub fn target(
        &mut self,
        label: &str,
        width_fraction: f32,
        height_fraction: f32,
        format: TargetFormat,
    ) -> Result<RenderTarget> {
        let target = self.ctx.pool.acquire(
            &mut *self.ctx.backend,
            self.ctx.owner,
            width_fraction,
            height_fraction,
            format,
            FilterMode::Linear,
            label,
        )?;
        self.targets.push(target);
        Ok(target)
    }

    /// Acquires a target with an explicit pixel size.
    pub fn target_sized(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: TargetFormat,
    ) -> Result<RenderTarget> {
        let target = self.ctx.pool.acquire_sized(
            &mut *self.ctx.backend,
            self.ctx.owner,
            width,
            height,
            format,
            FilterMode::Linear,
            label,
        )?;
        self.targets.push(target);
        Ok(target)
    }

    fn fail(&self, reason: impl Into<String>) -> HaloError {
        HaloError::misconfigured(&self.label, reason)
    }

    /// Validates and appends a pass.
    pub fn add_pass(&mut self, desc: PassDesc) -> Result<PassIndex> {
        let index = self.passes.len();
        let PassDesc {
            label,
            program,
            params: bound_params,
            inputs: bound_inputs,
            output,
            blend,
        } = desc;

        if self
            .passes
            .last()
            .is_some_and(|p| p.output == PassOutput::Final)
        {
            return Err(self.fail(format!(
                "pass '{label}' added after the final pass"
            )));
        }
        if self.passes.iter().any(|p| p.label == label) {
            return Err(self.fail(format!("duplicate pass label '{label}'")));
        }

        // ── Parameters ──
        let mut params = program.default_values();
        let mut bound = vec![false; params.len()];
        for (name, value) in bound_params {
            let Some(i) = program.param_index(&name) else {
                return Err(self.fail(format!(
                    "pass '{label}' binds parameter '{name}' which program '{}' does not declare",
                    program.name()
                )));
            };
            let expected = program.params()[i].kind;
            if value.kind() != expected {
                return Err(self.fail(format!(
                    "pass '{label}' binds '{name}' as {:?}, program declares {expected:?}",
                    value.kind()
                )));
            }
            if std::mem::replace(&mut bound[i], true) {
                return Err(self.fail(format!("pass '{label}' binds '{name}' twice")));
            }
            params[i] = value;
        }

        // ── Inputs ──
        let mut inputs: SmallVec<[Option<InputSource>; 4]> =
            SmallVec::from_elem(None, program.inputs().len());
        for (name, source) in bound_inputs {
            let Some(i) = program.input_index(&name) else {
                return Err(self.fail(format!(
                    "pass '{label}' binds input '{name}' which program '{}' does not declare",
                    program.name()
                )));
            };
            if inputs[i].replace(source).is_some() {
                return Err(self.fail(format!("pass '{label}' binds input '{name}' twice")));
            }
        }

        let output = output.ok_or_else(|| self.fail(format!("pass '{label}' has no output")))?;

        let mut resolved: SmallVec<[InputSource; 4]> = SmallVec::new();
        for (i, source) in inputs.into_iter().enumerate() {
            let Some(source) = source else {
                return Err(self.fail(format!(
                    "pass '{label}' leaves input '{}' unbound",
                    program.inputs()[i]
                )));
            };
            match source {
                InputSource::Pass(PassIndex(producer)) if producer >= index => {
                    return Err(self.fail(format!(
                        "pass '{label}' reads pass #{producer}, which does not run before it"
                    )));
                }
                InputSource::Pass(PassIndex(producer)) => {
                    if let (PassOutput::Target(read), PassOutput::Target(written)) =
                        (self.passes[producer].output, output)
                        && read.id() == written.id()
                    {
                        return Err(self.fail(format!(
                            "pass '{label}' reads and writes the same target"
                        )));
                    }
                }
                InputSource::Depth => self.uses_depth = true,
                InputSource::PipelineInput => {}
            }
            resolved.push(source);
        }

        // ── Output ──
        if let PassOutput::Target(target) = output {
            if !self.targets.iter().any(|t| t.id() == target.id()) {
                return Err(self.fail(format!(
                    "pass '{label}' writes a target not acquired by this pipeline"
                )));
            }
            if self
                .passes
                .iter()
                .any(|p| p.output == PassOutput::Target(target))
            {
                return Err(self.fail(format!(
                    "pass '{label}' writes a target already produced by an earlier pass"
                )));
            }
        }

        let param_names = program.params().iter().map(|p| p.name).collect();
        for (i, decl) in program.params().iter().enumerate() {
            self.slots.insert(
                format!("{label}.{}", decl.name),
                ParamSlot {
                    pass: index as u16,
                    index: i as u16,
                    kind: decl.kind,
                },
            );
        }

        let program_id = self.ctx.registry.register(program)?;
        if let Some(program) = self.ctx.registry.get(program_id) {
            self.ctx.backend.prepare_program(program_id, program)?;
        }

        self.passes.push(Pass {
            label,
            program: program_id,
            param_names,
            params,
            inputs: resolved,
            output,
            blend,
        });
        Ok(PassIndex(index))
    }

    /// Finishes the pipeline. The last pass must write the final output.
    pub fn build(mut self) -> Result<Pipeline> {
        match self.passes.last() {
            None => return Err(self.fail("pipeline has no passes")),
            Some(last) if last.output != PassOutput::Final => {
                return Err(self.fail(format!(
                    "last pass '{}' does not write the final output",
                    last.label
                )));
            }
            Some(_) => {}
        }

        self.built = true;
        let pipeline = Pipeline {
            label: std::mem::take(&mut self.label),
            owner: self.ctx.owner,
            epoch: self.ctx.pool.epoch(),
            passes: std::mem::take(&mut self.passes),
            targets: std::mem::take(&mut self.targets),
            slots: std::mem::take(&mut self.slots),
            uses_depth: self.uses_depth,
        };

        log::debug!(
            "Pipeline '{}' built: {} passes, {} targets (epoch {})",
            pipeline.label,
            pipeline.passes.len(),
            pipeline.targets.len(),
            pipeline.epoch
        );
        Ok(pipeline)
    }
}

impl Drop for PipelineBuilder<'_, '_> {
    fn drop(&mut self) {
        if !self.built {
            for target in self.targets.drain(..) {
                self.ctx.pool.release(&target);
            }
        }
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

/// An ordered sequence of passes plus the targets they own.
#[derive(Debug)]
pub struct Pipeline {
    label: String,
    owner: OwnerId,
    epoch: u32,
    passes: Vec<Pass>,
    targets: Vec<RenderTarget>,
    slots: FxHashMap<String, ParamSlot>,
    uses_depth: bool,
}

impl Pipeline {
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Pool epoch the pipeline's targets were sized for.
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    #[must_use]
    pub fn pass(&self, label: &str) -> Option<&Pass> {
        self.passes.iter().find(|p| p.label == label)
    }

    #[inline]
    #[must_use]
    pub fn targets(&self) -> &[RenderTarget] {
        &self.targets
    }

    /// Dimensions of the owned targets in acquisition order.
    #[must_use]
    pub fn target_dimensions(&self) -> Vec<(u32, u32)> {
        self.targets.iter().map(RenderTarget::size).collect()
    }

    #[inline]
    #[must_use]
    pub fn uses_depth(&self) -> bool {
        self.uses_depth
    }

    /// Looks up the slot of `pass.param`. Resolve slots once after building;
    /// per-frame updates go through [`set`](Self::set).
    pub fn slot(&self, pass: &str, param: &str) -> Result<ParamSlot> {
        self.slots
            .get(&format!("{pass}.{param}"))
            .copied()
            .ok_or_else(|| {
                HaloError::misconfigured(
                    &self.label,
                    format!("no parameter '{param}' on pass '{pass}'"),
                )
            })
    }

    /// Writes a parameter value. Writes of the wrong kind are ignored.
    pub fn set(&mut self, slot: ParamSlot, value: impl Into<ParamValue>) {
        let value = value.into();
        debug_assert_eq!(value.kind(), slot.kind, "parameter kind mismatch");
        if value.kind() != slot.kind {
            return;
        }
        if let Some(pass) = self.passes.get_mut(slot.pass as usize)
            && let Some(param) = pass.params.get_mut(slot.index as usize)
        {
            *param = value;
        }
    }

    #[must_use]
    pub fn get(&self, slot: ParamSlot) -> Option<ParamValue> {
        self.passes
            .get(slot.pass as usize)
            .and_then(|p| p.params.get(slot.index as usize))
            .copied()
    }

    /// Runs every pass in order.
    ///
    /// Fails with [`HaloError::StaleTarget`] if the pool was resized since the
    /// pipeline was built; owners rebuild before executing, so this is a
    /// backstop rather than a recoverable condition.
    pub fn execute(
        &self,
        backend: &mut dyn RenderBackend,
        pool: &RenderTargetPool,
        io: &FrameIo,
    ) -> Result<()> {
        if self.epoch != pool.epoch() {
            return Err(HaloError::StaleTarget(self.label.clone()));
        }

        for i in 0..self.passes.len() {
            let (earlier, rest) = self.passes.split_at(i);
            rest[0].execute(backend, pool, io, earlier)?;
        }
        Ok(())
    }

    /// Returns every owned target to the pool.
    pub fn release(self, pool: &mut RenderTargetPool) {
        for target in &self.targets {
            pool.release(target);
        }
        log::debug!("Pipeline '{}' released {} targets", self.label, self.targets.len());
    }
}
