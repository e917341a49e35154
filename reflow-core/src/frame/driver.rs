//! Frame Driver
//!
//! One call to [`FrameDriver::run_frame`] takes the UI from "something
//! changed" to "the renderer has the new pixels":
//!
//! ```text
//! Idle -> TransactionsDrained -> LayoutPass -> PaintPass -> Presented -> Idle
//! ```
//!
//! 1. Queued writes (local and remote) are applied in one transaction, so
//!    effects run once. Invalidations the effects queued are applied to the
//!    tree.
//! 2. If nothing was written and nothing is dirty, the frame is skipped.
//! 3. Layout roots are measured; the cache answers for everything clean.
//! 4. Widgets needing paint are repainted, parents first, and their old and
//!    new bounds become dirty rectangles.
//! 5. The renderer receives the dirty rectangles and draw commands.

use std::cell::Cell;

use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use super::invalidator::Invalidator;
use super::remote::{Inbox, RemoteWriter};
use super::renderer::Renderer;
use crate::config::{Config, FrameConfig};
use crate::error::{ConfigError, FrameError, MeasureError, ReactiveError, Result};
use crate::invalidation::{InvalidationFlags, InvalidationTree, WidgetId};
use crate::layout::{coalesce_rects, Constraints, Rect, Size};
use crate::reactive::{Effect, Runtime, Signal};
use crate::widget::{Capabilities, DrawCommand, DrawList, Widget};

type LocalWrite = Box<dyn FnOnce(&Runtime) -> Result<()>>;

/// Where the driver is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FramePhase {
    /// Between frames.
    Idle,
    /// Queued writes applied and effects settled.
    TransactionsDrained,
    /// Measuring layout roots.
    LayoutPass,
    /// Repainting invalidated widgets.
    PaintPass,
    /// Output handed to the renderer.
    Presented,
}

/// What happened during one frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Whether the frame was skipped as idle.
    pub skipped: bool,
    /// Phases entered, in order.
    pub phases: Vec<FramePhase>,
    /// Queued writes applied at the start of the frame.
    pub writes_applied: usize,
    /// Layout roots measured this frame.
    pub layout_roots: usize,
    /// Layout roots left for the next frame by the budget.
    pub deferred_roots: usize,
    /// Widgets whose `measure` was invoked.
    pub measured: usize,
    /// Measurements answered from the cache.
    pub cache_hits: usize,
    /// Widgets repainted.
    pub painted: usize,
    /// Draw commands handed to the renderer.
    pub draw_commands: usize,
    /// Dirty rectangles handed to the renderer.
    pub dirty_rects: Vec<Rect>,
    /// Queued writes that failed.
    #[serde(skip)]
    pub write_failures: Vec<ReactiveError>,
    /// Effects that failed while the queue drained.
    #[serde(skip)]
    pub effect_failures: Vec<ReactiveError>,
    /// Measurements replaced by a zero size.
    #[serde(skip)]
    pub measure_failures: Vec<(WidgetId, MeasureError)>,
}

impl FrameReport {
    /// Whether any isolated failure was recorded.
    pub fn has_failures(&self) -> bool {
        !self.write_failures.is_empty()
            || !self.effect_failures.is_empty()
            || !self.measure_failures.is_empty()
    }
}

/// Drives frames over a runtime and a widget tree.
pub struct FrameDriver {
    runtime: Runtime,
    tree: InvalidationTree,
    invalidator: Invalidator,
    inbox: Inbox,
    local: Vec<LocalWrite>,
    config: FrameConfig,
    viewport: Size,
    phase: FramePhase,
    frame_number: u64,
    last_epoch: u64,
}

impl FrameDriver {
    /// A driver with the default configuration.
    pub fn new(viewport: Size) -> Self {
        Self::from_valid_config(viewport, Config::default())
    }

    /// A driver with the given configuration, rejected if it does not
    /// pass [`Config::validate`].
    pub fn with_config(viewport: Size, config: Config) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(viewport, config))
    }

    fn from_valid_config(viewport: Size, config: Config) -> Self {
        debug!(
            width = viewport.width,
            height = viewport.height,
            config = ?config.frame,
            "frame driver created"
        );
        Self {
            runtime: Runtime::with_config(config.runtime),
            tree: InvalidationTree::new(),
            invalidator: Invalidator::new(),
            inbox: Inbox::new(),
            local: Vec::new(),
            config: config.frame,
            viewport,
            phase: FramePhase::Idle,
            frame_number: 0,
            last_epoch: 0,
        }
    }

    /// The reactive runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The widget tree.
    pub fn tree(&self) -> &InvalidationTree {
        &self.tree
    }

    /// Mutable access to the widget tree.
    pub fn tree_mut(&mut self) -> &mut InvalidationTree {
        &mut self.tree
    }

    /// A handle effects can use to invalidate widgets.
    pub fn invalidator(&self) -> Invalidator {
        self.invalidator.clone()
    }

    /// A `Send` handle for writing signals from other threads.
    pub fn remote_writer(&self) -> RemoteWriter {
        self.inbox.writer()
    }

    /// The current phase. `Idle` whenever `run_frame` is not executing.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of frames run so far, skipped ones included.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The size top-level widgets are laid out into.
    pub fn viewport(&self) -> Size {
        self.viewport
    }

    /// Resize the viewport. Top-level widgets are laid out again.
    pub fn set_viewport(&mut self, viewport: Size) -> std::result::Result<(), FrameError> {
        if viewport == self.viewport {
            return Ok(());
        }
        self.viewport = viewport;
        let roots: Vec<WidgetId> = self.tree.roots().to_vec();
        for root in roots {
            self.tree.mark_needs_layout(root)?;
        }
        debug!(width = viewport.width, height = viewport.height, "viewport resized");
        Ok(())
    }

    /// Insert a widget with its own reactive owner, nested under the
    /// parent's owner.
    pub fn insert_widget(
        &mut self,
        parent: Option<WidgetId>,
        widget: impl Widget,
    ) -> std::result::Result<WidgetId, FrameError> {
        let parent_owner = match parent {
            Some(parent) => self.tree.owner(parent)?,
            None => None,
        };
        let id = self.tree.insert(parent, widget)?;
        let owner = self.runtime.create_owner(parent_owner);
        self.tree.set_owner(id, owner)?;
        Ok(id)
    }

    /// Run `f` with the widget's owner active, so every signal, computed
    /// and effect it creates is disposed with the widget.
    pub fn build<R>(
        &self,
        widget: WidgetId,
        f: impl FnOnce(&Runtime, &Invalidator) -> R,
    ) -> std::result::Result<R, FrameError> {
        let out = match self.tree.owner(widget)? {
            Some(owner) => self
                .runtime
                .with_owner(owner, || f(&self.runtime, &self.invalidator)),
            None => f(&self.runtime, &self.invalidator),
        };
        Ok(out)
    }

    /// Invalidate `widget` with `flags` whenever anything `read` reads
    /// changes.
    ///
    /// The effect belongs to the widget's owner. Its first run only records
    /// dependencies.
    pub fn invalidate_on<F>(
        &self,
        widget: WidgetId,
        flags: InvalidationFlags,
        read: F,
    ) -> std::result::Result<Effect, FrameError>
    where
        F: Fn(&Runtime) -> Result<()> + 'static,
    {
        let invalidator = self.invalidator.clone();
        let armed = Cell::new(false);
        let effect = self.build(widget, |rt, _| {
            rt.create_effect(move |rt| {
                read(rt)?;
                if armed.replace(true) {
                    invalidator.invalidate(widget, flags);
                }
                Ok(())
            })
        })??;
        Ok(effect)
    }

    /// Remove a widget subtree and dispose the reactive owners of every
    /// removed widget, children before parents.
    ///
    /// Returns the removed widgets in that order.
    pub fn remove_widget(
        &mut self,
        widget: WidgetId,
    ) -> std::result::Result<Vec<WidgetId>, FrameError> {
        let removed = self.tree.remove_subtree(widget)?;
        let mut disposed = 0;
        for owner in removed.iter().filter_map(|(_, owner)| *owner) {
            disposed += self.runtime.dispose_owner(owner);
        }
        debug!(widget = ?widget, widgets = removed.len(), disposed, "widget removed");
        Ok(removed.into_iter().map(|(id, _)| id).collect())
    }

    /// Queue a write for the start of the next frame.
    pub fn queue_write<F>(&mut self, write: F)
    where
        F: FnOnce(&Runtime) -> Result<()> + 'static,
    {
        self.local.push(Box::new(write));
    }

    /// Queue `signal = value` for the start of the next frame.
    pub fn queue_set<T: Clone + 'static>(&mut self, signal: Signal<T>, value: T) {
        self.queue_write(move |rt| signal.set(rt, value));
    }

    /// Run one frame and present its output to `renderer`.
    ///
    /// Structural reactive errors abort the frame; the driver returns to
    /// `Idle` and the next frame starts fresh. Isolated failures are
    /// collected in the report.
    pub fn run_frame(
        &mut self,
        renderer: &mut dyn Renderer,
    ) -> std::result::Result<FrameReport, FrameError> {
        self.frame_number += 1;
        let mut report = FrameReport {
            frame: self.frame_number,
            ..FrameReport::default()
        };

        let result = self.run_phases(renderer, &mut report);
        self.enter(FramePhase::Idle, &mut report);
        match result {
            Ok(()) => Ok(report),
            Err(error) => {
                warn!(frame = self.frame_number, error = %error, "frame aborted");
                Err(error)
            }
        }
    }

    fn run_phases(
        &mut self,
        renderer: &mut dyn Renderer,
        report: &mut FrameReport,
    ) -> std::result::Result<(), FrameError> {
        report.writes_applied = self.drain_writes(report)?;
        self.apply_invalidations();
        report.effect_failures = self.runtime.take_effect_failures();

        let epoch = self.runtime.write_epoch();
        let wrote = epoch != self.last_epoch;
        self.last_epoch = epoch;
        self.enter(FramePhase::TransactionsDrained, report);

        if self.config.skip_idle_frames && !wrote && !self.tree.is_dirty() {
            report.skipped = true;
            trace!(frame = self.frame_number, "idle frame skipped");
            return Ok(());
        }

        self.enter(FramePhase::LayoutPass, report);
        self.layout_pass(report)?;

        self.enter(FramePhase::PaintPass, report);
        let (dirty, commands) = self.paint_pass(report)?;

        self.enter(FramePhase::Presented, report);
        renderer.present(&dirty, &commands);
        report.draw_commands = commands.len();
        report.dirty_rects = dirty;
        Ok(())
    }

    fn enter(&mut self, phase: FramePhase, report: &mut FrameReport) {
        debug!(frame = self.frame_number, from = ?self.phase, to = ?phase, "frame phase");
        self.phase = phase;
        report.phases.push(phase);
    }

    /// Apply every queued write in a single transaction.
    fn drain_writes(&mut self, report: &mut FrameReport) -> Result<usize> {
        let local = std::mem::take(&mut self.local);
        let remote = self.inbox.drain();
        let count = local.len() + remote.len();
        if count == 0 {
            return Ok(0);
        }

        let runtime = &self.runtime;
        let failures = runtime.run_in_transaction(|| {
            let mut failures = Vec::new();
            for write in local {
                if let Err(error) = write(runtime) {
                    failures.push(error);
                }
            }
            for write in remote {
                if let Err(error) = write(runtime) {
                    failures.push(error);
                }
            }
            failures
        })?;

        for error in &failures {
            warn!(error = %error, "queued write failed");
        }
        debug!(writes = count, failed = failures.len(), "queued writes applied");
        report.write_failures = failures;
        Ok(count)
    }

    fn apply_invalidations(&mut self) {
        for (widget, flags) in self.invalidator.drain() {
            if let Err(error) = self.tree.invalidate(widget, flags) {
                // The widget was removed after the effect queued it
                trace!(error = %error, "invalidation dropped");
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(frame = self.frame_number))]
    fn layout_pass(&mut self, report: &mut FrameReport) -> std::result::Result<(), FrameError> {
        let roots = self.tree.collect_layout_roots();
        let budget = self.config.max_layout_roots_per_frame.unwrap_or(usize::MAX);
        let (now, later) = roots.split_at(roots.len().min(budget));

        for &root in now {
            let constraints = match self.tree.parent(root)? {
                None => Constraints::tight(self.viewport),
                Some(_) => match self.tree.layout_entry(root)? {
                    Some(entry) => entry.constraints,
                    None => {
                        // Its parent never measured it, so it is not laid out
                        self.tree.clear_needs_layout(root)?;
                        continue;
                    }
                },
            };
            self.tree.measure_or_zero(root, constraints);
        }

        let stats = self.tree.take_layout_stats();
        report.layout_roots = now.len();
        report.deferred_roots = later.len();
        report.measured = stats.measured;
        report.cache_hits = stats.cache_hits;
        report.measure_failures = self.tree.take_measure_failures();
        debug!(
            roots = now.len(),
            deferred = later.len(),
            measured = stats.measured,
            cache_hits = stats.cache_hits,
            "layout pass finished"
        );
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(frame = self.frame_number))]
    fn paint_pass(
        &mut self,
        report: &mut FrameReport,
    ) -> std::result::Result<(Vec<Rect>, Vec<DrawCommand>), FrameError> {
        let mut dirty = self.tree.take_damage();
        let order = self.tree.paint_order();

        let mut list = DrawList::new();
        for id in order {
            let bounds = self.tree.absolute_bounds(id)?;
            if let Some(previous) = self.tree.painted_bounds(id)? {
                if Some(previous) != bounds {
                    dirty.push(previous);
                }
            }
            if let Some(bounds) = bounds {
                dirty.push(bounds);
                if self.tree.capabilities(id)?.contains(Capabilities::PAINTS) {
                    if let Some(widget) = self.tree.widget(id)? {
                        widget.paint(bounds, &mut list);
                    }
                }
                report.painted += 1;
            }
            self.tree.clear_needs_paint(id, bounds)?;
        }

        let dirty = if self.config.coalesce_dirty_rects {
            coalesce_rects(&dirty)
        } else {
            dirty.into_iter().filter(|rect| !rect.is_empty()).collect()
        };
        debug!(
            painted = report.painted,
            dirty = dirty.len(),
            commands = list.len(),
            "paint pass finished"
        );
        Ok((dirty, list.into_commands()))
    }
}

impl std::fmt::Debug for FrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("frame", &self.frame_number)
            .field("phase", &self.phase)
            .field("viewport", &self.viewport)
            .field("runtime", &self.runtime)
            .field("tree", &self.tree)
            .finish()
    }
}
