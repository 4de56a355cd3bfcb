//! The owning engine: content application, materialization and layout for
//! one host.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

use attach_flow::{prepare, Attachment, AttachmentId, PrepareOptions, PreparedContent};

use crate::geometry::Rect;
use crate::host::TextHost;
use crate::layout::{AttachmentFrame, LayoutEngine, LayoutItem, DEFAULT_TOP_LINE_PADDING};
use crate::materialize::{AttachmentState, Decision, MaterializationController, MaterializationPolicy};
use crate::replacement::{default_replacement, AttachmentMap, ContentLoader, LoadedContent, Replacement};
use crate::resize::{fit_to_container, ResizeReconciler};

/// Runtime diagnostics from content application and layout.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewDiagnostic {
    ContentApplied {
        generation: u64,
        attachments: usize,
    },
    /// Prepared content finished after newer content was requested.
    StaleContentDropped {
        generation: u64,
        current: u64,
    },
    /// A natural size arrived for content or an attachment that is gone.
    StaleSizeDropped {
        generation: u64,
        id: String,
    },
    LayoutPass {
        pass: usize,
        materialized: usize,
    },
    Deferred {
        id: String,
    },
    Revealed {
        count: usize,
    },
    /// A tag occurrence was skipped or dropped during preparation.
    MarkupRecovered {
        code: &'static str,
    },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(ViewDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;
type CompletionCallback = Box<dyn FnMut() + Send + 'static>;

/// Errors from explicit [`AttachmentView`] calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewError {
    /// The preparation worker exited without delivering content.
    WorkerDisconnected { generation: u64 },
    /// No attachment with this identifier in the current content.
    UnknownAttachment(AttachmentId),
}

impl ViewError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkerDisconnected { .. } => "VIEW_WORKER_DISCONNECTED",
            Self::UnknownAttachment(_) => "VIEW_UNKNOWN_ATTACHMENT",
        }
    }
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerDisconnected { generation } => write!(
                f,
                "preparation worker for generation {} exited without a result",
                generation
            ),
            Self::UnknownAttachment(id) => write!(f, "unknown attachment {}", id),
        }
    }
}

impl std::error::Error for ViewError {}

/// Options for [`AttachmentView`].
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayOptions {
    /// Fall back to the built-in mapping when the caller's map returns
    /// nothing.
    pub auto_load_attachments: bool,
    /// Policy restored whenever new content is applied.
    pub policy: MaterializationPolicy,
    pub prepare: PrepareOptions,
    pub top_line_padding: f32,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            auto_load_attachments: true,
            policy: MaterializationPolicy::Unbounded,
            prepare: PrepareOptions::default(),
            top_line_padding: DEFAULT_TOP_LINE_PADDING,
        }
    }
}

#[derive(Clone, Debug)]
struct AttachmentRecord {
    replacement: Replacement,
    frame: Rect,
    /// Region registered with the host by the last layout pass.
    exclusion: Option<Rect>,
}

struct ContentMessage {
    generation: u64,
    content: PreparedContent,
}

struct SizeMessage {
    generation: u64,
    id: AttachmentId,
    loaded: Option<LoadedContent>,
}

/// Displays prepared markup in a [`TextHost`] and keeps replacement content
/// positioned at its anchors.
///
/// Every method runs on the thread that owns the host. Background work
/// (markup preparation, content loads) reports back through channels that
/// are drained by [`process_events`](Self::process_events); results built
/// for superseded content are dropped by generation.
pub struct AttachmentView<H: TextHost> {
    host: H,
    options: DisplayOptions,
    engine: LayoutEngine,
    controller: MaterializationController,
    reconciler: ResizeReconciler,
    attachment_map: Option<AttachmentMap>,
    loader: Option<Arc<dyn ContentLoader>>,
    attachments: Vec<Attachment>,
    anchors: BTreeMap<AttachmentId, Range<usize>>,
    records: BTreeMap<AttachmentId, AttachmentRecord>,
    /// Bumped by every display request and reset.
    generation: u64,
    /// Generation of the content currently shown.
    applied_generation: u64,
    workers: Vec<(u64, Receiver<ContentMessage>)>,
    size_tx: Sender<SizeMessage>,
    size_rx: Receiver<SizeMessage>,
    layout_passes: usize,
    diagnostic_sink: DiagnosticSink,
    on_complete: Option<CompletionCallback>,
}

impl<H: TextHost> fmt::Debug for AttachmentView<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentView")
            .field("options", &self.options)
            .field("generation", &self.generation)
            .field("attachments", &self.attachments.len())
            .field("materialized", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl<H: TextHost> AttachmentView<H> {
    pub fn new(host: H, options: DisplayOptions) -> Self {
        let (size_tx, size_rx) = channel();
        Self {
            engine: LayoutEngine::new(options.top_line_padding),
            controller: MaterializationController::new(options.policy),
            host,
            options,
            reconciler: ResizeReconciler::new(),
            attachment_map: None,
            loader: None,
            attachments: Vec::new(),
            anchors: BTreeMap::new(),
            records: BTreeMap::new(),
            generation: 0,
            applied_generation: 0,
            workers: Vec::new(),
            size_tx,
            size_rx,
            layout_passes: 0,
            diagnostic_sink: None,
            on_complete: None,
        }
    }

    /// Register the caller's attachment-to-content mapping.
    pub fn set_attachment_map<F>(&mut self, map: F)
    where
        F: FnMut(&Attachment) -> Option<Replacement> + Send + 'static,
    {
        self.attachment_map = Some(Box::new(map));
    }

    pub fn set_content_loader(&mut self, loader: Arc<dyn ContentLoader>) {
        self.loader = Some(loader);
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(ViewDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    /// Called once each time content has been applied and laid out.
    pub fn set_on_complete<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    fn emit_diagnostic(&self, diagnostic: ViewDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn options(&self) -> &DisplayOptions {
        &self.options
    }

    /// Attachments of the current content, in anchor order.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Layout passes run since this view was created.
    pub fn layout_passes(&self) -> usize {
        self.layout_passes
    }

    /// Preparation workers whose result has not been received yet.
    pub fn in_flight(&self) -> usize {
        self.workers.len()
    }

    pub fn state(&self, id: &AttachmentId) -> Option<AttachmentState> {
        self.controller.state(id)
    }

    /// Attachments deferred by the viewport policy, awaiting a reveal.
    pub fn pending(&self) -> &[AttachmentId] {
        self.controller.pending()
    }

    pub fn policy(&self) -> MaterializationPolicy {
        self.controller.policy()
    }

    /// Current replacement content of a materialized attachment.
    pub fn replacement_for(&self, id: &AttachmentId) -> Option<&Replacement> {
        self.records.get(id).map(|record| &record.replacement)
    }

    pub fn frame(&self, id: &AttachmentId) -> Option<Rect> {
        self.records.get(id).map(|record| record.frame)
    }

    /// Placed attachments in anchor order.
    pub fn frames(&self) -> Vec<AttachmentFrame> {
        self.attachments
            .iter()
            .filter_map(|attachment| {
                let record = self.records.get(attachment.id())?;
                Some(AttachmentFrame {
                    id: attachment.id().clone(),
                    frame: record.frame,
                    exclusion: record.exclusion?,
                })
            })
            .collect()
    }

    /// Prepare `markup` on a background worker. The result is applied by a
    /// later [`process_events`](Self::process_events) or
    /// [`wait_for_content`](Self::wait_for_content); any earlier request
    /// still in flight is superseded.
    pub fn display(&mut self, markup: impl Into<String>) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let markup = markup.into();
        let options = self.options.prepare.clone();
        let (tx, rx) = sync_channel(1);

        std::thread::spawn(move || {
            let content = prepare(&markup, &options);
            let _ = tx.send(ContentMessage {
                generation,
                content,
            });
        });

        self.workers.push((generation, rx));
        log::debug!("display requested (generation {})", generation);
        generation
    }

    /// Prepare and apply `markup` on the calling thread.
    pub fn set_content(&mut self, markup: &str) {
        self.generation += 1;
        let content = prepare(markup, &self.options.prepare);
        self.apply_content(self.generation, content);
    }

    /// Block until the most recent [`display`](Self::display) request has
    /// been applied, then drain other pending events.
    pub fn wait_for_content(&mut self) -> Result<(), ViewError> {
        while self.applied_generation != self.generation {
            let generation = self.generation;
            let Some(pos) = self.workers.iter().position(|(g, _)| *g == generation) else {
                return Err(ViewError::WorkerDisconnected { generation });
            };
            let (_, rx) = self.workers.remove(pos);
            let message = rx
                .recv()
                .map_err(|_| ViewError::WorkerDisconnected { generation })?;
            self.accept_content(message);
        }
        self.process_events();
        Ok(())
    }

    /// Apply finished preparation results and natural sizes that have
    /// arrived since the last call. Returns the number of messages handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        let mut i = 0;
        while i < self.workers.len() {
            match self.workers[i].1.try_recv() {
                Ok(message) => {
                    self.workers.remove(i);
                    self.accept_content(message);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => i += 1,
                Err(TryRecvError::Disconnected) => {
                    let (generation, _) = self.workers.remove(i);
                    log::warn!(
                        "preparation worker for generation {} exited without a result",
                        generation
                    );
                }
            }
        }
        while let Ok(message) = self.size_rx.try_recv() {
            self.accept_size(message);
            handled += 1;
        }
        handled
    }

    fn accept_content(&mut self, message: ContentMessage) {
        if message.generation != self.generation {
            log::debug!(
                "dropping prepared content for generation {} (current {})",
                message.generation,
                self.generation
            );
            self.emit_diagnostic(ViewDiagnostic::StaleContentDropped {
                generation: message.generation,
                current: self.generation,
            });
            return;
        }
        self.apply_content(message.generation, message.content);
    }

    fn accept_size(&mut self, message: SizeMessage) {
        if message.generation != self.applied_generation || !self.records.contains_key(&message.id)
        {
            log::debug!("dropping stale size for {}", message.id);
            self.emit_diagnostic(ViewDiagnostic::StaleSizeDropped {
                generation: message.generation,
                id: message.id.label().to_string(),
            });
            return;
        }
        let Some(loaded) = message.loaded else {
            log::debug!("load failed for {}; size stays unknown", message.id);
            return;
        };
        if let Some(record) = self.records.get_mut(&message.id) {
            record.replacement.content = loaded.content;
        }
        if let Err(err) = self.resolve_natural_size(&message.id, loaded.natural_size) {
            log::warn!("{}", err);
        }
    }

    fn apply_content(&mut self, generation: u64, content: PreparedContent) {
        self.teardown();
        for diagnostic in &content.diagnostics {
            self.emit_diagnostic(ViewDiagnostic::MarkupRecovered {
                code: diagnostic.code(),
            });
        }

        self.host.set_content(&content.text);
        self.host.ensure_layout();
        self.anchors = content
            .text
            .anchors()
            .iter()
            .map(|anchor| (anchor.id.clone(), anchor.range.clone()))
            .collect();
        self.attachments = content.attachments;
        self.controller.track(self.attachments.iter().map(Attachment::id));
        self.applied_generation = generation;

        self.materialize_scan();
        self.layout_attachments();

        self.emit_diagnostic(ViewDiagnostic::ContentApplied {
            generation,
            attachments: self.attachments.len(),
        });
        if let Some(callback) = self.on_complete.as_mut() {
            callback();
        }
    }

    /// Drop the current content: detach every replacement, withdraw its
    /// exclusion region and destroy all materialization state. Late results
    /// for the dropped content are ignored.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.applied_generation = self.generation;
        self.teardown();
    }

    fn teardown(&mut self) {
        let mut regions = self.host.exclusion_regions().to_vec();
        let mut withdrew = false;
        for (id, record) in &self.records {
            self.host.detach(id);
            if let Some(rect) = record.exclusion {
                if let Some(pos) = regions.iter().position(|r| *r == rect) {
                    regions.remove(pos);
                    withdrew = true;
                }
            }
        }
        if withdrew {
            self.host.set_exclusion_regions(regions);
        }
        self.records.clear();
        self.attachments.clear();
        self.anchors.clear();
        self.controller.reset(self.options.policy);
    }

    fn anchor_rect(&self, id: &AttachmentId) -> Option<Rect> {
        let range = self.anchors.get(id)?;
        let glyphs = self.host.glyph_range(range.clone());
        self.host.bounding_rect(glyphs)
    }

    /// Decide, top to bottom, which `Parsed` attachments to materialize now.
    fn materialize_scan(&mut self) {
        self.controller.begin_scan();
        for index in 0..self.attachments.len() {
            let id = self.attachments[index].id().clone();
            if self.controller.state(&id) != Some(AttachmentState::Parsed) {
                continue;
            }
            let anchor_rect = self.anchor_rect(&id);
            match self.controller.decide(index, anchor_rect) {
                Decision::MaterializeNow => {
                    self.materialize(index);
                }
                Decision::Defer => {
                    self.controller.transition(&id, AttachmentState::Deferred);
                    self.emit_diagnostic(ViewDiagnostic::Deferred {
                        id: id.label().to_string(),
                    });
                }
                Decision::Skip => {
                    self.controller.transition(&id, AttachmentState::Skipped);
                }
            }
        }
    }

    /// Create and attach replacement content for the attachment at `index`.
    fn materialize(&mut self, index: usize) -> bool {
        let container_width = self.host.container_size().width;
        let attachment = &mut self.attachments[index];
        let id = attachment.id().clone();

        let mut replacement = self
            .attachment_map
            .as_mut()
            .and_then(|map| map(attachment));
        if replacement.is_none() && self.options.auto_load_attachments {
            replacement = default_replacement(attachment, container_width);
        }
        let Some(mut replacement) = replacement else {
            log::debug!("{} has no replacement content", id);
            if self.controller.state(&id) == Some(AttachmentState::Parsed) {
                self.controller.transition(&id, AttachmentState::Skipped);
            }
            return false;
        };

        attachment.mark_materialized();
        replacement.size = fit_to_container(replacement.size, attachment.max_size(), container_width);
        if let Some(source) = replacement.pending_source() {
            let source = source.to_string();
            self.request_load(&id, &source);
        }
        self.host.attach(&id, &replacement);
        self.records.insert(
            id.clone(),
            AttachmentRecord {
                replacement,
                frame: Rect::ZERO,
                exclusion: None,
            },
        );
        self.controller.transition(&id, AttachmentState::Materialized);
        true
    }

    fn request_load(&self, id: &AttachmentId, source: &str) {
        let Some(loader) = &self.loader else {
            log::debug!("no content loader; {} keeps an unknown size", id);
            return;
        };
        let tx = self.size_tx.clone();
        let generation = self.applied_generation;
        let id = id.clone();
        loader.load(
            source,
            Box::new(move |loaded| {
                let _ = tx.send(SizeMessage {
                    generation,
                    id,
                    loaded,
                });
            }),
        );
    }

    /// Recompute every materialized attachment's frame and exclusion region.
    pub fn layout_attachments(&mut self) {
        let items: Vec<LayoutItem> = self
            .attachments
            .iter()
            .filter_map(|attachment| {
                let record = self.records.get(attachment.id())?;
                let anchor = self.anchors.get(attachment.id())?;
                Some(LayoutItem {
                    id: attachment.id().clone(),
                    anchor: anchor.clone(),
                    alignment: attachment.alignment(),
                    size: record.replacement.size,
                })
            })
            .collect();
        let owned: Vec<Rect> = self
            .records
            .values()
            .filter_map(|record| record.exclusion)
            .collect();

        let frames = self.engine.layout(&mut self.host, &items, &owned);

        for record in self.records.values_mut() {
            record.exclusion = None;
        }
        for placed in frames {
            self.host.set_frame(&placed.id, placed.frame);
            if let Some(record) = self.records.get_mut(&placed.id) {
                record.frame = placed.frame;
                record.exclusion = Some(placed.exclusion);
            }
        }

        self.layout_passes += 1;
        log::debug!(
            "layout pass {}: {} materialized",
            self.layout_passes,
            self.records.len()
        );
        self.emit_diagnostic(ViewDiagnostic::LayoutPass {
            pass: self.layout_passes,
            materialized: self.records.len(),
        });
    }

    /// Materialize every deferred attachment in one pass, switch to the
    /// unbounded policy and lay out again. Returns how many were attached.
    pub fn reveal_remaining(&mut self) -> usize {
        let pending = self.controller.reveal();
        let mut count = 0;
        for id in &pending {
            let Some(index) = self.index_of(id) else {
                continue;
            };
            if self.materialize(index) {
                count += 1;
            } else {
                // no content for it: back to Parsed so the rescan skips it
                self.controller.transition(id, AttachmentState::Parsed);
            }
        }
        self.materialize_scan();
        self.layout_attachments();
        log::debug!("revealed {} deferred attachment(s)", count);
        self.emit_diagnostic(ViewDiagnostic::Revealed { count });
        count
    }

    /// Switch policy, re-evaluate skipped and deferred attachments and lay
    /// out again.
    pub fn set_policy(&mut self, policy: MaterializationPolicy) {
        self.controller.set_policy(policy);
        self.materialize_scan();
        self.layout_attachments();
    }

    /// Apply a natural size for a materialized attachment and re-run
    /// layout once. Returns `Ok(false)` when the size is itself unknown.
    pub fn resolve_natural_size(
        &mut self,
        id: &AttachmentId,
        natural: attach_flow::Size,
    ) -> Result<bool, ViewError> {
        let container_width = self.host.container_size().width;
        let index = self
            .index_of(id)
            .filter(|_| self.records.contains_key(id))
            .ok_or_else(|| ViewError::UnknownAttachment(id.clone()))?;
        let attachment = &mut self.attachments[index];
        let Some(size) = self
            .reconciler
            .natural_size_resolved(attachment, natural, container_width)
        else {
            return Ok(false);
        };
        if let Some(record) = self.records.get_mut(id) {
            record.replacement.size = size;
        }
        self.layout_attachments();
        Ok(true)
    }

    /// The host's container size changed: refit every replacement and lay
    /// out once.
    pub fn container_geometry_changed(&mut self) {
        let container_width = self.host.container_size().width;
        for attachment in &self.attachments {
            if let Some(record) = self.records.get_mut(attachment.id()) {
                record.replacement.size = fit_to_container(
                    record.replacement.size,
                    attachment.max_size(),
                    container_width,
                );
            }
        }
        self.layout_attachments();
    }

    /// Replace (or first assign) the content shown for an attachment,
    /// fit it to the container and lay out again.
    pub fn assign_replacement(
        &mut self,
        id: &AttachmentId,
        replacement: Replacement,
    ) -> Result<(), ViewError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| ViewError::UnknownAttachment(id.clone()))?;
        let container_width = self.host.container_size().width;
        let attachment = &mut self.attachments[index];
        attachment.mark_materialized();
        let mut replacement = replacement;
        replacement.size = fit_to_container(replacement.size, attachment.max_size(), container_width);

        match self.records.get_mut(id) {
            Some(record) => {
                self.host.detach(id);
                record.replacement = replacement;
                self.host.attach(id, &record.replacement);
            }
            None => {
                self.host.attach(id, &replacement);
                self.records.insert(
                    id.clone(),
                    AttachmentRecord {
                        replacement,
                        frame: Rect::ZERO,
                        exclusion: None,
                    },
                );
                if self.controller.state(id) == Some(AttachmentState::Skipped) {
                    self.controller.transition(id, AttachmentState::Parsed);
                }
                self.controller.transition(id, AttachmentState::Materialized);
            }
        }
        self.layout_attachments();
        Ok(())
    }

    fn index_of(&self, id: &AttachmentId) -> Option<usize> {
        self.attachments
            .iter()
            .position(|attachment| attachment.id() == id)
    }
}
