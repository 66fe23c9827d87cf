//
// session.rs
// Dicom-Viewer-rs
//
// Viewer session: composes decoder, viewport, surface, annotations, interaction, and frame navigation behind last-writer-wins loads.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::annotation::{AnnotationKind, AnnotationLayer};
use crate::config::ViewerConfig;
use crate::decoder::{normalize_url, DecodedImage, ImageDecoder};
use crate::error::{DecodeError, ViewerError, ViewerResult};
use crate::frames::{FrameNavigator, FrameRequest};
use crate::interaction::{FrameStep, InputEvent, InteractionClass, InteractionController, Outcome, Targets};
use crate::models::{ImageInfo, ViewerState, ViewerStatus};
use crate::render::{encode_png, Point, RenderSurface, SurfaceBounds};
use crate::viewport::{ScaleLimits, ViewportModel, WindowAdjust};

pub const SNAPSHOT_FILENAME: &str = "dicom-snapshot.png";
pub const ANNOTATED_FILENAME: &str = "dicom-annotated.png";

const DECODE_FAILED: &str =
    "Failed to load DICOM: The file may be corrupted or not a valid DICOM image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    File,
    Url,
}

/// Issued when a load starts; only the most recent ticket may commit.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    seq: u64,
    pub image_id: String,
    pub source: LoadSource,
}

/// Issued when a frame switch starts.
#[derive(Debug, Clone)]
pub struct FrameTicket {
    seq: u64,
    generation: u64,
    pub request: FrameRequest,
}

/// Guard for one class of listeners. Dropping it detaches the class.
#[derive(Debug)]
pub struct Subscription {
    class: InteractionClass,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn class(&self) -> InteractionClass {
        self.class
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Pointer, keyboard, and drag-drop subscriptions held together for a session's lifetime.
#[derive(Debug)]
pub struct Attachment {
    pub pointer: Subscription,
    pub keyboard: Subscription,
    pub drag_drop: Subscription,
}

/// Encoded still image ready for download.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub filename: &'static str,
    pub png: Vec<u8>,
}

/// One viewer: exclusively owns its viewport, annotation layer, and render surface.
pub struct ViewerSession {
    config: ViewerConfig,
    decoder: Option<Arc<dyn ImageDecoder>>,
    surface: RenderSurface,
    image: Option<DecodedImage>,
    viewport: Option<ViewportModel>,
    layer: AnnotationLayer,
    controller: InteractionController,
    navigator: FrameNavigator,
    status: ViewerStatus,
    listeners: HashMap<InteractionClass, Arc<AtomicBool>>,
    load_seq: u64,
    pending_load: Option<u64>,
    frame_seq: u64,
    generation: u64,
}

impl ViewerSession {
    /// Session with a surface sized from `config`.
    pub fn new(config: ViewerConfig, decoder: Arc<dyn ImageDecoder>) -> Self {
        let config = config.sanitized();
        let bounds = SurfaceBounds::sized(config.surface_width, config.surface_height);
        let mut session = Self::unmounted(config, decoder);
        session.surface.mount(bounds);
        session
    }

    /// Session whose surface has not been mounted yet; everything is a no-op until [`Self::mount`].
    pub fn unmounted(config: ViewerConfig, decoder: Arc<dyn ImageDecoder>) -> Self {
        let config = config.sanitized();
        Self {
            controller: InteractionController::from_config(&config),
            config,
            decoder: Some(decoder),
            surface: RenderSurface::unmounted(),
            image: None,
            viewport: None,
            layer: AnnotationLayer::new(),
            navigator: FrameNavigator::new(),
            status: ViewerStatus::empty(),
            listeners: HashMap::new(),
            load_seq: 0,
            pending_load: None,
            frame_seq: 0,
            generation: 0,
        }
    }

    pub fn mount(&mut self, bounds: SurfaceBounds) {
        self.surface.mount(bounds);
        self.repaint();
    }

    /// Follows a resize/scroll of the host element.
    pub fn set_bounds(&mut self, bounds: SurfaceBounds) {
        self.surface.set_bounds(bounds);
        self.repaint();
    }

    /// Attaches one listener class, replacing any earlier subscription for it.
    pub fn subscribe(&mut self, class: InteractionClass) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        if let Some(previous) = self.listeners.insert(class, Arc::clone(&active)) {
            previous.store(false, Ordering::Release);
        }
        Subscription { class, active }
    }

    pub fn attach(&mut self) -> Attachment {
        Attachment {
            pointer: self.subscribe(InteractionClass::Pointer),
            keyboard: self.subscribe(InteractionClass::Keyboard),
            drag_drop: self.subscribe(InteractionClass::DragDrop),
        }
    }

    pub fn is_listening(&self, class: InteractionClass) -> bool {
        self.listeners
            .get(&class)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Detaches every listener and releases the decoder and surface bindings.
    pub fn teardown(&mut self) {
        for flag in self.listeners.values() {
            flag.store(false, Ordering::Release);
        }
        self.listeners.clear();
        self.decoder = None;
        self.surface.unmount();
        self.controller.cancel(&mut self.layer);
        self.layer.clear();
        self.image = None;
        self.viewport = None;
        self.navigator.detach();
        self.pending_load = None;
        // Anything still in flight must not land on a torn-down session.
        self.load_seq += 1;
        self.frame_seq += 1;
        self.generation += 1;
        debug!("viewer session torn down");
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.surface.is_mounted() && self.decoder.as_ref().is_some_and(|d| d.is_ready())
    }

    /// Handle to the decoder for decoding outside of a lock.
    pub fn decoder(&self) -> Option<Arc<dyn ImageDecoder>> {
        self.decoder.clone()
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some_and(|seq| seq == self.load_seq)
    }

    pub fn image(&self) -> Option<&DecodedImage> {
        self.image.as_ref()
    }

    pub fn viewport(&self) -> Option<&ViewportModel> {
        self.viewport.as_ref()
    }

    pub fn layer(&self) -> &AnnotationLayer {
        &self.layer
    }

    pub fn navigator(&self) -> &FrameNavigator {
        &self.navigator
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    // ----- loading -------------------------------------------------------

    /// Registers a local blob and starts loading it.
    pub fn begin_load_file(&mut self, name: Option<&str>, bytes: Vec<u8>) -> Option<LoadTicket> {
        let decoder = self.ready_decoder()?;
        let image_id = decoder.register_file(name, bytes);
        Some(self.issue_ticket(image_id, LoadSource::File, "Loading file..."))
    }

    pub fn begin_load_url(&mut self, url: &str) -> Option<LoadTicket> {
        if url.trim().is_empty() {
            return None;
        }
        self.ready_decoder()?;
        let image_id = normalize_url(url);
        Some(self.issue_ticket(image_id, LoadSource::Url, "Loading URL..."))
    }

    /// Dropped files load like picked files, provided drag-drop listeners are attached.
    pub fn begin_drop(&mut self, name: Option<&str>, bytes: Vec<u8>) -> Option<LoadTicket> {
        if !self.is_listening(InteractionClass::DragDrop) {
            debug!("drop ignored: drag-drop listeners detached");
            return None;
        }
        self.begin_load_file(name, bytes)
    }

    /// Applies a decode result. Returns false when the ticket was superseded.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<DecodedImage, DecodeError>,
    ) -> bool {
        if ticket.seq != self.load_seq {
            debug!(image_id = %ticket.image_id, "stale load result discarded");
            return false;
        }
        self.pending_load = None;

        let image = match result {
            Ok(image) => image,
            Err(err) => {
                warn!(image_id = %ticket.image_id, error = %err, "failed to load image");
                self.status = match ticket.source {
                    LoadSource::File => ViewerStatus::failed(DECODE_FAILED),
                    LoadSource::Url => ViewerStatus::failed(format!("Failed to load URL: {}", err)),
                };
                return false;
            }
        };

        // Swap image, viewport, navigation, and annotations together.
        let (width, height) = self.surface_size();
        let limits = ScaleLimits {
            min: self.config.min_scale,
            max: self.config.max_scale,
        };
        self.controller.cancel(&mut self.layer);
        self.layer.clear();
        self.viewport = Some(ViewportModel::fit(&image, width, height, limits));
        self.navigator.attach(&ticket.image_id, image.frame_count, 0);
        self.generation += 1;
        self.frame_seq += 1;

        info!(
            image_id = %ticket.image_id,
            rows = image.rows,
            columns = image.columns,
            frames = image.frame_count,
            "image loaded"
        );
        self.image = Some(image);
        self.status = match ticket.source {
            LoadSource::File => ViewerStatus::ready("Image loaded successfully"),
            LoadSource::Url => ViewerStatus::ready("Image loaded from URL successfully"),
        };
        self.repaint();
        true
    }

    pub async fn load_file(&mut self, name: Option<&str>, bytes: Vec<u8>) -> bool {
        match self.begin_load_file(name, bytes) {
            Some(ticket) => self.complete_load(ticket).await,
            None => false,
        }
    }

    pub async fn load_url(&mut self, url: &str) -> bool {
        match self.begin_load_url(url) {
            Some(ticket) => self.complete_load(ticket).await,
            None => false,
        }
    }

    pub async fn drop_file(&mut self, name: Option<&str>, bytes: Vec<u8>) -> bool {
        match self.begin_drop(name, bytes) {
            Some(ticket) => self.complete_load(ticket).await,
            None => false,
        }
    }

    async fn complete_load(&mut self, ticket: LoadTicket) -> bool {
        let result = match self.decoder.clone() {
            Some(decoder) => decoder.decode(&ticket.image_id).await,
            None => return false,
        };
        self.finish_load(ticket, result)
    }

    fn ready_decoder(&mut self) -> Option<Arc<dyn ImageDecoder>> {
        if !self.surface.is_mounted() {
            debug!("load ignored: render surface not mounted");
            return None;
        }
        match self.decoder.clone() {
            Some(decoder) if decoder.is_ready() => Some(decoder),
            _ => {
                self.status = ViewerStatus::failed(ViewerError::DecoderNotReady.to_string());
                None
            }
        }
    }

    fn issue_ticket(&mut self, image_id: String, source: LoadSource, message: &str) -> LoadTicket {
        self.load_seq += 1;
        self.pending_load = Some(self.load_seq);
        self.status = ViewerStatus::loading(message);
        debug!(image_id = %image_id, seq = self.load_seq, "load requested");
        LoadTicket {
            seq: self.load_seq,
            image_id,
            source,
        }
    }

    // ----- frames --------------------------------------------------------

    pub fn begin_frame(&mut self, request: FrameRequest) -> Option<FrameTicket> {
        if !self.decoder.as_ref().is_some_and(|d| d.is_ready()) {
            debug!(frame = request.index, "frame switch ignored: decoder not ready");
            return None;
        }
        self.frame_seq += 1;
        Some(FrameTicket {
            seq: self.frame_seq,
            generation: self.generation,
            request,
        })
    }

    pub fn begin_go_to(&mut self, index: i64) -> Option<FrameTicket> {
        let request = self.navigator.go_to(index)?;
        self.begin_frame(request)
    }

    pub fn begin_step(&mut self, step: FrameStep) -> Option<FrameTicket> {
        let request = match step {
            FrameStep::Previous => self.navigator.previous(),
            FrameStep::Next => self.navigator.next(),
            FrameStep::First => self.navigator.first(),
            FrameStep::Last => self.navigator.last(),
        }?;
        self.begin_frame(request)
    }

    /// Applies a frame decode. A failed decode still moves the frame counter but keeps the old pixels.
    pub fn finish_frame(
        &mut self,
        ticket: FrameTicket,
        result: Result<DecodedImage, DecodeError>,
    ) -> bool {
        if ticket.seq != self.frame_seq || ticket.generation != self.generation {
            debug!(frame = ticket.request.index, "stale frame result discarded");
            return false;
        }

        self.navigator.commit(&ticket.request);
        if let Some(viewport) = self.viewport.as_mut() {
            viewport.current_frame = ticket.request.index;
        }
        self.controller.cancel(&mut self.layer);
        self.layer.clear();

        match result {
            Ok(image) => self.image = Some(image),
            Err(err) => warn!(
                image_id = %ticket.request.image_id,
                error = %err,
                "frame decode failed, keeping previous pixels"
            ),
        }
        self.repaint();
        true
    }

    pub async fn go_to_frame(&mut self, index: i64) -> bool {
        match self.begin_go_to(index) {
            Some(ticket) => self.complete_frame(ticket).await,
            None => false,
        }
    }

    pub async fn step_frame(&mut self, step: FrameStep) -> bool {
        match self.begin_step(step) {
            Some(ticket) => self.complete_frame(ticket).await,
            None => false,
        }
    }

    async fn complete_frame(&mut self, ticket: FrameTicket) -> bool {
        let result = match self.decoder.clone() {
            Some(decoder) => decoder.decode(&ticket.request.image_id).await,
            None => return false,
        };
        self.finish_frame(ticket, result)
    }

    // ----- input ---------------------------------------------------------

    /// Routes one input event through the controller. Frame steps are returned, not executed.
    pub fn handle_event(&mut self, event: &InputEvent) -> Outcome {
        if !self.surface.is_mounted() || !self.is_listening(event.class()) {
            return Outcome::Ignored;
        }
        let local = event
            .position()
            .and_then(|(x, y)| self.surface.local_coordinates(x, y));
        let outcome = self.controller.handle(
            event,
            local,
            Targets {
                viewport: self.viewport.as_mut(),
                layer: &mut self.layer,
                frame_count: self.navigator.frame_count(),
            },
        );
        if outcome == Outcome::Repaint {
            self.repaint();
        }
        outcome
    }

    /// Handles an event end to end, including any frame decode it triggers.
    pub async fn dispatch(&mut self, event: &InputEvent) -> Outcome {
        let outcome = self.handle_event(event);
        if let Outcome::Navigate(step) = outcome {
            self.step_frame(step).await;
        }
        outcome
    }

    pub fn toggle_draw_mode(&mut self, kind: AnnotationKind) -> Option<AnnotationKind> {
        self.controller.toggle_draw_mode(kind, &mut self.layer)
    }

    pub fn set_draw_mode(&mut self, mode: Option<AnnotationKind>) -> Option<AnnotationKind> {
        self.controller.set_draw_mode(mode, &mut self.layer)
    }

    pub fn clear_annotations(&mut self) {
        self.controller.cancel(&mut self.layer);
        self.layer.clear();
    }

    // ----- viewport operations --------------------------------------------

    pub fn zoom(&mut self, factor: f64) -> bool {
        self.mutate_viewport("zoom", |vp| vp.zoom(factor))
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom(self.config.button_zoom_in)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom(self.config.button_zoom_out)
    }

    pub fn pan(&mut self, dx: f64, dy: f64) -> bool {
        self.mutate_viewport("pan", |vp| vp.pan(dx, dy))
    }

    pub fn adjust_window(&mut self, kind: WindowAdjust, delta: f64) -> bool {
        self.mutate_viewport("window adjust", |vp| vp.adjust_window(kind, delta))
    }

    pub fn set_window(&mut self, width: f64, center: f64) -> bool {
        self.mutate_viewport("window set", |vp| vp.set_window(width, center))
    }

    pub fn toggle_invert(&mut self) -> bool {
        self.mutate_viewport("invert", ViewportModel::toggle_invert)
    }

    /// Re-fits the displayed frame; the frame index and annotations are kept.
    pub fn reset_view(&mut self) -> bool {
        let (width, height) = self.surface_size();
        let (Some(image), Some(viewport)) = (self.image.as_ref(), self.viewport.as_mut()) else {
            debug!("reset ignored: no image loaded");
            return false;
        };
        viewport.reset(image, width, height);
        viewport.current_frame = self.navigator.current_frame();
        self.repaint();
        true
    }

    fn mutate_viewport(&mut self, operation: &str, apply: impl FnOnce(&mut ViewportModel)) -> bool {
        if !self.surface.is_mounted() {
            return false;
        }
        let Some(viewport) = self.viewport.as_mut() else {
            debug!(operation, "ignored: no image loaded");
            return false;
        };
        apply(viewport);
        self.repaint();
        true
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
            .size()
            .unwrap_or((self.config.surface_width, self.config.surface_height))
    }

    // ----- output ----------------------------------------------------------

    fn repaint(&mut self) {
        if let (Some(image), Some(viewport)) = (self.image.as_ref(), self.viewport.as_ref()) {
            self.surface.paint(image, viewport);
        }
    }

    /// Frame plus annotation overlay (draft included), as currently displayed.
    pub fn rendered(&self) -> Option<RgbaImage> {
        self.image.as_ref()?;
        self.surface.pixels().map(|base| self.layer.overlay(base))
    }

    /// PNG of the current pixels, optionally flattened with committed annotations.
    pub fn snapshot(&self, annotated: bool) -> ViewerResult<Snapshot> {
        if self.image.is_none() {
            return Err(ViewerError::NoImage);
        }
        let base = self.surface.pixels().ok_or(ViewerError::NotMounted)?;
        let (filename, png) = if annotated {
            (ANNOTATED_FILENAME, encode_png(&self.layer.flatten(base))?)
        } else {
            (SNAPSHOT_FILENAME, encode_png(base)?)
        };
        Ok(Snapshot { filename, png })
    }

    /// Image pixel coordinates under a page position, for the displayed frame.
    pub fn image_coordinates(&self, page_x: f64, page_y: f64) -> Option<Point> {
        let image = self.image.as_ref()?;
        let viewport = self.viewport.as_ref()?;
        let local = self.surface.local_coordinates(page_x, page_y)?;
        self.surface.surface_to_image(local, image, viewport)
    }

    pub fn info(&self) -> Option<ImageInfo> {
        let image = self.image.as_ref()?;
        let viewport = self.viewport.as_ref()?;
        let meta = |key: &str| ImageInfo::unknown_if_missing(image.metadata.get(key));
        Some(ImageInfo {
            patient_name: meta("PatientName"),
            patient_id: meta("PatientID"),
            study_date: meta("StudyDate"),
            modality: meta("Modality"),
            dimensions: format!("{} x {}", image.columns, image.rows),
            window_width: viewport.window_width.round() as i64,
            window_center: viewport.window_center.round() as i64,
            frame: format!(
                "{} / {}",
                self.navigator.current_frame() + 1,
                self.navigator.frame_count().max(1)
            ),
            pixel_spacing: image.pixel_spacing,
        })
    }

    pub fn state(&self) -> ViewerState {
        ViewerState {
            status: self.status.clone(),
            loading: self.is_loading(),
            image_id: self.image.as_ref().map(|i| i.image_id.clone()),
            info: self.info(),
            viewport: self.viewport.clone(),
            frame_count: self.navigator.frame_count(),
            draw_mode: self.controller.draw_mode(),
            annotations: self.layer.annotations().to_vec(),
            draft: self.layer.draft().cloned(),
        }
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
