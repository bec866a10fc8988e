//! Pixel tickets: one request for a rectangle of output pixels.
//!
//! A ticket carries the requested rectangle, a lazily allocated work buffer,
//! the output image it finally lands in, and the graph snapshot it was
//! planned against. Tickets can be kept between runs to walk an image in
//! tiles with [`PixelTicket::advance`].

use crate::pipeline::error::PipelineResult;
use crate::pipeline::graph::FilterGraph;
use crate::pipeline::image::{Image, ImageHandle, PixelLayout, Rect};
use crate::pipeline::signal::UserData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketState {
    #[default]
    Requested,
    ResolvingUpstream,
    Running,
    Done,
    Failed,
}

/// Position of a ticket in a tile walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub index: usize,
    pub rect: Rect,
}

pub struct PixelTicket {
    rect: Rect,
    cursor: usize,
    saved: Option<Cursor>,
    layout: PixelLayout,
    buffer: Option<ImageHandle>,
    output: Option<ImageHandle>,
    graph: Option<FilterGraph>,
    user_data: Option<UserData>,
    workspace: u32,
    state: TicketState,
    dirty: bool,
}

impl PixelTicket {
    pub fn new(rect: Rect, layout: PixelLayout) -> Self {
        Self {
            rect,
            cursor: 0,
            saved: None,
            layout,
            buffer: None,
            output: None,
            graph: None,
            user_data: None,
            workspace: 0,
            state: TicketState::Requested,
            dirty: false,
        }
    }

    /// Ticket covering all of `output`.
    pub fn for_image(output: ImageHandle) -> Self {
        let (rect, layout) = {
            let img = output.read();
            (img.full_rect(), img.layout())
        };
        let mut ticket = Self::new(rect, layout);
        ticket.output = Some(output);
        ticket
    }

    /// A fresh ticket for the same rectangle, used to pull secondary inputs.
    pub fn derive(&self) -> Self {
        let rect = match self.output {
            Some(_) => {
                let (x, y, w, h) = self.pixel_bounds();
                Rect::new(x as f64, y as f64, w as f64, h as f64)
            }
            None => self.rect,
        };
        let mut ticket = Self::new(rect, self.layout);
        ticket.workspace = self.workspace;
        ticket
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Change the requested rectangle. The buffer is dropped if its size no longer fits.
    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
        let (_, _, w, h) = self.pixel_bounds();
        if self.buffer.as_ref().is_some_and(|b| b.dimensions() != (w, h)) {
            self.buffer = None;
        }
    }

    /// Whole pixel region of the rectangle, clipped to the output image if there is one.
    pub fn pixel_bounds(&self) -> (usize, usize, usize, usize) {
        let (x, y, w, h) = self.rect.pixel_bounds();
        match &self.output {
            Some(out) => {
                let (ow, oh) = out.dimensions();
                let (x, y) = (x.min(ow), y.min(oh));
                (x, y, w.min(ow - x), h.min(oh - y))
            }
            None => (x, y, w, h),
        }
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> TicketState {
        self.state
    }

    pub fn set_state(&mut self, state: TicketState) {
        self.state = state;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn workspace(&self) -> u32 {
        self.workspace
    }

    pub fn set_workspace(&mut self, workspace: u32) {
        self.workspace = workspace;
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    pub fn set_user_data(&mut self, data: Option<UserData>) {
        self.user_data = data;
    }

    pub fn graph(&self) -> Option<&FilterGraph> {
        self.graph.as_ref()
    }

    pub fn set_graph(&mut self, graph: FilterGraph) {
        self.graph = Some(graph);
    }

    pub fn output(&self) -> Option<&ImageHandle> {
        self.output.as_ref()
    }

    pub fn set_output(&mut self, output: ImageHandle) {
        if self.buffer.as_ref().is_some_and(|b| b.same_storage(&output)) {
            self.buffer = None;
        }
        self.layout = output.read().layout();
        self.output = Some(output);
    }

    pub fn buffer(&self) -> Option<&ImageHandle> {
        self.buffer.as_ref()
    }

    /// Work buffer for the current rectangle, allocated on first use.
    ///
    /// When the rectangle is exactly the whole output image, the output storage
    /// itself is used and no copy is needed afterwards.
    pub fn ensure_buffer(&mut self) -> PipelineResult<ImageHandle> {
        let (x, y, w, h) = self.pixel_bounds();
        if let Some(buf) = &self.buffer {
            let img = buf.read();
            if (img.width(), img.height()) == (w, h) && img.layout() == self.layout {
                return Ok(buf.clone());
            }
        }
        let whole_output = self.output.as_ref().filter(|out| {
            let img = out.read();
            (x, y) == (0, 0) && (img.width(), img.height()) == (w, h) && img.layout() == self.layout
        });
        let buf = match whole_output {
            Some(out) => out.clone(),
            None => ImageHandle::new(Image::try_new(w, h, self.layout)?),
        };
        self.buffer = Some(buf.clone());
        Ok(buf)
    }

    /// Whether the buffer is the output image itself.
    pub fn writes_in_place(&self) -> bool {
        match (&self.buffer, &self.output) {
            (Some(b), Some(o)) => b.same_storage(o),
            _ => false,
        }
    }

    pub fn remember_position(&mut self) {
        self.saved = Some(Cursor {
            index: self.cursor,
            rect: self.rect,
        });
    }

    /// Go back to the remembered position. Returns `false` if none was saved.
    pub fn restore_position(&mut self) -> bool {
        match self.saved {
            Some(pos) => {
                self.cursor = pos.index;
                self.set_rect(pos.rect);
                true
            }
            None => false,
        }
    }

    /// Move to the next tile of the output image, left to right, top to bottom.
    ///
    /// Returns `false` once the walk has passed the last tile or when there is
    /// no output image to walk.
    pub fn advance(&mut self) -> bool {
        let Some((out_w, out_h)) = self.output.as_ref().map(|o| o.dimensions()) else {
            return false;
        };
        if self.rect.is_empty() {
            return false;
        }
        let mut next = self.rect;
        next.x += self.rect.width;
        if next.x >= out_w as f64 {
            next.x = 0.0;
            next.y += self.rect.height;
        }
        if next.y >= out_h as f64 {
            return false;
        }
        self.cursor += 1;
        self.set_rect(next);
        true
    }
}

impl std::fmt::Debug for PixelTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelTicket")
            .field("rect", &self.rect)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .field("has_buffer", &self.buffer.is_some())
            .field("has_output", &self.output.is_some())
            .finish()
    }
}
