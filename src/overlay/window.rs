//! The overlay's X11 window
//!
//! A borderless, always-on-top toplevel on a 32-bit ARGB visual so the bare
//! canvas stays transparent. Each content region gets a child window in
//! source order, and the header strip is created last so it stacks above
//! them. Regions swallow button presses; presses on the header or the bare
//! canvas reach the toplevel and become window-manager drags.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::properties::{WmSizeHints, WmSizeHintsSpecification};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::config::OverlayConfig;
use crate::constants::{config as names, layout, x11};
use crate::content::{ContentHost, RegionContent};
use crate::font::{FontRenderer, RenderedText};
use crate::layout::{Composition, HitTarget, Rect, ResizeEdge};
use crate::persistence::WindowBounds;
use crate::toggle::OverlaySurface;
use crate::x11_utils::{self, AppContext, ArgbVisual, argb_to_bytes};

/// How a configure notification changed the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryChange {
    Unchanged,
    Moved,
    Resized,
}

impl GeometryChange {
    pub fn between(previous: &WindowBounds, current: &WindowBounds) -> Self {
        if !previous.same_size(current) {
            GeometryChange::Resized
        } else if previous.position() != current.position() {
            GeometryChange::Moved
        } else {
            GeometryChange::Unchanged
        }
    }
}

fn to_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn to_u16(value: u32) -> u16 {
    value.clamp(1, u16::MAX as u32) as u16
}

fn configure_aux(rect: Rect) -> ConfigureWindowAux {
    ConfigureWindowAux::new()
        .x(rect.x)
        .y(rect.y)
        .width(rect.width.max(1))
        .height(rect.height.max(1))
}

#[derive(Debug)]
struct RegionWindow {
    window: Window,
    url: String,
    content: RegionContent,
}

pub struct OverlayWindow<'a> {
    pub window: Window,
    header: Window,
    regions: Vec<RegionWindow>,
    colormap: Colormap,
    gc: Gcontext,
    composition: Composition,
    title: String,
    font: Option<FontRenderer>,
    content: ContentHost,
    /// Current root-relative geometry as last reported by the server
    geometry: WindowBounds,
    /// Bounds re-applied when the window is shown again
    restore: WindowBounds,
    visible: bool,
    header_visible: bool,
    ctx: AppContext<'a>,
}

impl<'a> OverlayWindow<'a> {
    fn create_toplevel(ctx: &AppContext, visual: ArgbVisual, colormap: Colormap, bounds: &WindowBounds) -> Result<Window> {
        let window = ctx.conn.generate_id().context("Failed to generate X11 window ID")?;
        let (x, y) = bounds.position().unwrap_or((0, 0));
        ctx.conn
            .create_window(
                visual.depth,
                window,
                ctx.screen.root,
                to_i16(x),
                to_i16(y),
                to_u16(bounds.width),
                to_u16(bounds.height),
                0,
                WindowClass::INPUT_OUTPUT,
                visual.visual,
                &CreateWindowAux::new()
                    .background_pixel(0)
                    .border_pixel(0)
                    .colormap(colormap)
                    .event_mask(
                        EventMask::STRUCTURE_NOTIFY
                            | EventMask::PROPERTY_CHANGE
                            | EventMask::BUTTON_PRESS
                            | EventMask::EXPOSURE,
                    ),
            )
            .context("Failed to create overlay window")?;
        Ok(window)
    }

    fn create_child(
        ctx: &AppContext,
        visual: ArgbVisual,
        colormap: Colormap,
        parent: Window,
        rect: Rect,
        background: u32,
        swallow_presses: bool,
    ) -> Result<Window> {
        let window = ctx.conn.generate_id().context("Failed to generate X11 window ID")?;
        let mut aux = CreateWindowAux::new()
            .background_pixel(background)
            .border_pixel(0)
            .colormap(colormap)
            .event_mask(EventMask::EXPOSURE);
        if swallow_presses {
            aux = aux.do_not_propogate_mask(EventMask::BUTTON_PRESS);
        }
        ctx.conn
            .create_window(
                visual.depth,
                window,
                parent,
                to_i16(rect.x),
                to_i16(rect.y),
                to_u16(rect.width),
                to_u16(rect.height),
                0,
                WindowClass::INPUT_OUTPUT,
                visual.visual,
                &aux,
            )
            .context(format!("Failed to create child window at {:?}", rect))?;
        Ok(window)
    }

    /// Borderless, always-on-top, titled, closable through WM_DELETE_WINDOW
    fn setup_window_properties(ctx: &AppContext, window: Window, bounds: &WindowBounds, config: &OverlayConfig) -> Result<()> {
        let mut hints = WmSizeHints::new();
        hints.size = Some((
            WmSizeHintsSpecification::UserSpecified,
            bounds.width as i32,
            bounds.height as i32,
        ));
        if let Some((x, y)) = bounds.position() {
            hints.position = Some((WmSizeHintsSpecification::UserSpecified, x, y));
        }
        hints
            .set_normal_hints(ctx.conn, window)
            .context("Failed to set WM_NORMAL_HINTS")?;

        x11_utils::set_no_decorations(ctx.conn, window, ctx.atoms)?;
        x11_utils::set_always_on_top(ctx.conn, window, ctx.atoms)?;
        x11_utils::set_opacity(ctx.conn, window, ctx.atoms, config.opacity_percent)?;

        ctx.conn
            .change_property8(PropMode::REPLACE, window, ctx.atoms.wm_class, AtomEnum::STRING, names::WM_CLASS)
            .context("Failed to set WM_CLASS")?;
        ctx.conn
            .change_property8(PropMode::REPLACE, window, AtomEnum::WM_NAME, AtomEnum::STRING, config.title.as_bytes())
            .context("Failed to set WM_NAME")?;
        ctx.conn
            .change_property8(
                PropMode::REPLACE,
                window,
                ctx.atoms.net_wm_name,
                ctx.atoms.utf8_string,
                config.title.as_bytes(),
            )
            .context("Failed to set _NET_WM_NAME")?;
        ctx.conn
            .change_property32(
                PropMode::REPLACE,
                window,
                ctx.atoms.wm_protocols,
                AtomEnum::ATOM,
                &[ctx.atoms.wm_delete_window],
            )
            .context("Failed to set WM_PROTOCOLS")?;
        Ok(())
    }

    pub fn new(
        ctx: AppContext<'a>,
        config: &OverlayConfig,
        composition: Composition,
        bounds: WindowBounds,
        font: Option<FontRenderer>,
        mut content: ContentHost,
    ) -> Result<Self> {
        let visual = x11_utils::find_argb_visual(ctx.screen)?;
        let colormap = ctx.conn.generate_id().context("Failed to generate colormap ID")?;
        ctx.conn
            .create_colormap(ColormapAlloc::NONE, colormap, ctx.screen.root, visual.visual)
            .context("Failed to create ARGB colormap")?;

        let window = Self::create_toplevel(&ctx, visual, colormap, &bounds)?;

        // Destroys the window tree if a later step fails
        struct WindowGuard<'a> {
            conn: &'a RustConnection,
            window: Window,
            colormap: Colormap,
            should_cleanup: bool,
        }

        impl Drop for WindowGuard<'_> {
            fn drop(&mut self) {
                if self.should_cleanup {
                    if let Err(e) = self.conn.destroy_window(self.window) {
                        error!(window = self.window, error = %e, "Failed to clean up overlay window after initialization failure");
                    }
                    let _ = self.conn.free_colormap(self.colormap);
                    let _ = self.conn.flush();
                }
            }
        }

        let mut guard = WindowGuard {
            conn: ctx.conn,
            window,
            colormap,
            should_cleanup: true,
        };

        Self::setup_window_properties(&ctx, window, &bounds, config)?;

        let resolved = composition.resolve(bounds.width, bounds.height);
        let mut regions = Vec::with_capacity(resolved.regions.len());
        for (region, rect) in composition.regions.iter().zip(&resolved.regions) {
            let child = Self::create_child(&ctx, visual, colormap, window, *rect, x11::PLACEHOLDER_BACKGROUND, true)?;
            regions.push(RegionWindow {
                window: child,
                url: region.url.clone(),
                content: RegionContent::Placeholder,
            });
        }
        let header = Self::create_child(&ctx, visual, colormap, window, resolved.header, x11::HEADER_BACKGROUND, false)?;

        let gc = ctx.conn.generate_id().context("Failed to generate graphics context ID")?;
        ctx.conn
            .create_gc(gc, window, &CreateGCAux::new())
            .context("Failed to create graphics context")?;

        ctx.conn
            .map_subwindows(window)
            .context("Failed to map overlay subwindows")?;
        ctx.conn
            .map_window(window)
            .context("Failed to map overlay window")?;
        // Embedders look the region windows up by XID
        ctx.conn
            .flush()
            .context("Failed to flush X11 connection after creating overlay window")?;

        for region in &mut regions {
            region.content = content.attach(region.window, &region.url);
            if region.content == RegionContent::Embedded {
                ctx.conn
                    .change_window_attributes(region.window, &ChangeWindowAttributesAux::new().background_pixel(0))
                    .context(format!("Failed to clear background of region for {}", region.url))?;
                ctx.conn
                    .clear_area(true, region.window, 0, 0, 0, 0)
                    .context(format!("Failed to repaint region for {}", region.url))?;
            }
        }

        info!(
            window = window,
            regions = regions.len(),
            width = bounds.width,
            height = bounds.height,
            position = ?bounds.position(),
            "Created overlay window"
        );

        guard.should_cleanup = false;

        Ok(Self {
            window,
            header,
            regions,
            colormap,
            gc,
            composition,
            title: config.title.clone(),
            font,
            content,
            geometry: bounds,
            restore: bounds,
            visible: true,
            header_visible: true,
            ctx,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.geometry.width, self.geometry.height)
    }

    pub fn set_restore_bounds(&mut self, bounds: WindowBounds) {
        self.restore = bounds;
    }

    /// Take a freshly queried geometry; re-resolves the layout on resize so
    /// corner-anchored regions stay on their edges
    pub fn observe_geometry(&mut self, bounds: WindowBounds) -> Result<GeometryChange> {
        let change = GeometryChange::between(&self.geometry, &bounds);
        if change == GeometryChange::Resized {
            self.apply_layout(bounds.width, bounds.height)?;
        }
        self.geometry = bounds;
        Ok(change)
    }

    fn apply_layout(&self, width: u32, height: u32) -> Result<()> {
        let resolved = self.composition.resolve(width, height);
        for (region, rect) in self.regions.iter().zip(resolved.regions) {
            self.ctx
                .conn
                .configure_window(region.window, &configure_aux(rect))
                .context(format!("Failed to place region for {}", region.url))?;
        }
        self.ctx
            .conn
            .configure_window(self.header, &configure_aux(resolved.header))
            .context("Failed to resize header strip")?;
        debug!(width = width, height = height, "Applied layout");
        Ok(())
    }

    pub fn hit_test(&self, x: i32, y: i32) -> HitTarget {
        let (width, height) = self.size();
        self.composition.hit_test(width, height, self.header_visible, x, y)
    }

    /// Start a window-manager move or edge resize for a left-button press
    /// delivered to the toplevel
    pub fn begin_drag(&self, event: &ButtonPressEvent) -> Result<()> {
        let (width, height) = self.size();
        let (x, y) = (event.event_x as i32, event.event_y as i32);
        let direction = match ResizeEdge::at(width, height, x, y) {
            Some(edge) => edge.direction(),
            None if self.hit_test(x, y).drag_enabled() => x11::MOVERESIZE_MOVE,
            None => return Ok(()),
        };
        debug!(x = x, y = y, direction = direction, "Starting window drag");
        x11_utils::begin_moveresize(
            self.ctx.conn,
            self.ctx.screen,
            self.ctx.atoms,
            self.window,
            event.root_x,
            event.root_y,
            direction,
            event.detail,
        )
    }

    /// Repaint whatever we draw in `window` after an Expose
    pub fn paint(&self, window: Window) -> Result<()> {
        if window == self.header {
            return self.paint_header();
        }
        if let Some(region) = self
            .regions
            .iter()
            .find(|region| region.window == window && region.content == RegionContent::Placeholder)
        {
            return self.paint_placeholder(region);
        }
        Ok(())
    }

    fn paint_header(&self) -> Result<()> {
        let Some(font) = &self.font else {
            return Ok(());
        };
        let text = font.render_text(&self.title, x11::TITLE_COLOR);
        let y = (layout::HEADER_HEIGHT as i32 - text.height as i32) / 2;
        self.put_label(self.header, &text, x11::HEADER_BACKGROUND, layout::TITLE_PADDING_LEFT, y.max(0))
            .context("Failed to draw header title")
    }

    fn paint_placeholder(&self, region: &RegionWindow) -> Result<()> {
        let Some(font) = &self.font else {
            return Ok(());
        };
        let label = if region.url.is_empty() { "(no url)" } else { region.url.as_str() };
        let text = font.render_text(label, x11::TITLE_COLOR);
        self.put_label(
            region.window,
            &text,
            x11::PLACEHOLDER_BACKGROUND,
            layout::TITLE_PADDING_LEFT,
            layout::TITLE_PADDING_LEFT,
        )
        .context(format!("Failed to draw placeholder for {}", region.url))
    }

    /// Upload text composited over a solid background
    fn put_label(&self, drawable: Window, text: &RenderedText, background: u32, x: i32, y: i32) -> Result<()> {
        if text.width == 0 || text.height == 0 {
            return Ok(());
        }
        let mut pixels = vec![background; text.width * text.height];
        text.blend_onto(&mut pixels, text.width, text.height, 0, 0);
        self.ctx
            .conn
            .put_image(
                ImageFormat::Z_PIXMAP,
                drawable,
                self.gc,
                to_u16(text.width as u32),
                to_u16(text.height as u32),
                to_i16(x),
                to_i16(y),
                0,
                x11::ARGB_DEPTH,
                &argb_to_bytes(&pixels),
            )
            .context("Failed to upload label image")?;
        Ok(())
    }
}

impl OverlaySurface for OverlayWindow<'_> {
    fn set_header_visible(&mut self, visible: bool) -> Result<()> {
        if visible == self.header_visible {
            return Ok(());
        }
        if visible {
            self.ctx.conn.map_window(self.header).context("Failed to map header strip")?;
        } else {
            self.ctx.conn.unmap_window(self.header).context("Failed to unmap header strip")?;
        }
        self.ctx.conn.flush().context("Failed to flush header visibility change")?;
        self.header_visible = visible;
        Ok(())
    }

    fn set_window_visible(&mut self, visible: bool) -> Result<()> {
        if visible == self.visible {
            return Ok(());
        }
        if visible {
            // The window manager drops _NET_WM_STATE when a window is withdrawn
            x11_utils::set_always_on_top(self.ctx.conn, self.window, self.ctx.atoms)?;
            self.ctx.conn.map_window(self.window).context("Failed to map overlay window")?;
            let mut aux = ConfigureWindowAux::new()
                .width(self.restore.width.max(1))
                .height(self.restore.height.max(1));
            if let Some((x, y)) = self.restore.position() {
                aux = aux.x(x).y(y);
            }
            self.ctx
                .conn
                .configure_window(self.window, &aux)
                .context("Failed to restore overlay bounds")?;
            x11_utils::request_always_on_top(self.ctx.conn, self.ctx.screen, self.ctx.atoms, self.window)?;
            debug!(bounds = ?self.restore, "Showing overlay window");
        } else {
            self.ctx.conn.unmap_window(self.window).context("Failed to unmap overlay window")?;
        }
        self.ctx.conn.flush().context("Failed to flush window visibility change")?;
        self.visible = visible;
        Ok(())
    }
}

impl Drop for OverlayWindow<'_> {
    fn drop(&mut self) {
        self.content.shutdown();
        if let Err(e) = self.ctx.conn.free_gc(self.gc) {
            error!(gc = self.gc, error = %e, "Failed to free graphics context");
        }
        if let Err(e) = self.ctx.conn.destroy_window(self.window) {
            error!(window = self.window, error = %e, "Failed to destroy overlay window");
        }
        if let Err(e) = self.ctx.conn.free_colormap(self.colormap) {
            warn!(colormap = self.colormap, error = %e, "Failed to free colormap");
        }
        let _ = self.ctx.conn.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_change_between() {
        let base = WindowBounds::new(10, 20, 800, 600);
        assert_eq!(GeometryChange::between(&base, &base), GeometryChange::Unchanged);
        assert_eq!(
            GeometryChange::between(&base, &WindowBounds::new(15, 20, 800, 600)),
            GeometryChange::Moved
        );
        assert_eq!(
            GeometryChange::between(&base, &WindowBounds::new(10, 20, 801, 600)),
            GeometryChange::Resized
        );
        // a resize from the top-left edge moves and resizes at once
        assert_eq!(
            GeometryChange::between(&base, &WindowBounds::new(0, 0, 810, 620)),
            GeometryChange::Resized
        );
    }

    #[test]
    fn test_first_placement_counts_as_move() {
        let unplaced = WindowBounds::default();
        let placed = WindowBounds::new(40, 40, unplaced.width, unplaced.height);
        assert_eq!(GeometryChange::between(&unplaced, &placed), GeometryChange::Moved);
    }

    #[test]
    fn test_protocol_range_clamping() {
        assert_eq!(to_i16(-40_000), i16::MIN);
        assert_eq!(to_i16(123), 123);
        assert_eq!(to_u16(0), 1);
        assert_eq!(to_u16(100_000), u16::MAX);
    }

    #[test]
    fn test_configure_aux_never_zero_sized() {
        let aux = configure_aux(Rect::new(-5, 7, 0, 0));
        assert_eq!(aux.x, Some(-5));
        assert_eq!(aux.y, Some(7));
        assert_eq!(aux.width, Some(1));
        assert_eq!(aux.height, Some(1));
    }
}
