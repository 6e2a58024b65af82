//! Layout engine: source descriptors → absolute-positioned composition
//!
//! `compose` is pure and runs once at startup. The composition keeps corner
//! anchors symbolic; `Composition::resolve` turns them into rectangles for a
//! given window size, so the window controller can re-resolve after a resize
//! and keep corner-anchored regions glued to their edges.

use crate::config::{Corner, PositionSpec, SourceDescriptor};
use crate::constants::layout::{HEADER_HEIGHT, RESIZE_BORDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        saturate(self.x as i64 + self.width as i64)
    }

    pub fn bottom(&self) -> i32 {
        saturate(self.y as i64 + self.height as i64)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// How a region is placed inside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Flush against a corner, zero inset on both edges
    Anchored(Corner),
    /// Fixed offset from the top-left origin
    Offset { x: i32, y: i32 },
}

impl From<PositionSpec> for Placement {
    fn from(spec: PositionSpec) -> Self {
        match spec {
            PositionSpec::Keyword(corner) => Placement::Anchored(corner),
            PositionSpec::Absolute { x, y } => Placement::Offset { x, y },
        }
    }
}

/// One content region of the composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
}

impl Region {
    /// Resolve against the current window size. No clamping: a region larger
    /// than the window, or offset past its edge, is clipped by the window.
    pub fn rect(&self, window_width: u32, window_height: u32) -> Rect {
        let right_x = saturate(window_width as i64 - self.width as i64);
        let bottom_y = saturate(window_height as i64 - self.height as i64);
        let (x, y) = match self.placement {
            Placement::Anchored(Corner::TopLeft) => (0, 0),
            Placement::Anchored(Corner::TopRight) => (right_x, 0),
            Placement::Anchored(Corner::BottomLeft) => (0, bottom_y),
            Placement::Anchored(Corner::BottomRight) => (right_x, bottom_y),
            Placement::Offset { x, y } => (x, y),
        };
        Rect::new(x, y, self.width, self.height)
    }
}

/// Reserved title strip: full width, top-anchored, above every region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderStrip {
    pub height: u16,
}

impl HeaderStrip {
    pub fn rect(&self, window_width: u32) -> Rect {
        Rect::new(0, 0, window_width, self.height as u32)
    }
}

impl Default for HeaderStrip {
    fn default() -> Self {
        Self { height: HEADER_HEIGHT }
    }
}

/// What a pointer press at a window-local point lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Header,
    /// Index into `Composition::regions`
    Region(usize),
    Canvas,
}

impl HitTarget {
    /// Regions never start a window drag; header and bare canvas do
    pub fn drag_enabled(self) -> bool {
        !matches!(self, HitTarget::Region(_))
    }
}

/// Window edge or corner for a pointer-driven resize, numbered as
/// `_NET_WM_MOVERESIZE` directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    TopLeft = 0,
    Top = 1,
    TopRight = 2,
    Right = 3,
    BottomRight = 4,
    Bottom = 5,
    BottomLeft = 6,
    Left = 7,
}

impl ResizeEdge {
    /// Edge under a window-local point, if it lies in the resize border
    pub fn at(window_width: u32, window_height: u32, x: i32, y: i32) -> Option<Self> {
        let border = RESIZE_BORDER as i32;
        let left = x < border;
        let right = x >= window_width as i32 - border;
        let top = y < border;
        let bottom = y >= window_height as i32 - border;
        match (top, bottom, left, right) {
            (true, _, true, _) => Some(ResizeEdge::TopLeft),
            (true, _, _, true) => Some(ResizeEdge::TopRight),
            (_, true, true, _) => Some(ResizeEdge::BottomLeft),
            (_, true, _, true) => Some(ResizeEdge::BottomRight),
            (true, _, _, _) => Some(ResizeEdge::Top),
            (_, true, _, _) => Some(ResizeEdge::Bottom),
            (_, _, true, _) => Some(ResizeEdge::Left),
            (_, _, _, true) => Some(ResizeEdge::Right),
            _ => None,
        }
    }

    pub fn direction(self) -> u32 {
        self as u32
    }
}

/// Absolute-positioned composition of the overlay surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub header: HeaderStrip,
    /// Stacking order: later regions draw above earlier ones
    pub regions: Vec<Region>,
}

/// A composition resolved against one window size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayout {
    pub header: Rect,
    pub regions: Vec<Rect>,
}

impl Composition {
    pub fn resolve(&self, window_width: u32, window_height: u32) -> ResolvedLayout {
        ResolvedLayout {
            header: self.header.rect(window_width),
            regions: self
                .regions
                .iter()
                .map(|region| region.rect(window_width, window_height))
                .collect(),
        }
    }

    /// Topmost element under a window-local point
    pub fn hit_test(
        &self,
        window_width: u32,
        window_height: u32,
        header_visible: bool,
        x: i32,
        y: i32,
    ) -> HitTarget {
        if header_visible && self.header.rect(window_width).contains(x, y) {
            return HitTarget::Header;
        }
        self.regions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, region)| region.rect(window_width, window_height).contains(x, y))
            .map(|(index, _)| HitTarget::Region(index))
            .unwrap_or(HitTarget::Canvas)
    }
}

/// Build the composition for the configured sources
pub fn compose(sources: &[SourceDescriptor]) -> Composition {
    Composition {
        header: HeaderStrip::default(),
        regions: sources
            .iter()
            .map(|source| Region {
                url: source.url.clone(),
                width: source.width,
                height: source.height,
                placement: source.position.into(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(position: PositionSpec) -> SourceDescriptor {
        SourceDescriptor::new("https://example.com", 300, 200, position)
    }

    #[test]
    fn test_keywords_anchor_to_corners_with_zero_inset() {
        let expected = [
            (Corner::TopLeft, (0, 0)),
            (Corner::TopRight, (1620, 0)),
            (Corner::BottomLeft, (0, 880)),
            (Corner::BottomRight, (1620, 880)),
        ];
        for (corner, (x, y)) in expected {
            let composition = compose(&[source(PositionSpec::Keyword(corner))]);
            let rect = composition.resolve(1920, 1080).regions[0];
            assert_eq!(rect, Rect::new(x, y, 300, 200), "corner {corner:?}");
        }
    }

    #[test]
    fn test_compose_is_deterministic() {
        let sources: Vec<_> = Corner::ALL
            .iter()
            .map(|&corner| source(PositionSpec::Keyword(corner)))
            .collect();
        assert_eq!(compose(&sources), compose(&sources));
        assert_eq!(compose(&sources).resolve(800, 600), compose(&sources).resolve(800, 600));
    }

    #[test]
    fn test_absolute_offset_is_exact() {
        let composition = compose(&[source(PositionSpec::Absolute { x: 37, y: 411 })]);
        let rect = composition.resolve(1920, 1080).regions[0];
        assert_eq!((rect.x, rect.y), (37, 411));
        assert_eq!(composition.resolve(640, 480).regions[0], rect);
    }

    #[test]
    fn test_no_clamping_when_region_overflows() {
        let composition = compose(&[
            source(PositionSpec::Absolute { x: 900, y: -50 }),
            source(PositionSpec::Keyword(Corner::BottomRight)),
        ]);
        let layout = composition.resolve(200, 100);
        assert_eq!(layout.regions[0], Rect::new(900, -50, 300, 200));
        assert_eq!(layout.regions[1], Rect::new(-100, -100, 300, 200));
    }

    #[test]
    fn test_oversized_region_saturates() {
        let composition = compose(&[
            SourceDescriptor::new("https://huge", u32::MAX, u32::MAX, PositionSpec::Keyword(Corner::BottomRight)),
            SourceDescriptor::new("https://far", u32::MAX, 10, PositionSpec::Absolute { x: i32::MAX - 5, y: 0 }),
        ]);
        let layout = composition.resolve(1920, 1080);
        assert_eq!(layout.regions[0], Rect::new(i32::MIN, i32::MIN, u32::MAX, u32::MAX));
        assert_eq!(layout.regions[1].right(), i32::MAX);
        assert_eq!(composition.hit_test(1920, 1080, false, 10, 10), HitTarget::Region(0));
    }

    #[test]
    fn test_large_width_from_config_anchors_without_overflow() {
        let sources: Vec<SourceDescriptor> = serde_json::from_str(
            r#"[{"url": "https://a", "width": 2147483648, "position": "top-right"}]"#,
        )
        .unwrap();
        let rect = compose(&sources).resolve(1920, 1080).regions[0];
        assert_eq!(rect.width, i32::MAX as u32);
        assert_eq!(rect.x, 1920 - i32::MAX);
    }

    #[test]
    fn test_corner_anchors_follow_resize() {
        let composition = compose(&[source(PositionSpec::Keyword(Corner::BottomRight))]);
        assert_eq!(composition.resolve(1000, 800).regions[0], Rect::new(700, 600, 300, 200));
        assert_eq!(composition.resolve(1200, 900).regions[0], Rect::new(900, 700, 300, 200));
    }

    #[test]
    fn test_header_strip_spans_width() {
        let composition = compose(&[]);
        assert!(composition.regions.is_empty());
        assert_eq!(composition.resolve(1280, 720).header, Rect::new(0, 0, 1280, 30));
    }

    #[test]
    fn test_regions_keep_input_order() {
        let composition = compose(&[
            SourceDescriptor::new("https://first", 100, 100, PositionSpec::default()),
            SourceDescriptor::new("https://second", 100, 100, PositionSpec::default()),
        ]);
        assert_eq!(composition.regions[0].url, "https://first");
        assert_eq!(composition.regions[1].url, "https://second");
    }

    #[test]
    fn test_hit_test_prefers_header_then_topmost_region() {
        let composition = compose(&[
            SourceDescriptor::new("https://below", 200, 200, PositionSpec::default()),
            SourceDescriptor::new("https://above", 100, 100, PositionSpec::Absolute { x: 50, y: 50 }),
        ]);
        assert_eq!(composition.hit_test(800, 600, true, 10, 10), HitTarget::Header);
        assert_eq!(composition.hit_test(800, 600, false, 10, 10), HitTarget::Region(0));
        assert_eq!(composition.hit_test(800, 600, true, 60, 60), HitTarget::Region(1));
        assert_eq!(composition.hit_test(800, 600, true, 500, 500), HitTarget::Canvas);
    }

    #[test]
    fn test_regions_are_not_drag_enabled() {
        assert!(HitTarget::Header.drag_enabled());
        assert!(HitTarget::Canvas.drag_enabled());
        assert!(!HitTarget::Region(0).drag_enabled());
    }

    #[test]
    fn test_resize_edges() {
        assert_eq!(ResizeEdge::at(400, 300, 2, 2), Some(ResizeEdge::TopLeft));
        assert_eq!(ResizeEdge::at(400, 300, 398, 150), Some(ResizeEdge::Right));
        assert_eq!(ResizeEdge::at(400, 300, 200, 299), Some(ResizeEdge::Bottom));
        assert_eq!(ResizeEdge::at(400, 300, 399, 299), Some(ResizeEdge::BottomRight));
        assert_eq!(ResizeEdge::at(400, 300, 200, 150), None);
        assert_eq!(ResizeEdge::BottomRight.direction(), 4);
    }
}
