//! A layer for point markers on the map.

use crate::layers::Layer;
use crate::projection::{Coordinate, MapProjection};
use egui::{Align2, Color32, FontId, Painter, Pos2, Rect, Response, Shape, Stroke, vec2};
use std::any::Any;

/// Radius of the round head of a pin, in screen points.
const PIN_RADIUS: f32 = 8.0;

/// Distance from the pin's tip to the center of its head.
const PIN_HEIGHT: f32 = 20.0;

/// The color used for markers that do not specify one.
pub const DEFAULT_MARKER_COLOR: Color32 = Color32::from_rgb(220, 50, 50);

/// A pin on the map.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    /// Identifies the marker among the others of the layer.
    pub id: String,

    /// Where the tip of the pin points.
    pub coordinate: Coordinate,

    /// Shown in the marker's callout.
    pub title: String,

    /// Optional second line of the callout.
    pub description: Option<String>,

    /// Color of the pin. `None` uses `DEFAULT_MARKER_COLOR`.
    pub color: Option<Color32>,
}

impl Marker {
    /// Creates a marker with a title and no description or color.
    pub fn new(id: impl Into<String>, coordinate: Coordinate, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            coordinate,
            title: title.into(),
            description: None,
            color: None,
        }
    }

    /// Sets the second line of the callout.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the pin color.
    pub fn with_color(mut self, color: Color32) -> Self {
        self.color = Some(color);
        self
    }

    fn head_center(&self, projection: &MapProjection) -> Pos2 {
        projection.project(self.coordinate) - vec2(0.0, PIN_HEIGHT)
    }
}

/// Layer that draws a set of markers. Hovering a marker shows its callout, clicking one keeps
/// the callout open until the map is clicked elsewhere.
#[derive(Clone, Debug, Default)]
pub struct MarkerLayer {
    markers: Vec<Marker>,
    hovered: Option<usize>,

    /// The index of the marker whose callout is pinned open.
    pub selected: Option<usize>,
}

impl MarkerLayer {
    /// The markers in drawing order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Replaces all markers. The selection is kept only if a marker with the same id is still
    /// present.
    pub fn set_markers(&mut self, markers: Vec<Marker>) {
        let selected_id = self
            .selected
            .and_then(|i| self.markers.get(i))
            .map(|m| m.id.clone());
        self.markers = markers;
        self.hovered = None;
        self.selected = selected_id.and_then(|id| self.markers.iter().position(|m| m.id == id));
    }

    /// Finds the topmost marker whose head is under `screen_pos`.
    fn find_marker_at(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<usize> {
        self.markers.iter().enumerate().rev().find_map(|(i, marker)| {
            // Add some tolerance
            let reach = PIN_RADIUS + 4.0;
            (marker.head_center(projection).distance_sq(screen_pos) <= reach * reach).then_some(i)
        })
    }

    fn draw_pin(&self, painter: &Painter, projection: &MapProjection, marker: &Marker) {
        let tip = projection.project(marker.coordinate);
        let head = marker.head_center(projection);
        let color = marker.color.unwrap_or(DEFAULT_MARKER_COLOR);
        let outline = Stroke::new(1.5, Color32::WHITE);

        painter.add(Shape::convex_polygon(
            vec![
                tip,
                head + vec2(PIN_RADIUS * 0.7, PIN_RADIUS * 0.5),
                head + vec2(-PIN_RADIUS * 0.7, PIN_RADIUS * 0.5),
            ],
            color,
            Stroke::NONE,
        ));
        painter.circle(head, PIN_RADIUS, color, outline);
        painter.circle_filled(head, PIN_RADIUS * 0.35, Color32::WHITE);
    }

    fn draw_callout(&self, painter: &Painter, projection: &MapProjection, marker: &Marker) {
        let mut text = marker.title.clone();
        if let Some(description) = &marker.description {
            text.push('\n');
            text.push_str(description);
        }

        let galley = painter.layout_no_wrap(text, FontId::proportional(13.0), Color32::BLACK);
        let anchor = marker.head_center(projection) - vec2(0.0, PIN_RADIUS + 6.0);
        let rect = Align2::CENTER_BOTTOM.anchor_rect(Rect::from_min_size(anchor, galley.size()));

        painter.rect_filled(
            rect.expand(4.0),
            3.0,
            Color32::from_rgba_unmultiplied(255, 255, 255, 230),
        );
        painter.galley(rect.min, galley, Color32::TRANSPARENT);
    }
}

impl Layer for MarkerLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        self.hovered = response
            .hover_pos()
            .and_then(|pos| self.find_marker_at(pos, projection));

        if self.hovered.is_some() {
            response.ctx.set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        if response.clicked() {
            let clicked = response
                .interact_pointer_pos()
                .and_then(|pos| self.find_marker_at(pos, projection));
            self.selected = clicked;
            // Clicking a marker should not also zoom or pan the map.
            return clicked.is_some();
        }

        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        for marker in &self.markers {
            self.draw_pin(painter, projection, marker);
        }

        // Callouts go on top of every pin.
        let hovered = self.hovered.filter(|&i| Some(i) != self.selected);
        for index in [self.selected, hovered].into_iter().flatten() {
            if let Some(marker) = self.markers.get(index) {
                self.draw_callout(painter, projection, marker);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    fn projection() -> MapProjection {
        let rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(400.0, 400.0));
        MapProjection::new(15, Coordinate::new(40.0, -74.0), rect)
    }

    fn markers() -> Vec<Marker> {
        vec![
            Marker::new("me", Coordinate::new(40.0, -74.0), "My location"),
            Marker::new("p1", Coordinate::new(40.002, -74.0), "Cafe A")
                .with_description("1 Main St")
                .with_color(Color32::BLUE),
        ]
    }

    #[test]
    fn marker_builder() {
        let marker = Marker::new("p1", Coordinate::new(1.0, 2.0), "Cafe A")
            .with_description("1 Main St")
            .with_color(Color32::BLUE);
        assert_eq!(marker.id, "p1");
        assert_eq!(marker.title, "Cafe A");
        assert_eq!(marker.description.as_deref(), Some("1 Main St"));
        assert_eq!(marker.color, Some(Color32::BLUE));
    }

    #[test]
    fn find_marker_at_head() {
        let mut layer = MarkerLayer::default();
        layer.set_markers(markers());
        let projection = projection();

        // The head of the first marker sits above the widget center.
        let head = pos2(200.0, 200.0 - PIN_HEIGHT);
        assert_eq!(layer.find_marker_at(head, &projection), Some(0));
        assert_eq!(layer.find_marker_at(pos2(10.0, 10.0), &projection), None);
    }

    #[test]
    fn set_markers_keeps_selection_by_id() {
        let mut layer = MarkerLayer::default();
        layer.set_markers(markers());
        layer.selected = Some(1);

        // Same marker moved to the front.
        let mut reordered = markers();
        reordered.reverse();
        layer.set_markers(reordered);
        assert_eq!(layer.selected, Some(0));

        // Selected marker removed.
        layer.set_markers(vec![Marker::new("me", Coordinate::new(40.0, -74.0), "Me")]);
        assert_eq!(layer.selected, None);
        assert_eq!(layer.markers().len(), 1);
    }

    #[test]
    fn marker_layer_as_any() {
        let mut layer = MarkerLayer::default();
        assert!(layer.as_any().is::<MarkerLayer>());
        assert!(layer.as_any_mut().is::<MarkerLayer>());
    }
}
