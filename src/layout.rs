use crate::config::{LayoutEntry, WidgetInstance};
use crate::registry::{WidgetDescriptor, WidgetRegistry};

/// Build the layout entry for a widget placed at grid row `y`, taking spans
/// and bounds from the descriptor.
pub(crate) fn entry_for(instance: &WidgetInstance, descriptor: &WidgetDescriptor, y: u32) -> LayoutEntry {
    LayoutEntry {
        id: instance.id.clone(),
        x: 0,
        y,
        w: Some(descriptor.default_width),
        h: Some(descriptor.default_height),
        min_w: descriptor.min_width,
        max_w: descriptor.max_width,
        min_h: descriptor.min_height,
        max_h: descriptor.max_height,
    }
}

/// Place each widget in its own row, in list order. Intentionally the
/// simplest valid layout: no packing, `x = 0`, `y` accumulates the heights of
/// the entries placed before it. Widgets whose descriptor cannot be resolved
/// are skipped.
pub fn generate_default_layout(widgets: &[WidgetInstance], registry: &WidgetRegistry) -> Vec<LayoutEntry> {
    let mut layout = Vec::with_capacity(widgets.len());
    let mut y = 0;
    for instance in widgets {
        let Some(descriptor) = registry.descriptor(&instance.widget_key) else {
            tracing::warn!(widget = %instance.widget_key, "no descriptor for widget; layout entry skipped");
            continue;
        };
        let entry = entry_for(instance, descriptor, y);
        y = entry.bottom();
        layout.push(entry);
    }
    layout
}

fn clamp_span(current: Option<u32>, default: u32, min: Option<u32>, max: Option<u32>) -> u32 {
    let mut span = current.unwrap_or(default);
    if let Some(min) = min {
        span = span.max(min);
    }
    if let Some(max) = max {
        span = span.min(max);
    }
    span
}

/// Repair a layout supplied by the drag/resize surface.
///
/// Entries whose widget no longer exists are dropped; spans are clamped into
/// the descriptor's min/max bounds and the bound fields themselves are
/// refreshed from the descriptor. Running this twice yields the same result.
pub fn repair_layout(
    widgets: &[WidgetInstance],
    layout: &[LayoutEntry],
    registry: &WidgetRegistry,
) -> Vec<LayoutEntry> {
    let mut repaired = Vec::with_capacity(layout.len());
    for entry in layout {
        let Some(instance) = widgets.iter().find(|w| w.id == entry.id) else {
            tracing::warn!(entry = %entry.id, "layout entry has no widget instance; dropped");
            continue;
        };
        let Some(descriptor) = registry.descriptor(&instance.widget_key) else {
            tracing::warn!(widget = %instance.widget_key, "no descriptor for widget; layout entry dropped");
            continue;
        };
        let mut entry = entry.clone();
        entry.w = Some(clamp_span(
            entry.w,
            descriptor.default_width,
            descriptor.min_width,
            descriptor.max_width,
        ));
        entry.h = Some(clamp_span(
            entry.h,
            descriptor.default_height,
            descriptor.min_height,
            descriptor.max_height,
        ));
        entry.min_w = descriptor.min_width;
        entry.max_w = descriptor.max_width;
        entry.min_h = descriptor.min_height;
        entry.max_h = descriptor.max_height;
        repaired.push(entry);
    }
    repaired
}
