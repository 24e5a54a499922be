use std::fmt::Write;
use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use tracing::warn;

use crate::drawing::{Color, DrawCommand, Page, PT_TO_MM, Stroke, TextAlign};
use crate::error::Result;
use crate::utils::escape_xml;

/// Renders one page as a standalone SVG document sized in millimetres.
/// Images are embedded as data URIs; unreadable ones are left out.
pub fn render_page(page: &Page) -> Result<String> {
    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{w}mm" height="{h}mm" viewBox="0 0 {w} {h}" font-family="DejaVu Sans, sans-serif">
  <rect width="100%" height="100%" fill="#ffffff" />
"##,
        w = page.width,
        h = page.height,
    )?;

    for command in &page.commands {
        match command {
            DrawCommand::Line {
                from,
                to,
                stroke,
                alpha,
            } => writeln!(
                svg,
                r#"  <line x1="{:.3}" y1="{:.3}" x2="{:.3}" y2="{:.3}" {} stroke-linecap="round" opacity="{}" />"#,
                from.x,
                from.y,
                to.x,
                to.y,
                stroke_attrs(Some(stroke)),
                alpha
            )?,
            DrawCommand::Circle {
                center,
                radius,
                stroke,
                fill,
                alpha,
            } => writeln!(
                svg,
                r#"  <circle cx="{:.3}" cy="{:.3}" r="{:.3}" {} {} opacity="{}" />"#,
                center.x,
                center.y,
                radius,
                fill_attr(fill.as_ref()),
                stroke_attrs(stroke.as_ref()),
                alpha
            )?,
            DrawCommand::Rect {
                x,
                y,
                width,
                height,
                stroke,
                fill,
                alpha,
            } => writeln!(
                svg,
                r#"  <rect x="{:.3}" y="{:.3}" width="{:.3}" height="{:.3}" {} {} opacity="{}" />"#,
                x,
                y,
                width,
                height,
                fill_attr(fill.as_ref()),
                stroke_attrs(stroke.as_ref()),
                alpha
            )?,
            DrawCommand::Image {
                path,
                x,
                y,
                width,
                height,
                alpha,
            } => {
                let Some(href) = data_uri(path) else {
                    continue;
                };
                writeln!(
                    svg,
                    r#"  <image x="{:.3}" y="{:.3}" width="{:.3}" height="{:.3}" opacity="{}" href="{}" />"#,
                    x, y, width, height, alpha, href
                )?;
            }
            DrawCommand::Text {
                x,
                y,
                text,
                font_size,
                color,
                align,
                alpha,
            } => {
                let anchor = match align {
                    TextAlign::Left => "start",
                    TextAlign::Center => "middle",
                };
                writeln!(
                    svg,
                    r#"  <text x="{:.3}" y="{:.3}" font-size="{:.3}" fill="{}" text-anchor="{}" dominant-baseline="hanging" opacity="{}">{}</text>"#,
                    x,
                    y,
                    font_size * PT_TO_MM,
                    color.to_hex(),
                    anchor,
                    alpha,
                    escape_xml(text)
                )?;
            }
        }
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

fn fill_attr(fill: Option<&Color>) -> String {
    match fill {
        Some(color) => format!(r#"fill="{}""#, color.to_hex()),
        None => r#"fill="none""#.to_string(),
    }
}

fn stroke_attrs(stroke: Option<&Stroke>) -> String {
    match stroke {
        Some(stroke) => format!(
            r#"stroke="{}" stroke-width="{:.3}""#,
            stroke.color.to_hex(),
            stroke.width
        ),
        None => r#"stroke="none""#.to_string(),
    }
}

fn data_uri(path: &Path) -> Option<String> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            warn!(image = %path.display(), "cannot embed image: {err}");
            return None;
        }
    };
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "image/png",
    };
    Some(format!(
        "data:{mime};base64,{}",
        BASE64_STANDARD.encode(data)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Point;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn page(commands: Vec<DrawCommand>) -> Page {
        Page {
            width: 210.0,
            height: 297.0,
            commands,
        }
    }

    #[test]
    fn page_is_sized_in_millimetres() {
        let svg = render_page(&page(Vec::new())).unwrap();
        assert!(svg.contains(r#"width="210mm" height="297mm" viewBox="0 0 210 297""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn shapes_and_text_are_written() {
        let svg = render_page(&page(vec![
            DrawCommand::Line {
                from: Point::new(0.0, 0.0),
                to: Point::new(10.0, 5.0),
                stroke: Stroke {
                    color: Color::EDGE_REACHED,
                    width: 0.5,
                },
                alpha: 1.0,
            },
            DrawCommand::Circle {
                center: Point::new(20.0, 20.0),
                radius: 4.0,
                stroke: None,
                fill: Some(Color::REDUNDANCY_FILL),
                alpha: 1.0,
            },
            DrawCommand::Text {
                x: 5.0,
                y: 6.0,
                text: "a < b".into(),
                font_size: 12.0,
                color: Color::BLACK,
                align: TextAlign::Center,
                alpha: 0.4,
            },
        ]))
        .unwrap();

        assert!(svg.contains(r##"stroke="#646464" stroke-width="0.500""##));
        assert!(svg.contains(r##"fill="#c80000" stroke="none""##));
        assert!(svg.contains(r#"text-anchor="middle""#));
        assert!(svg.contains(">a &lt; b</text>"));
        assert!(svg.contains(r#"opacity="0.4""#));
    }

    #[test]
    fn images_are_embedded_or_skipped() {
        let dir = TempDir::new().unwrap();
        let icon = dir.path().join("icon.png");
        std::fs::write(&icon, b"\x89PNG").unwrap();

        let image = |path: PathBuf| DrawCommand::Image {
            path,
            x: 0.0,
            y: 0.0,
            width: 8.0,
            height: 8.0,
            alpha: 1.0,
        };
        let svg = render_page(&page(vec![
            image(icon),
            image(dir.path().join("missing.png")),
        ]))
        .unwrap();

        assert_eq!(svg.matches("<image").count(), 1);
        assert!(svg.contains(r#"href="data:image/png;base64,iVBORw==""#));
    }
}
